//! Bidirectional message bus between the sync engine and a UI process
//! (SPEC_FULL §6 "GUI interface").
//!
//! The original threads loose JSON action+data pairs through the GUI
//! bridge; this crate favors a pair of typed enums over async channels
//! (SPEC_FULL §9's "DB as hub vs messages" note applies here too: the UI
//! boundary is message passing, not shared state). Grounded on
//! `callbacks.rs`'s trait-per-event shape, generalized into enum variants
//! since the UI lives in a separate process/task rather than as an
//! in-process trait object.

use std::path::PathBuf;

use tokio::sync::mpsc;

/// Actions the UI sends into the core.
#[derive(Clone, Debug, PartialEq)]
pub enum GuiAction {
	StartSync,
	StopSync,
	GuiSettingsChanged { offline_dirs: Vec<PathBuf>, download_backups_enabled: bool },
	SetOfflineDirs { dirs: Vec<PathBuf> },
	RevertDownloads { file_ids: Vec<u64> },
}

/// Status values reported via `SyncStatusChanged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
	Idle,
	Syncing,
	Paused,
	Error,
}

/// Events the core emits to the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum GuiEvent {
	SyncStatusChanged { status: SyncStatus },
	DownloadProgress { file_id: u64, bytes_done: u64, bytes_total: u64 },
	OnFileMoved { file_id: u64, from: PathBuf, to: PathBuf },
	InitFileList { files: Vec<PathBuf> },
	RequestToUser { message: String, choices: Vec<String> },
}

/// One end of the bus, held by the core; the UI process holds the mirror
/// image (its action sender paired with this struct's event receiver, and
/// vice versa).
pub struct GuiBridge {
	actions: mpsc::Receiver<GuiAction>,
	events: mpsc::Sender<GuiEvent>,
}

/// The UI-facing handle returned alongside a `GuiBridge` by [`gui_channel`].
pub struct GuiHandle {
	pub actions: mpsc::Sender<GuiAction>,
	pub events: mpsc::Receiver<GuiEvent>,
}

/// Construct a paired (core-side, UI-side) channel set with the given
/// buffer capacity.
pub fn gui_channel(capacity: usize) -> (GuiBridge, GuiHandle) {
	let (action_tx, action_rx) = mpsc::channel(capacity);
	let (event_tx, event_rx) = mpsc::channel(capacity);
	(GuiBridge { actions: action_rx, events: event_tx }, GuiHandle { actions: action_tx, events: event_rx })
}

impl GuiBridge {
	/// Pull the next action sent by the UI, if the channel is still open.
	pub async fn next_action(&mut self) -> Option<GuiAction> {
		self.actions.recv().await
	}

	/// Emit an event to the UI. Silently drops the event if the UI side has
	/// disconnected -- the core keeps running without a UI attached.
	pub async fn emit(&self, event: GuiEvent) {
		let _ = self.events.send(event).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn action_sent_from_ui_is_received_by_bridge() {
		let (mut bridge, handle) = gui_channel(4);
		handle.actions.send(GuiAction::StartSync).await.unwrap();
		assert_eq!(bridge.next_action().await, Some(GuiAction::StartSync));
	}

	#[tokio::test]
	async fn event_emitted_by_bridge_is_received_by_ui() {
		let (bridge, mut handle) = gui_channel(4);
		bridge.emit(GuiEvent::SyncStatusChanged { status: SyncStatus::Syncing }).await;
		let event = handle.events.recv().await;
		assert_eq!(event, Some(GuiEvent::SyncStatusChanged { status: SyncStatus::Syncing }));
	}

	#[tokio::test]
	async fn emit_with_no_ui_attached_does_not_panic() {
		let (bridge, handle) = gui_channel(1);
		drop(handle);
		bridge.emit(GuiEvent::SyncStatusChanged { status: SyncStatus::Idle }).await;
	}
}

// vim: ts=4
