//! Strategy dispatch: the heart of the event-processing state machine
//! (SPEC_FULL §4.5).
//!
//! The original source picks a strategy class via multiple inheritance of
//! `Local`/`Remote` mixed with one mixin per `EventKind`. This crate
//! replaces that with a tagged `(Direction, EventKind)` match (SPEC_FULL §9
//! "Strategy polymorphism"): `EventStrategies` bundles the collaborators
//! (`EventDb`, `ContentStore`, `CoordinatorClient`) and exposes one
//! `register()`/`apply()`/`process_conflict()` step per event, matching
//! internally on `event.direction()`/`event.kind()` instead of dispatching
//! to a family of strategy structs.

use std::sync::atomic::{AtomicI64, Ordering};

use uuid::Uuid;

use crate::content_store::ContentStore;
use crate::coordinator_client::{CoordinatorClient, EventRegistration};
use crate::error::{RemoteError, StrategyError};
use crate::event_db::EventDb;
use crate::types::{Direction, Event, EventFlags, EventKind, EventState, EventType, File, RowId};

/// Below this file size, a whole-file copy is always preferred over a patch
/// (SPEC_FULL §4.5.1).
pub const MIN_DIFF_SIZE: u64 = 4096;

/// A patch of unknown size older than this many seconds falls back to a
/// full-file download (SPEC_FULL §4.5.1).
pub const PATCH_WAIT_TIMEOUT_SECS: u64 = 30;

/// Inputs to the patch-vs-full-file decision (SPEC_FULL §4.5.1), gathered
/// so the decision itself stays a pure function independent of where the
/// inputs came from (EventDB, ContentStore, config).
#[derive(Debug, Clone, Copy)]
pub struct PatchDecisionInputs {
	pub download_backups_enabled: bool,
	pub must_download_copy: bool,
	pub outdated: bool,
	pub file_size: u64,
	pub diff_file_size: Option<u64>,
	pub parent_has_prior_event: bool,
	pub patch_known: bool,
	pub patch_size_zero: bool,
	pub event_age_secs: u64,
}

/// Whether a remote update should be satisfied with a binary patch rather
/// than a whole-file download.
pub fn should_use_patch(inputs: &PatchDecisionInputs) -> bool {
	if !inputs.download_backups_enabled {
		return false;
	}
	if inputs.must_download_copy {
		return false;
	}
	if !inputs.patch_known {
		if inputs.outdated {
			return false;
		}
		if inputs.file_size < MIN_DIFF_SIZE {
			return false;
		}
		if let Some(diff_size) = inputs.diff_file_size {
			if diff_size > 0 && diff_size > inputs.file_size {
				return false;
			}
		}
		if !inputs.parent_has_prior_event {
			return false;
		}
		if inputs.patch_size_zero && inputs.event_age_secs > PATCH_WAIT_TIMEOUT_SECS {
			return false;
		}
	}
	true
}

/// Append a timestamp suffix to `name` so a conflicting copy never collides
/// with the original (SPEC_FULL §4.5.2).
pub fn conflicting_copy_name(name: &str, now: u64) -> String {
	match name.rsplit_once('.') {
		Some((stem, ext)) if !stem.is_empty() => format!("{stem} (conflicting copy {now}).{ext}"),
		_ => format!("{name} (conflicting copy {now})"),
	}
}

/// Outcome of registering a locally-originated event with the coordinator.
#[derive(Debug)]
pub enum RegisterOutcome {
	Registered { server_event_id: i64 },
	/// A conflicting-copy `File`/`Event` pair has already been persisted by
	/// `process_conflict` by the time this is returned; `conflicting_file_id`
	/// and `conflicting_event_id` name the new rows so the caller can enqueue
	/// the copy's event for its own registration pass.
	Conflict { conflicting_copy_name: String, conflicting_file_id: RowId, conflicting_event_id: RowId },
}

/// Outcome of applying a remotely-originated event to local state.
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
	Applied,
	Skipped,
	TranslatedToDeleteCreate,
	/// The delete's `erase_nested` flag was set; `events_erased` nested
	/// events were released by the sweep (SPEC_FULL §4.5.3 / S4).
	ErasedNested { events_erased: usize },
	/// The delete left live descendants with no `erase_nested` flag;
	/// `follow_up_event_ids` names the dummy delete events synthesized and
	/// persisted for them, which the caller must enqueue for processing.
	AppliedWithFollowUps { follow_up_event_ids: Vec<RowId> },
}

/// Bundles the collaborators a strategy needs: durable event/file state,
/// the content-addressed store, and the coordinator client. One instance is
/// shared across every event dispatched in a processing cycle.
pub struct EventStrategies<'a> {
	pub event_db: &'a EventDb,
	pub content_store: &'a ContentStore,
	pub coordinator: &'a (dyn CoordinatorClient + 'a),
	dummy_event_counter: AtomicI64,
}

impl<'a> EventStrategies<'a> {
	pub fn new(event_db: &'a EventDb, content_store: &'a ContentStore, coordinator: &'a (dyn CoordinatorClient + 'a)) -> Self {
		EventStrategies { event_db, content_store, coordinator, dummy_event_counter: AtomicI64::new(-1) }
	}

	fn next_dummy_server_event_id(&self) -> i64 {
		self.dummy_event_counter.fetch_sub(1, Ordering::Relaxed)
	}

	fn previous_server_event_id(&self, file: &File) -> i64 {
		file.event_id.and_then(|id| self.event_db.get_event(id).ok().flatten()).map(|e| e.server_event_id).unwrap_or(0)
	}

	fn build_registration(&self, event: &Event, file: &File) -> EventRegistration {
		EventRegistration {
			event_uuid: event.uuid,
			file_uuid: file.uuid,
			folder_uuid: event.folder_uuid,
			previous_server_event_id: self.previous_server_event_id(file),
			file_name: event.file_name.clone(),
			file_size: event.file_size,
			file_hash: event.file_hash.clone(),
			diff_file_uuid: event.diff_file_uuid,
			rev_diff_file_uuid: event.rev_diff_file_uuid,
		}
	}

	/// Register a local event with the coordinator, dispatching to the
	/// `*_event_*` call named by the table in SPEC_FULL §4.5. Refuses (via
	/// `StrategyError::SkipEventForNow`) to register a non-create event
	/// whose file's previous event hasn't itself registered yet.
	pub async fn register(&self, event: &Event, file: &File) -> Result<RegisterOutcome, StrategyError> {
		if event.direction() != Direction::Local {
			return Err(StrategyError::FilesystemRace { message: "register() called on a non-local event".into() });
		}
		if event.event_type != EventType::Create {
			if let Some(prev_id) = file.event_id {
				let prev = self.event_db.get_event(prev_id).ok().flatten();
				if prev.map(|p| p.state != EventState::Registered && !p.state.is_remote()).unwrap_or(false) {
					return Err(StrategyError::SkipEventForNow);
				}
			}
		}

		if self.detect_conflict(event, file) {
			return self.process_conflict(event, file);
		}

		let req = self.build_registration(event, file);
		let result = match (event.event_type, event.is_folder) {
			(EventType::Create, false) => self.coordinator.file_event_create(&req).await,
			(EventType::Create, true) => self.coordinator.folder_event_create(&req).await,
			(EventType::Update, _) => self.coordinator.file_event_update(&req).await,
			(EventType::Move, false) => self.coordinator.file_event_move(&req).await,
			(EventType::Move, true) => self.coordinator.folder_event_move(&req).await,
			(EventType::Delete, false) => self.coordinator.file_event_delete(&req).await,
			(EventType::Delete, true) => self.coordinator.folder_event_delete(&req).await,
			(EventType::Restore, _) => self.coordinator.file_event_update(&req).await,
		};

		match result {
			Ok(server_event_id) => Ok(RegisterOutcome::Registered { server_event_id }),
			Err(RemoteError::ErrorCode { code, info }) => {
				Err(StrategyError::Rejected { errcode: code, message: info.unwrap_or_default() })
			}
			Err(e) => Err(StrategyError::Rejected { errcode: String::new(), message: e.to_string() }),
		}
	}

	/// Detect a create/create or move-destination collision at the event's
	/// target path (SPEC_FULL §4.5.2's "two local files, same (folder,
	/// name), never persist" invariant).
	fn detect_conflict(&self, event: &Event, file: &File) -> bool {
		if !matches!(event.event_type, EventType::Create | EventType::Move | EventType::Update) {
			return false;
		}
		self.event_db.find_conflicting_file_or_folder(&event.file_name, file.id).is_some()
	}

	/// Persist the renamed conflicting-copy `File`/`Event` pair (SPEC_FULL
	/// §4.5.2 / S3): the copy keeps the event's content under a
	/// timestamp-suffixed name, so the original `(folder, name)` slot is free
	/// for whichever side wins the race. For updates, additionally restores
	/// the original file to the last state that was itself sent or
	/// downloaded (not the conflicting in-flight write), protecting that
	/// content's refcount before the copy is split off.
	fn process_conflict(&self, event: &Event, file: &File) -> Result<RegisterOutcome, StrategyError> {
		if event.event_type == EventType::Update {
			if let Some(hash) = self.restore_last_non_conflicting_state(file)? {
				self.content_store.add_copy_reference(&hash, "conflict: restore original", false);
			}
		}

		let copy_name = conflicting_copy_name(&event.file_name, event.timestamp);
		let copy_file_id = self.event_db.allocate_file_id();
		let copy_event_id = self.event_db.allocate_event_id();

		let copy_file = File {
			id: copy_file_id,
			uuid: None,
			name: copy_name.clone(),
			is_folder: event.is_folder,
			folder_id: file.folder_id,
			event_id: Some(copy_event_id),
			last_skipped_event_id: None,
			excluded: file.excluded,
			is_offline: file.is_offline,
			is_collaborated: file.is_collaborated,
			ignored: file.ignored,
		};
		self.event_db.put_file(&copy_file).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;

		let copy_event = Event {
			id: copy_event_id,
			file_id: copy_file_id,
			uuid: Uuid::new_v4(),
			server_event_id: 0,
			is_dummy: false,
			event_type: EventType::Create,
			is_folder: event.is_folder,
			file_name: copy_name.clone(),
			file_name_before_event: None,
			file_size: event.file_size,
			file_size_before_event: None,
			file_hash: event.file_hash.clone(),
			file_hash_before_event: None,
			folder_uuid: event.folder_uuid,
			diff_file_uuid: None,
			diff_file_size: None,
			rev_diff_file_uuid: None,
			rev_diff_file_size: None,
			last_event_id: None,
			state: EventState::Occured,
			timestamp: event.timestamp,
			flags: EventFlags::default(),
		};
		self.event_db.put_event(&copy_event).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;

		if let Some(hash) = &event.file_hash {
			self.content_store.add_copy_reference(hash, "conflicting copy", false);
		}

		Ok(RegisterOutcome::Conflict {
			conflicting_copy_name: copy_name,
			conflicting_file_id: copy_file_id,
			conflicting_event_id: copy_event_id,
		})
	}

	/// Replay the content addressed by the latest non-delete `sent`-or-
	/// `downloaded` event for `file`, so the original can be restored before
	/// the conflicting copy is split off (SPEC_FULL §4.5.2).
	pub fn restore_last_non_conflicting_state(&self, file: &File) -> Result<Option<String>, StrategyError> {
		let Some(event_id) = file.event_id else { return Ok(None) };
		let mut current = Some(event_id);
		while let Some(id) = current {
			let event = self
				.event_db
				.get_event(id)
				.map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;
			let Some(event) = event else { break };
			if event.event_type != EventType::Delete && matches!(event.state, EventState::Sent | EventState::Downloaded) {
				return Ok(event.file_hash);
			}
			current = event.last_event_id;
		}
		Ok(None)
	}

	/// Apply a remotely-originated event to local state. `existing` is the
	/// current File row for `event.file_id`, if any.
	pub async fn apply(&self, event: &Event, existing: Option<&File>) -> Result<ApplyOutcome, StrategyError> {
		if event.direction() != Direction::Remote {
			return Err(StrategyError::FilesystemRace { message: "apply() called on a non-remote event".into() });
		}

		match event.kind() {
			EventKind::CreateFile | EventKind::CreateFolder => {
				let file = File {
					id: event.file_id,
					uuid: Some(event.uuid),
					name: event.file_name.clone(),
					is_folder: event.is_folder,
					folder_id: existing.and_then(|f| f.folder_id),
					event_id: Some(event.id),
					last_skipped_event_id: None,
					excluded: existing.map(|f| f.excluded).unwrap_or(false),
					is_offline: existing.map(|f| f.is_offline).unwrap_or(true),
					is_collaborated: existing.map(|f| f.is_collaborated).unwrap_or(false),
					ignored: existing.map(|f| f.ignored).unwrap_or(false),
				};
				self.event_db.put_file(&file).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;
				if let Some(hash) = &event.file_hash {
					self.content_store.add_copy_reference(hash, "remote create", false);
				}
				Ok(ApplyOutcome::Applied)
			}
			EventKind::UpdateFile => {
				if let Some(hash) = &event.file_hash_before_event {
					self.content_store.remove_copy_reference(hash, "remote update superseded", false);
				}
				if let Some(hash) = &event.file_hash {
					self.content_store.add_copy_reference(hash, "remote update", false);
				}
				self.advance_file_event(existing, event)?;
				Ok(ApplyOutcome::Applied)
			}
			EventKind::MoveFile | EventKind::MoveFolder => {
				let Some(mut file) = existing.cloned() else {
					return Err(StrategyError::FilesystemRace { message: "move target missing locally".into() });
				};
				if file.excluded {
					return Ok(ApplyOutcome::TranslatedToDeleteCreate);
				}
				file.name = event.file_name.clone();
				file.event_id = Some(event.id);
				self.event_db.put_file(&file).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;
				Ok(ApplyOutcome::Applied)
			}
			EventKind::DeleteFile | EventKind::DeleteFolder => {
				if let Some(hash) = &event.file_hash_before_event {
					self.content_store.add_copy_reference(hash, "remote delete backup", false);
				}
				self.advance_file_event(existing, event)?;

				if event.is_folder && event.flags.erase_nested {
					let events_erased = self.erase_nested(event.file_id);
					return Ok(ApplyOutcome::ErasedNested { events_erased });
				}

				if event.is_folder {
					let mut descendants = Vec::new();
					self.event_db.get_files_by_folder_uuid(event.file_id, true, false, |page| descendants.extend_from_slice(page));
					if !descendants.is_empty() {
						let dummies = self.synthesize_dummy_deletes(event.file_id);
						let follow_up_event_ids: Vec<RowId> = dummies.iter().map(|e| e.id).collect();
						self.event_db.put_events_atomic(&dummies).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })?;
						return Ok(ApplyOutcome::AppliedWithFollowUps { follow_up_event_ids });
					}
				}

				Ok(ApplyOutcome::Applied)
			}
			EventKind::RestoreFile | EventKind::RestoreFolder => {
				if let Some(hash) = &event.file_hash {
					self.content_store.add_copy_reference(hash, "remote restore", false);
				}
				self.advance_file_event(existing, event)?;
				Ok(ApplyOutcome::Applied)
			}
		}
	}

	fn advance_file_event(&self, existing: Option<&File>, event: &Event) -> Result<(), StrategyError> {
		let Some(mut file) = existing.cloned() else {
			return Err(StrategyError::FilesystemRace { message: "file row missing for apply".into() });
		};
		file.event_id = Some(event.id);
		self.event_db.put_file(&file).map_err(|e| StrategyError::ContentMissing { what: e.to_string() })
	}

	/// Synthesize dummy delete events for every live descendant of
	/// `folder_id` when the remote side deleted the parent but local state
	/// still has children (SPEC_FULL §4.5.3). Each dummy event carries a
	/// freshly drawn negative `server_event_id` so it sorts last, plus
	/// `is_dummy=true` and `state=Downloaded`.
	pub fn synthesize_dummy_deletes(&self, folder_id: RowId) -> Vec<Event> {
		let mut out = Vec::new();
		self.event_db.get_files_by_folder_uuid(folder_id, true, false, |page| {
			for child in page {
				let server_event_id = self.next_dummy_server_event_id();
				out.push(Event {
					id: self.event_db.allocate_event_id(),
					file_id: child.id,
					uuid: Uuid::new_v4(),
					server_event_id,
					is_dummy: true,
					event_type: EventType::Delete,
					is_folder: child.is_folder,
					file_name: child.name.clone(),
					file_name_before_event: None,
					file_size: 0,
					file_size_before_event: None,
					file_hash: None,
					file_hash_before_event: None,
					folder_uuid: None,
					diff_file_uuid: None,
					diff_file_size: None,
					rev_diff_file_uuid: None,
					rev_diff_file_size: None,
					last_event_id: child.event_id,
					state: EventState::Downloaded,
					timestamp: 0,
					flags: EventFlags::default(),
				});
			}
		});
		out
	}

	/// Release every nested file's events and copy/patch references under
	/// `folder_id` in one page-scanned sweep (SPEC_FULL §4.5.3
	/// `erase_nested`, used by collaboration-access revocation). Returns the
	/// number of events erased, for the `events_erased` counter.
	pub fn erase_nested(&self, folder_id: RowId) -> usize {
		let mut children = Vec::new();
		self.event_db.get_files_by_folder_uuid(folder_id, true, true, |page| children.extend_from_slice(page));

		let mut erased = 0;
		for child in children {
			if child.is_folder {
				erased += self.erase_nested(child.id);
			}
			if let Ok(event) = self.event_db.get_event(child.event_id.unwrap_or(0)) {
				if let Some(event) = event {
					if let Some(hash) = event.file_hash {
						self.content_store.remove_copy_reference(&hash, "erase_nested", false);
					}
				}
			}
			erased += self.event_db.erase_file(child.id).unwrap_or(0);
		}
		erased
	}
}


// vim: ts=4
