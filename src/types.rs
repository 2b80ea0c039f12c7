//! Core data types for SyncR

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize as SerdeSerialize};
use std::path;

#[derive(Clone, PartialEq, Debug, SerdeSerialize, Deserialize)]
pub struct HashChunk {
	pub hash: String,
	pub offset: u64,
	pub size: usize,
}

#[derive(Clone, PartialEq, Debug, SerdeSerialize, Deserialize)]
pub enum FileType {
	File,
	Dir,
	SymLink,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct FileData {
	pub tp: FileType,
	pub path: path::PathBuf,
	pub mode: u32,
	pub user: u32,
	pub group: u32,
	pub ctime: u32,
	pub mtime: u32,
	pub size: u64,
	pub chunks: Vec<HashChunk>,
	pub target: Option<path::PathBuf>,
}

impl FileData {
	/// Start building a `FileData` for `path` of type `tp`, with all
	/// remaining fields defaulted; used by unit tests across the crate that
	/// only care about a handful of fields per case.
	pub fn builder(tp: FileType, path: path::PathBuf) -> FileDataBuilder {
		FileDataBuilder {
			tp,
			path,
			mode: 0,
			user: 0,
			group: 0,
			ctime: 0,
			mtime: 0,
			size: 0,
			chunks: Vec::new(),
			target: None,
		}
	}
}

/// Manual builder for `FileData` (SPEC_FULL ambient-stack note: no
/// `derive_builder`/`typed-builder` dependency in the teacher's manifest, so
/// this stays a plain chainable struct like the rest of the crate's idiom).
#[derive(Clone, Debug)]
pub struct FileDataBuilder {
	tp: FileType,
	path: path::PathBuf,
	mode: u32,
	user: u32,
	group: u32,
	ctime: u32,
	mtime: u32,
	size: u64,
	chunks: Vec<HashChunk>,
	target: Option<path::PathBuf>,
}

impl FileDataBuilder {
	pub fn mode(mut self, mode: u32) -> Self {
		self.mode = mode;
		self
	}

	pub fn user(mut self, user: u32) -> Self {
		self.user = user;
		self
	}

	pub fn group(mut self, group: u32) -> Self {
		self.group = group;
		self
	}

	pub fn ctime(mut self, ctime: u32) -> Self {
		self.ctime = ctime;
		self
	}

	pub fn mtime(mut self, mtime: u32) -> Self {
		self.mtime = mtime;
		self
	}

	pub fn size(mut self, size: u64) -> Self {
		self.size = size;
		self
	}

	pub fn chunks(mut self, chunks: Vec<HashChunk>) -> Self {
		self.chunks = chunks;
		self
	}

	pub fn target(mut self, target: path::PathBuf) -> Self {
		self.target = Some(target);
		self
	}

	pub fn build(self) -> FileData {
		FileData {
			tp: self.tp,
			path: self.path,
			mode: self.mode,
			user: self.user,
			group: self.group,
			ctime: self.ctime,
			mtime: self.mtime,
			size: self.size,
			chunks: self.chunks,
			target: self.target,
		}
	}
}

impl Serialize for FileData {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut state = serializer.serialize_struct("File", 2)?;
		match &self.tp {
			FileType::File => state.serialize_field("type", "F")?,
			FileType::SymLink => state.serialize_field("type", "L")?,
			FileType::Dir => state.serialize_field("type", "D")?,
		};
		state.serialize_field("path", &self.path.to_str())?;
		state.end()
	}
}

// ============================================================================
// PEER SYNC DATA MODEL
//
// Two primary entities (File, Event) plus the enums that drive strategy
// dispatch. Event.timestamp is a plain u64 (seconds since epoch) from the
// moment an event is constructed -- never a string reparsed later, so the
// patch-vs-copy age comparison always compares like types.
// ============================================================================

/// Internal row id. Strictly increasing for events; files reuse the same
/// newtype so the two id spaces can't be mixed up at call sites by accident.
pub type RowId = u64;

/// A node in the synchronized tree: a file or a folder.
#[derive(Clone, Debug, PartialEq, SerdeSerialize, Deserialize)]
pub struct File {
	pub id: RowId,
	/// Coordinator-assigned identity; unset until the first event registers.
	pub uuid: Option<uuid::Uuid>,
	pub name: String,
	pub is_folder: bool,
	/// Self-referential parent; None for a root child.
	pub folder_id: Option<RowId>,
	/// Most recently applied event for this file, if any.
	pub event_id: Option<RowId>,
	/// Set when a run of trailing deletes was fast-forwarded by the loader
	/// instead of being applied event-by-event.
	pub last_skipped_event_id: Option<RowId>,
	pub excluded: bool,
	pub is_offline: bool,
	pub is_collaborated: bool,
	pub ignored: bool,
}

impl File {
	pub fn root(id: RowId, name: impl Into<String>) -> Self {
		File {
			id,
			uuid: None,
			name: name.into(),
			is_folder: true,
			folder_id: None,
			event_id: None,
			last_skipped_event_id: None,
			excluded: false,
			is_offline: false,
			is_collaborated: false,
			ignored: false,
		}
	}
}

/// Operation an event performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, SerdeSerialize, Deserialize)]
pub enum EventType {
	Create,
	Update,
	Delete,
	Move,
	Restore,
}

impl std::fmt::Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EventType::Create => write!(f, "create"),
			EventType::Update => write!(f, "update"),
			EventType::Delete => write!(f, "delete"),
			EventType::Move => write!(f, "move"),
			EventType::Restore => write!(f, "restore"),
		}
	}
}

/// Where an event originated and how far it has progressed.
///
/// occured/conflicted/sent denote locally-originated events; received/
/// downloaded denote remotely-received ones; registered is transitional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, SerdeSerialize, Deserialize)]
pub enum EventState {
	Occured,
	Conflicted,
	Registered,
	Sent,
	Received,
	Downloaded,
}

impl EventState {
	pub fn is_local(&self) -> bool {
		matches!(self, EventState::Occured | EventState::Conflicted | EventState::Sent)
	}

	pub fn is_remote(&self) -> bool {
		matches!(self, EventState::Received | EventState::Downloaded)
	}
}

/// Per-event boolean flags. Kept as a plain struct (not a bitflags crate
/// dependency the teacher never pulled in) since there are only four bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, SerdeSerialize, Deserialize)]
pub struct EventFlags {
	pub outdated: bool,
	pub restore: bool,
	pub erase_nested: bool,
	pub checked: bool,
}

/// An immutable (after registration) record describing one operation on one
/// File.
#[derive(Clone, Debug, SerdeSerialize, Deserialize)]
pub struct Event {
	pub id: RowId,
	pub file_id: RowId,
	pub uuid: uuid::Uuid,
	/// Signed: negative values are dummy events synthesized locally to
	/// represent inferred remote state (see SPEC_FULL §4.5.3). Unique when
	/// positive.
	pub server_event_id: i64,
	/// Mirrors `server_event_id < 0`, carried as its own column so call
	/// sites never need to reason about sign bits (SPEC_FULL §9).
	pub is_dummy: bool,
	pub event_type: EventType,
	pub is_folder: bool,
	pub file_name: String,
	pub file_name_before_event: Option<String>,
	pub file_size: u64,
	pub file_size_before_event: Option<u64>,
	pub file_hash: Option<String>,
	pub file_hash_before_event: Option<String>,
	pub folder_uuid: Option<uuid::Uuid>,
	pub diff_file_uuid: Option<uuid::Uuid>,
	pub diff_file_size: Option<u64>,
	pub rev_diff_file_uuid: Option<uuid::Uuid>,
	pub rev_diff_file_size: Option<u64>,
	/// Previous event for the same file, or None when the preceding chain
	/// has been garbage collected.
	pub last_event_id: Option<RowId>,
	pub state: EventState,
	/// Seconds since epoch. See module note: normalized at construction,
	/// never reparsed.
	pub timestamp: u64,
	pub flags: EventFlags,
}

impl Event {
	/// Direction this event travels: Local if it originated on this node.
	pub fn direction(&self) -> Direction {
		if self.state.is_local() {
			Direction::Local
		} else {
			Direction::Remote
		}
	}

	/// The tagged (direction, kind) pair used to select an EventStrategy.
	pub fn kind(&self) -> EventKind {
		match (self.event_type, self.is_folder) {
			(EventType::Create, false) => EventKind::CreateFile,
			(EventType::Create, true) => EventKind::CreateFolder,
			(EventType::Update, _) => EventKind::UpdateFile,
			(EventType::Move, false) => EventKind::MoveFile,
			(EventType::Move, true) => EventKind::MoveFolder,
			(EventType::Delete, false) => EventKind::DeleteFile,
			(EventType::Delete, true) => EventKind::DeleteFolder,
			(EventType::Restore, false) => EventKind::RestoreFile,
			(EventType::Restore, true) => EventKind::RestoreFolder,
		}
	}
}

/// Which side an event originated from. See SPEC_FULL §9 "Strategy
/// polymorphism": this, crossed with EventKind, replaces the source's
/// multiple-inheritance mixin strategy classes with a tagged variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, SerdeSerialize, Deserialize)]
pub enum Direction {
	Local,
	Remote,
}

/// The operation an event performs, independent of direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, SerdeSerialize, Deserialize)]
pub enum EventKind {
	CreateFile,
	CreateFolder,
	UpdateFile,
	MoveFile,
	MoveFolder,
	DeleteFile,
	DeleteFolder,
	RestoreFile,
	RestoreFolder,
}

impl EventKind {
	pub fn is_folder(&self) -> bool {
		matches!(
			self,
			EventKind::CreateFolder
				| EventKind::MoveFolder
				| EventKind::DeleteFolder
				| EventKind::RestoreFolder
		)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_file_type_equality() {
		assert_eq!(FileType::File, FileType::File);
		assert_eq!(FileType::Dir, FileType::Dir);
		assert_eq!(FileType::SymLink, FileType::SymLink);
		assert_ne!(FileType::File, FileType::Dir);
	}

	#[test]
	fn test_hash_chunk_creation() {
		let chunk = HashChunk { hash: String::from("abc123"), offset: 0, size: 1024 };
		assert_eq!(chunk.hash, "abc123");
		assert_eq!(chunk.offset, 0);
		assert_eq!(chunk.size, 1024);
	}

	#[test]
	fn test_hash_chunk_equality() {
		let chunk1 = HashChunk { hash: String::from("abc123"), offset: 0, size: 1024 };
		let chunk2 = HashChunk { hash: String::from("abc123"), offset: 0, size: 1024 };
		assert_eq!(chunk1, chunk2);
	}

	#[test]
	fn test_file_data_creation() {
		let fd = FileData {
			tp: FileType::File,
			path: path::PathBuf::from("/test/file.txt"),
			mode: 0o644,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 4096,
			chunks: vec![],
			target: None,
		};
		assert_eq!(fd.tp, FileType::File);
		assert_eq!(fd.mode, 0o644);
		assert_eq!(fd.size, 4096);
		assert_eq!(fd.chunks.len(), 0);
	}

	#[test]
	fn test_file_data_with_chunks() {
		let chunk1 = HashChunk { hash: String::from("hash1"), offset: 0, size: 1024 };
		let chunk2 = HashChunk { hash: String::from("hash2"), offset: 1024, size: 512 };

		let fd = FileData {
			tp: FileType::File,
			path: path::PathBuf::from("/test/file.txt"),
			mode: 0o644,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 1536,
			chunks: vec![chunk1, chunk2],
			target: None,
		};

		assert_eq!(fd.chunks.len(), 2);
		assert_eq!(fd.chunks[0].hash, "hash1");
		assert_eq!(fd.chunks[1].hash, "hash2");
		assert_eq!(fd.chunks[1].offset, 1024);
	}

	#[test]
	fn test_file_data_equality() {
		let fd1 = FileData {
			tp: FileType::File,
			path: path::PathBuf::from("/test/file.txt"),
			mode: 0o644,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 1024,
			chunks: vec![],
			target: None,
		};

		let fd2 = FileData {
			tp: FileType::File,
			path: path::PathBuf::from("/test/file.txt"),
			mode: 0o644,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 1024,
			chunks: vec![],
			target: None,
		};

		assert_eq!(fd1, fd2);
	}

	#[test]
	fn test_symlink_data_creation() {
		let fd = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: Some(path::PathBuf::from("target")),
		};
		assert_eq!(fd.tp, FileType::SymLink);
		assert_eq!(fd.size, 0);
		assert_eq!(fd.target, Some(path::PathBuf::from("target")));
		assert_eq!(fd.chunks.len(), 0);
	}

	#[test]
	fn test_symlink_data_without_target() {
		let fd = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: None,
		};
		assert_eq!(fd.tp, FileType::SymLink);
		assert_eq!(fd.target, None);
	}

	#[test]
	fn test_symlink_data_equality() {
		let fd1 = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: Some(path::PathBuf::from("target")),
		};

		let fd2 = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: Some(path::PathBuf::from("target")),
		};

		assert_eq!(fd1, fd2);
	}

	#[test]
	fn test_symlink_data_inequality() {
		let fd1 = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: Some(path::PathBuf::from("target1")),
		};

		let fd2 = FileData {
			tp: FileType::SymLink,
			path: path::PathBuf::from("link"),
			mode: 0o777,
			user: 1000,
			group: 1000,
			ctime: 1234567890,
			mtime: 1234567890,
			size: 0,
			chunks: vec![],
			target: Some(path::PathBuf::from("target2")),
		};

		assert_ne!(fd1, fd2);
	}
}

// vim: ts=4
