//! Error types for SyncR operations

use std::error::Error;
use std::fmt;
use std::io;

// Import orphaned error types that need From implementations
use crate::exclusion::ExclusionError;
use crate::metadata::MetadataError;

/// Helper function to reduce Box::new() boilerplate when wrapping errors
///
/// This function is useful for reducing verbosity when manually wrapping error types
/// into `Box<dyn Error + Send + Sync>` for error variant fields.
///
/// # Examples
///
/// ```ignore
/// // Before
/// SyncError::Metadata(Box::new(err) as Box<dyn Error + Send + Sync>)
///
/// // After
/// SyncError::Metadata(boxed_error(err))
/// ```
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Main error type for sync operations
///
/// This is the unified error type that encompasses all sync-related errors.
/// It contains both direct variants for common errors and nested variants
/// for domain-specific errors.
#[derive(Debug)]
pub enum SyncError {
	/// Failed to connect to a location
	ConnectionFailed { location: String, source: Box<dyn Error + Send + Sync> },

	/// Permission denied on a path
	PermissionDenied { path: String },

	/// Sync state is corrupted
	StateCorrupted { message: String },

	/// Protocol version mismatch
	ProtocolMismatch { local: u8, remote: u8 },

	/// Hash verification failed
	HashMismatch { expected: String, actual: String },

	/// I/O error
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// Operation aborted by user
	Aborted,

	/// Connection error (nested)
	Connection(ConnectionError),

	/// Chunk error (nested)
	Chunk(ChunkError),

	/// State error (nested)
	State(StateError),

	/// Conflict error (nested)
	Conflict(ConflictError),

	/// Content store error (nested) - copy/patch refcount accounting
	ContentStore(ContentStoreError),

	/// Event database error (nested)
	EventDb(EventDbError),

	/// Availability protocol error (nested)
	Availability(AvailabilityError),

	/// Event strategy dispatch/apply error (nested)
	Strategy(StrategyError),

	/// Event loader query error (nested)
	Loader(EventDbError),

	/// Coordinator/signal-server protocol error (nested)
	Remote(RemoteError),

	/// Remote processing was aborted by a global stop flag
	ProcessingAborted,

	/// Protocol error (nested) - domain-specific protocol communication errors
	Protocol(Box<dyn Error + Send + Sync>),

	/// Metadata error (nested) - capability detection and metadata operations
	Metadata(Box<dyn Error + Send + Sync>),

	/// Exclusion error (nested) - file pattern and filter errors
	Exclusion(Box<dyn Error + Send + Sync>),

	/// Configuration parsing error (nested)
	ConfigParse(Box<dyn Error + Send + Sync>),

	/// Configuration discovery error (nested)
	ConfigDiscovery(Box<dyn Error + Send + Sync>),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::ConnectionFailed { location, source } => {
				write!(f, "Failed to connect to {}: {}", location, source)
			}
			SyncError::PermissionDenied { path } => {
				write!(f, "Permission denied: {}", path)
			}
			SyncError::StateCorrupted { message } => {
				write!(f, "Sync state corrupted: {}", message)
			}
			SyncError::ProtocolMismatch { local, remote } => {
				write!(f, "Protocol version mismatch: local={}, remote={}", local, remote)
			}
			SyncError::HashMismatch { expected, actual } => {
				write!(f, "Hash mismatch: expected {}, got {}", expected, actual)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::LockFailed { message } => {
				write!(f, "Lock acquisition failed: {}", message)
			}
			SyncError::Aborted => write!(f, "Operation aborted by user"),
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Chunk(e) => write!(f, "Chunk error: {}", e),
			SyncError::State(e) => write!(f, "State error: {}", e),
			SyncError::Conflict(e) => write!(f, "Conflict error: {}", e),
			SyncError::ContentStore(e) => write!(f, "Content store error: {}", e),
			SyncError::EventDb(e) => write!(f, "Event database error: {}", e),
			SyncError::Availability(e) => write!(f, "Availability protocol error: {}", e),
			SyncError::Strategy(e) => write!(f, "Event strategy error: {}", e),
			SyncError::Loader(e) => write!(f, "Event loader error: {}", e),
			SyncError::Remote(e) => write!(f, "Remote service error: {}", e),
			SyncError::ProcessingAborted => write!(f, "Processing aborted"),
			SyncError::Protocol(e) => write!(f, "Protocol error: {}", e),
			SyncError::Metadata(e) => write!(f, "Metadata error: {}", e),
			SyncError::Exclusion(e) => write!(f, "Exclusion error: {}", e),
			SyncError::ConfigParse(e) => write!(f, "Configuration parse error: {}", e),
			SyncError::ConfigDiscovery(e) => write!(f, "Configuration discovery error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<Box<dyn Error>> for SyncError {
	fn from(e: Box<dyn Error>) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ChunkError> for SyncError {
	fn from(e: ChunkError) -> Self {
		SyncError::Chunk(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<ConflictError> for SyncError {
	fn from(e: ConflictError) -> Self {
		SyncError::Conflict(e)
	}
}

impl From<ContentStoreError> for SyncError {
	fn from(e: ContentStoreError) -> Self {
		SyncError::ContentStore(e)
	}
}

impl From<EventDbError> for SyncError {
	fn from(e: EventDbError) -> Self {
		SyncError::EventDb(e)
	}
}

impl From<AvailabilityError> for SyncError {
	fn from(e: AvailabilityError) -> Self {
		SyncError::Availability(e)
	}
}

impl From<StrategyError> for SyncError {
	fn from(e: StrategyError) -> Self {
		SyncError::Strategy(e)
	}
}

impl From<RemoteError> for SyncError {
	fn from(e: RemoteError) -> Self {
		SyncError::Remote(e)
	}
}

impl From<ExclusionError> for SyncError {
	fn from(e: ExclusionError) -> Self {
		SyncError::Exclusion(boxed_error(e))
	}
}

impl From<MetadataError> for SyncError {
	fn from(e: MetadataError) -> Self {
		SyncError::Metadata(boxed_error(e))
	}
}

/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// SSH connection failed
	SshFailed { host: String, source: Box<dyn Error + Send + Sync> },

	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// Protocol handshake failed
	HandshakeFailed { message: String },

	/// Protocol error (invalid message format)
	ProtocolError { message: String },

	/// Connection disconnected unexpectedly
	Disconnected,

	/// Operation timeout
	Timeout,

	/// Stdio unavailable
	StdioUnavailable { what: String },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SshFailed { host, source } => {
				write!(f, "Failed to connect via SSH to {}: {}", host, source)
			}
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::HandshakeFailed { message } => {
				write!(f, "Failed to complete handshake: {}", message)
			}
			ConnectionError::ProtocolError { message } => {
				write!(f, "Protocol error: {}", message)
			}
			ConnectionError::Disconnected => write!(f, "Connection disconnected unexpectedly"),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::StdioUnavailable { what } => {
				write!(f, "Failed to access {}: stdio unavailable", what)
			}
		}
	}
}

impl Error for ConnectionError {}

/// Chunking-specific errors
#[derive(Debug)]
pub enum ChunkError {
	/// Failed to read chunk data
	ReadFailed { source: io::Error },

	/// Invalid chunk configuration
	InvalidConfig { message: String },

	/// Hash verification failed
	HashFailed { message: String },

	/// Chunk size out of bounds
	SizeOutOfBounds { size: usize, max: usize },
}

impl fmt::Display for ChunkError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChunkError::ReadFailed { source } => write!(f, "Failed to read chunk: {}", source),
			ChunkError::InvalidConfig { message } => {
				write!(f, "Invalid chunk configuration: {}", message)
			}
			ChunkError::HashFailed { message } => {
				write!(f, "Failed to verify chunk hash: {}", message)
			}
			ChunkError::SizeOutOfBounds { size, max } => {
				write!(f, "Chunk size {} exceeds maximum allowed size {}", size, max)
			}
		}
	}
}

impl Error for ChunkError {}

impl From<io::Error> for ChunkError {
	fn from(e: io::Error) -> Self {
		ChunkError::ReadFailed { source: e }
	}
}

/// State management errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load state
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save state
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// State file is corrupted
	Corrupted { message: String },

	/// Invalid state directory
	InvalidDirectory { path: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save state: {}", source),
			StateError::LockFailed { message } => write!(f, "Lock failed: {}", message),
			StateError::Corrupted { message } => write!(f, "State corrupted: {}", message),
			StateError::InvalidDirectory { path } => {
				write!(f, "Invalid state directory: {}", path)
			}
		}
	}
}

impl Error for StateError {}

/// Conflict resolution errors
#[derive(Debug)]
pub enum ConflictError {
	/// Invalid winner choice (index out of range)
	InvalidChoice { choice: usize, max: usize },

	/// User cancelled operation
	UserCancelled,

	/// Conflict resolution strategy failed
	StrategyFailed { message: String },

	/// Conflict is unresolvable
	Unresolvable { message: String },
}

impl fmt::Display for ConflictError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictError::InvalidChoice { choice, max } => {
				write!(f, "Invalid choice {}: must be between 0 and {}", choice, max - 1)
			}
			ConflictError::UserCancelled => write!(f, "Operation cancelled by user"),
			ConflictError::StrategyFailed { message } => {
				write!(f, "Failed to resolve conflict: {}", message)
			}
			ConflictError::Unresolvable { message } => {
				write!(f, "Cannot resolve conflict: {}", message)
			}
		}
	}
}

impl Error for ConflictError {}

// ============================================================================
// UNIFIED ERROR SYSTEM - From implementations for orphaned error types
// ============================================================================
// These implementations enable seamless conversion of specialized error types
// to the unified SyncError type, supporting the error consolidation refactoring.

impl From<Box<dyn Error + Send + Sync>> for SyncError {
	fn from(e: Box<dyn Error + Send + Sync>) -> Self {
		SyncError::Other { message: e.to_string() }
	}
}

// Note: ProtocolError, MetadataError, ExclusionError, ConfigParseError,
// and DiscoveryError are handled via generic Box conversions.
// To properly integrate orphaned error types, implement From<T> for SyncError
// where T is each orphaned error type once they're imported.
//
// Example (uncomment when ready to fully consolidate):
// impl From<ProtocolError> for SyncError {
//     fn from(e: ProtocolError) -> Self {
//         SyncError::Protocol(Box::new(e))
//     }
// }

// Convenience conversion from Box<dyn Error> for original error handling
pub fn box_error_to_sync_error(e: Box<dyn Error>) -> SyncError {
	SyncError::Other { message: e.to_string() }
}

/// ContentStore-specific errors (copy/patch refcount accounting, §4.1)
#[derive(Debug)]
pub enum ContentStoreError {
	/// The underlying redb table could not be opened or written
	Storage { source: Box<dyn Error + Send + Sync> },

	/// A patch id was referenced that the store has never seen
	UnknownPatch { patch_id: String },

	/// A commit was attempted with no matching set of postponed changes
	NoPendingBatch,
}

impl fmt::Display for ContentStoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ContentStoreError::Storage { source } => write!(f, "content store storage error: {}", source),
			ContentStoreError::UnknownPatch { patch_id } => {
				write!(f, "unknown patch id: {}", patch_id)
			}
			ContentStoreError::NoPendingBatch => {
				write!(f, "commit_last_changes() called with no pending batch")
			}
		}
	}
}

impl Error for ContentStoreError {}

/// EventDB-specific errors (§4.2)
#[derive(Debug)]
pub enum EventDbError {
	/// The underlying redb table could not be opened or written
	Storage { source: Box<dyn Error + Send + Sync> },

	/// A transient lock-contention error; callers should retry with backoff
	Busy,

	/// A persistent error; the sync folder is probably gone
	FolderRemoved { message: String },

	/// A row referenced an id that does not exist
	NotFound { what: String },
}

impl fmt::Display for EventDbError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventDbError::Storage { source } => write!(f, "event database storage error: {}", source),
			EventDbError::Busy => write!(f, "event database busy"),
			EventDbError::FolderRemoved { message } => {
				write!(f, "sync folder possibly removed: {}", message)
			}
			EventDbError::NotFound { what } => write!(f, "not found: {}", what),
		}
	}
}

impl Error for EventDbError {}

impl EventDbError {
	/// Whether a caller should retry this error with bounded backoff
	/// rather than treat it as fatal.
	pub fn is_transient(&self) -> bool {
		matches!(self, EventDbError::Busy)
	}
}

/// Availability Protocol errors (§4.4)
#[derive(Debug)]
pub enum AvailabilityError {
	/// Envelope did not start with the expected magic cookie
	BadMagic { found: u32 },

	/// Envelope declared a message kind this implementation doesn't know
	UnknownKind { kind: u8 },

	/// Envelope was truncated or otherwise malformed
	Malformed { message: String },

	/// The requested object is not locally held
	ObjectUnavailable,

	/// The data channel used to send/receive the envelope is closed
	ChannelClosed,
}

impl fmt::Display for AvailabilityError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AvailabilityError::BadMagic { found } => {
				write!(f, "bad availability envelope magic: {:#010x}", found)
			}
			AvailabilityError::UnknownKind { kind } => {
				write!(f, "unknown availability message kind: {}", kind)
			}
			AvailabilityError::Malformed { message } => {
				write!(f, "malformed availability envelope: {}", message)
			}
			AvailabilityError::ObjectUnavailable => write!(f, "object not locally available"),
			AvailabilityError::ChannelClosed => write!(f, "data channel closed"),
		}
	}
}

impl Error for AvailabilityError {}

/// EventStrategies errors (§4.5) -- a strategy refuses to proceed, or a
/// downstream collaborator (filesystem, coordinator) rejected an operation
/// in a way the strategy can't recover from inline.
#[derive(Debug)]
pub enum StrategyError {
	/// The on-disk file vanished, already existed, or had the wrong
	/// events_file_id between the decision to act and the act itself.
	FilesystemRace { message: String },

	/// Drop the event back to the loader and try again next cycle.
	SkipEventForNow,

	/// A patch could not be applied; the caller should downgrade the event
	/// to `received` and fall back to a full-copy download.
	PatchApplyFailed { message: String },

	/// The coordinator rejected registration with a recognized errcode not
	/// handled inline by the strategy (surfaced for the processor's routing
	/// table, SPEC_FULL §4.5/§7).
	Rejected { errcode: String, message: String },

	/// A referenced copy or patch is missing from ContentStore.
	ContentMissing { what: String },

	/// The strategy observed the global stop flag.
	Aborted,
}

impl fmt::Display for StrategyError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StrategyError::FilesystemRace { message } => write!(f, "filesystem race: {}", message),
			StrategyError::SkipEventForNow => write!(f, "skip event for now"),
			StrategyError::PatchApplyFailed { message } => write!(f, "patch apply failed: {}", message),
			StrategyError::Rejected { errcode, message } => {
				write!(f, "registration rejected ({}): {}", errcode, message)
			}
			StrategyError::ContentMissing { what } => write!(f, "content missing: {}", what),
			StrategyError::Aborted => write!(f, "processing aborted"),
		}
	}
}

impl Error for StrategyError {}

/// Errors from the coordinator REST client and the signal-server WebSocket
/// client (§6).
#[derive(Debug)]
pub enum RemoteError {
	/// The HTTP/WebSocket transport itself failed.
	Transport { source: Box<dyn Error + Send + Sync> },

	/// The peer returned a response this client couldn't parse.
	BadResponse { message: String },

	/// The coordinator replied with a recognized `errcode`.
	ErrorCode { code: String, info: Option<String> },

	/// The signal-server connection dropped.
	Disconnected,
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::Transport { source } => write!(f, "transport error: {}", source),
			RemoteError::BadResponse { message } => write!(f, "bad response: {}", message),
			RemoteError::ErrorCode { code, info } => match info {
				Some(info) => write!(f, "coordinator error {}: {}", code, info),
				None => write!(f, "coordinator error {}", code),
			},
			RemoteError::Disconnected => write!(f, "signal server disconnected"),
		}
	}
}

impl Error for RemoteError {}

// vim: ts=4
