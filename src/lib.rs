//! # syncr-p2p -- peer-to-peer file synchronization engine
//!
//! This crate is the sync engine that runs behind a coordinator/signal
//! server pair: it keeps a durable, content-addressed local replica of a
//! set of folders, exchanges file events with peers over WebRTC data
//! channels, and reconciles local and remote history through a tagged
//! `(Direction, EventKind)` strategy dispatch (see [`event_strategies`]).
//!
//! ## Core pieces
//!
//! - [`event_db`] / [`types`] -- durable event/file store and its row types.
//! - [`content_store`] -- refcounted content-addressed copy/patch store.
//! - [`event_strategies`] -- per-event register/apply logic (the heart).
//! - [`event_loader`] -- precedence-ordered batch selection from EventDB.
//! - [`event_processor`] -- orchestrator tying the above into worker tasks.
//! - [`connection`] / [`availability`] / [`download_manager`] -- the
//!   transport layer: data-channel pooling, byte-range advertisement, and
//!   patch/copy download.
//! - [`coordinator_client`] -- REST client for the coordinator service.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syncr_p2p::event_processor::EventProcessor;
//! use syncr_p2p::{ContentStore, EventDb};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = EventDb::open("events.redb")?;
//!     let store = ContentStore::open("content.redb")?;
//!     // wire up a CoordinatorClient and spawn an EventProcessor here.
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod availability;
pub mod config;
pub mod conflict;
pub mod connection;
pub mod content_store;
pub mod coordinator_client;
pub mod daque;
pub mod download_manager;
pub mod error;
pub mod event_db;
pub mod event_loader;
pub mod event_processor;
pub mod event_strategies;
pub mod exclusion;
pub mod gui;
pub mod logging;
pub mod metadata;
pub mod signal_client;
pub mod strategies; // Consolidated strategy/mode enums - declared early to avoid circular deps
pub mod types;

// Re-export commonly used types and functions
pub use availability::{AvailabilityConsumer, AvailabilityMessage, AvailabilitySupplier};
pub use conflict::rules::{ConflictRule, ConflictRuleSet};
pub use conflict::ConflictResolver;
pub use connection::ConnectivityManager;
pub use content_store::ContentStore;
pub use coordinator_client::{CoordinatorClient, ReqwestCoordinatorClient};
pub use daque::Daque;
pub use download_manager::{DownloadManager, TransferStatus};
pub use error::{ChunkError, ConnectionError, StateError, SyncError};
pub use event_db::EventDb;
pub use event_processor::EventProcessor;
pub use event_strategies::EventStrategies;
pub use exclusion::{ExclusionEngine, ExclusionError};
pub use gui::{gui_channel, GuiAction, GuiBridge, GuiEvent, GuiHandle};
pub use signal_client::{SignalClient, TungsteniteSignalClient};
#[allow(unused_imports)]
pub use metadata::{
	MetadataComparison, MetadataError, MetadataReconciler, MetadataStrategy, NodeCapabilities,
	ReconciliationMode,
};
pub use strategies::DeleteMode;
pub use types::{FileData, FileType, HashChunk};

// vim: ts=4
