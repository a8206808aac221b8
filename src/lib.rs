#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! rebid-tracker: detects replace-by-fee (fee bump) sequences in a bitcoin node's
//! mempool notification stream and reports their fee history once per block.
//!
//! ## What you implement
//! - [`NodeRpc`]: fetch a transaction by id and the current chain height
//!   ([`rpc::bitcoind::BitcoindRpc`] talks to bitcoind).
//! - [`ReportSink`]: persist report rows ([`CsvFileSink`] writes a CSV file).
//! - [`Store`]: keep the last flushed height ([`SqliteStore`]).
//! - [`EventSource`]: deliver events in arrival order ([`FrameChannel`] for a live
//!   transport, [`JournalReader`] for replay).
//!
//! ## What the engine does
//! - Decodes `hashtx` / `rawtx` / `hashblock` / `sequence` frames into [`Event`]s.
//! - Groups raw transactions by the outpoints they spend; a group only starts from a
//!   transaction signalling replaceability, and every later spend of the same inputs is
//!   recorded as a bump with its fee.
//! - On each block, checks the node moved exactly one block ahead, writes rows for groups
//!   bumped more than the configured minimum, and clears the window.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use rebid_tracker::prelude::*;
//! use std::sync::Arc;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let rpc = Arc::new(BitcoindRpc::new(
//!         "http://127.0.0.1:8332", "user", "pass", std::time::Duration::from_secs(30),
//!     )?);
//!     let mut engine = RebidTracker::bootstrap(
//!         rpc,
//!         CsvFileSink::new("data/rebids.csv"),
//!         SqliteStore::new("data/rebid.sqlite")?,
//!     )
//!     .await?;
//!
//!     let (frames, mut source) = FrameChannel::bounded(1024);
//!     // hand `frames` to the transport, then:
//!     engine.run(&mut source).await?;
//!     Ok(())
//! }
//! ```
/// Window flush protocol and the tracked chain height.
pub mod boundary;

/// Environment configuration.
pub mod config;

/// Transaction grouping and fee history.
pub mod correlator;

/// Orchestrator tying decoder, correlator, boundary and emitter together.
pub mod engine;

/// Error taxonomy.
pub mod error;

/// Event model and wire decoder.
pub mod event;

/// Text journal of events for dump and replay.
pub mod journal;

/// tracing subscriber setup.
pub mod logging;

/// CSV report rows and sinks.
pub mod report;

/// Prevout value resolution with window-scoped caches.
pub mod resolver;

/// Node RPC collaborator.
pub mod rpc;

/// Event sources.
pub mod source;

/// Persistence layer (traits and SQLite implementation).
pub mod store;

// Public re-exports
pub use boundary::{BlockBoundary, Flushed};
pub use config::{BlockTrigger, Config};
pub use correlator::{Correlator, FeeBumpRecord, GroupKey, IngestOutcome};
pub use engine::{Handled, RebidTracker, RunSummary};
pub use error::{
    EngineError, MalformedEventError, NonSequentialBlockError, TransactionParseError,
    UpstreamLookupError,
};
pub use event::{Event, Frame, SequenceLabel};
pub use journal::{JournalReader, JournalWriter};
pub use report::{CsvFileSink, ReportEmitter, ReportRow, ReportSink};
pub use resolver::PrevoutResolver;
pub use rpc::{NodeRpc, TxMetadata};
pub use source::{EventSource, FrameChannel};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use store::Store;

/// Convenience prelude for end users.
pub mod prelude {
    #[cfg(feature = "rpc-bitcoind")]
    pub use crate::rpc::bitcoind::BitcoindRpc;
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
    pub use crate::{
        CsvFileSink, Event, EventSource, FrameChannel, JournalReader, NodeRpc, RebidTracker,
        ReportSink, Store,
    };
}
