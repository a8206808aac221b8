//! Block boundary protocol: each accepted block closes the current observation window.
use std::sync::Arc;

use tracing::{error, info};

use crate::correlator::Correlator;
use crate::error::{EngineError, NonSequentialBlockError, UpstreamLookupError};
use crate::report::{ReportEmitter, ReportSink};
use crate::rpc::NodeRpc;

/// Result of closing one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flushed {
    /// Height the closed window was attributed to.
    pub height: u32,
    /// Records the window held.
    pub records: usize,
    /// Report rows written.
    pub rows: usize,
}

/// Owns the tracked chain height. Advances by exactly one per accepted block.
pub struct BlockBoundary<R> {
    rpc: Arc<R>,
    height: u32,
}

impl<R: NodeRpc> BlockBoundary<R> {
    /// Start tracking from the node's current height.
    pub async fn bootstrap(rpc: Arc<R>) -> Result<Self, UpstreamLookupError> {
        let height = rpc
            .get_chain_height()
            .await
            .map_err(UpstreamLookupError::ChainHeight)?;
        info!(height, "tracking chain height");
        Ok(Self { rpc, height })
    }

    /// Start tracking from a known height.
    pub fn at_height(rpc: Arc<R>, height: u32) -> Self {
        Self { rpc, height }
    }

    /// Height of the open window.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Close the open window: flush its records, reset the correlator, move to the next height.
    ///
    /// The node must report exactly `height + 1`. On any error returned from here nothing
    /// is flushed, reset or advanced. Progress bookkeeping after a successful advance is
    /// the caller's.
    ///
    /// # Errors
    /// [`EngineError::NonSequentialBlock`] on a height gap, [`EngineError::BoundaryLookup`]
    /// when the height query fails, [`EngineError::Report`] when the sink fails.
    pub async fn advance<K: ReportSink>(
        &mut self,
        correlator: &mut Correlator<R>,
        emitter: &ReportEmitter<K>,
    ) -> Result<Flushed, EngineError> {
        let latest = self
            .rpc
            .get_chain_height()
            .await
            .map_err(|e| EngineError::BoundaryLookup(UpstreamLookupError::ChainHeight(e)))?;

        let current = self.height;
        if Some(latest) != current.checked_add(1) {
            let gap = NonSequentialBlockError { current, latest };
            error!(current, latest, "non-sequential block, halting");
            return Err(gap.into());
        }

        let snapshot = correlator.snapshot();
        let rows = emitter
            .flush(&snapshot, current)
            .await
            .map_err(|source| EngineError::Report {
                height: current,
                source,
            })?;

        correlator.reset();
        self.height = latest;

        let bumped = snapshot.iter().filter(|r| r.is_bumped()).count();
        info!(height = current, records = snapshot.len(), bumped, rows, "window flushed");
        Ok(Flushed {
            height: current,
            records: snapshot.len(),
            rows,
        })
    }
}
