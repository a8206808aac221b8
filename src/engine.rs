//! Single-consumer orchestrator:
//! 1) decode each event in arrival order,
//! 2) fold raw transactions into the correlator,
//! 3) on each block, flush the window and advance the tracked height.
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::{
    boundary::{BlockBoundary, Flushed},
    config::BlockTrigger,
    correlator::{Correlator, IngestOutcome},
    error::EngineError,
    event::{Event, SequenceLabel},
    journal::JournalWriter,
    report::{ReportEmitter, ReportSink},
    resolver::PrevoutResolver,
    rpc::NodeRpc,
    source::EventSource,
    store::Store,
};

/// What the engine did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// A raw transaction went through the correlator.
    Ingested(IngestOutcome),
    /// A block closed the window.
    Flushed(Flushed),
    /// Informational event with no effect on state.
    Ignored,
}

/// Counters for one [`RebidTracker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events pulled from the source, including malformed ones.
    pub events: u64,
    /// Events dropped after a recoverable error.
    pub dropped: u64,
    /// Windows flushed.
    pub flushes: u64,
}

/// Core engine. `R` = node RPC, `K` = report sink, `S` = progress store.
pub struct RebidTracker<R, K, S> {
    correlator: Correlator<R>,
    boundary: BlockBoundary<R>,
    emitter: ReportEmitter<K>,
    store: S,
    trigger: BlockTrigger,
    journal: Option<JournalWriter>,
}

impl<R, K, S> RebidTracker<R, K, S>
where
    R: NodeRpc + 'static,
    K: ReportSink + 'static,
    S: Store + 'static,
{
    /// Engine starting at a known chain `height`.
    pub fn new(rpc: Arc<R>, sink: K, store: S, height: u32) -> Self {
        Self {
            correlator: Correlator::new(PrevoutResolver::new(rpc.clone())),
            boundary: BlockBoundary::at_height(rpc, height),
            emitter: ReportEmitter::new(sink),
            store,
            trigger: BlockTrigger::default(),
            journal: None,
        }
    }

    /// Engine starting at the node's current height.
    ///
    /// # Errors
    /// Returns an error if the node cannot report its height.
    pub async fn bootstrap(rpc: Arc<R>, sink: K, store: S) -> Result<Self, EngineError> {
        let boundary = BlockBoundary::bootstrap(rpc.clone())
            .await
            .map_err(EngineError::BoundaryLookup)?;
        if let Some(last) = store
            .last_flushed_height()
            .await
            .map_err(EngineError::Persistence)?
        {
            if last >= boundary.height() {
                warn!(last_flushed = last, height = boundary.height(), "node is not ahead of the last flushed window");
            } else {
                debug!(last_flushed = last, height = boundary.height(), "resuming");
            }
        }
        Ok(Self::new(rpc, sink, store, boundary.height()))
    }

    /// Report records with more than `min` observations.
    pub fn with_min_history(mut self, min: usize) -> Self {
        self.emitter = self.emitter.with_min_history(min);
        self
    }

    /// Cap the records one window may hold.
    pub fn with_max_records(mut self, cap: usize) -> Self {
        self.correlator = self.correlator.with_max_records(cap);
        self
    }

    /// Choose which notification closes a window.
    pub fn with_block_trigger(mut self, trigger: BlockTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Append every handled event to `journal`.
    pub fn with_journal(mut self, journal: JournalWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Height of the open window.
    pub fn height(&self) -> u32 {
        self.boundary.height()
    }

    /// Live correlation state.
    pub fn correlator(&self) -> &Correlator<R> {
        &self.correlator
    }

    /// Progress store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Report emitter.
    pub fn emitter(&self) -> &ReportEmitter<K> {
        &self.emitter
    }

    /// Apply one event.
    ///
    /// # Errors
    /// Recoverable errors ([`EngineError::is_fatal`] false) leave the engine ready for the
    /// next event. Fatal ones mean ingestion must stop.
    pub async fn handle(&mut self, event: Event) -> Result<Handled, EngineError> {
        if let Some(journal) = self.journal.as_mut() {
            journal
                .append(&event)
                .await
                .map_err(EngineError::Persistence)?;
        }

        match event {
            Event::RawTransaction(raw) => {
                let tx = raw.deserialize()?;
                let outcome = self.correlator.ingest(tx, raw.timestamp).await?;
                Ok(Handled::Ingested(outcome))
            }
            Event::TransactionHash(e) => {
                trace!(sequence = e.sequence, tx_hash = %hex::encode(e.tx_hash), "hashtx");
                Ok(Handled::Ignored)
            }
            Event::BlockHash(e) => {
                if self.trigger == BlockTrigger::HashBlock {
                    self.close_window().await
                } else {
                    debug!(block_hash = %hex::encode(e.block_hash), "hashblock ignored, boundary driven by sequence");
                    Ok(Handled::Ignored)
                }
            }
            Event::SequenceSignal(e) => match e.label {
                SequenceLabel::BlockConnected
                    if self.trigger == BlockTrigger::SequenceConnected =>
                {
                    self.close_window().await
                }
                SequenceLabel::BlockDisconnected => {
                    warn!(block_hash = %hex::encode(e.hash), height = self.height(), "block disconnected; reorgs are not reconciled");
                    Ok(Handled::Ignored)
                }
                SequenceLabel::Unlabeled(b) => {
                    warn!(label = b, hash = %hex::encode(e.hash), "unlabeled sequence signal");
                    Ok(Handled::Ignored)
                }
                label => {
                    trace!(?label, mempool_sequence = ?e.mempool_sequence, "sequence");
                    Ok(Handled::Ignored)
                }
            },
        }
    }

    /// Flush through the boundary, then record progress.
    ///
    /// The store is written only once the report is on disk and the window is closed, so
    /// its marker never runs ahead of the report. A store failure is therefore reported
    /// after the window has been committed: the height has moved on and the report
    /// holds the rows.
    async fn close_window(&mut self) -> Result<Handled, EngineError> {
        let flushed = self
            .boundary
            .advance(&mut self.correlator, &self.emitter)
            .await?;
        self.store
            .record_flush(flushed.height, flushed.rows)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(Handled::Flushed(flushed))
    }

    /// Consume `source` until it ends or a fatal error occurs.
    ///
    /// Malformed messages, unparsable transactions and failed prevout lookups are logged
    /// and skipped.
    pub async fn run<E: EventSource + ?Sized>(
        &mut self,
        source: &mut E,
    ) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::default();
        loop {
            let pulled = source
                .next_event()
                .await
                .map_err(EngineError::Transport)?;
            let Some(decoded) = pulled else {
                return Ok(summary);
            };
            summary.events += 1;

            let event = match decoded {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "malformed event dropped");
                    summary.dropped += 1;
                    continue;
                }
            };

            match self.handle(event).await {
                Ok(Handled::Flushed(_)) => summary.flushes += 1,
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, height = self.height(), "fatal, stopping ingestion");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "event dropped");
                    summary.dropped += 1;
                }
            }
        }
    }
}
