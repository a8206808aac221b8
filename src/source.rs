//! Where decoded events come from: the live transport or a replayed journal.
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::MalformedEventError;
use crate::event::{Event, Frame};

/// One pulled item. The outer `Option` ends the stream, the inner `Result` is a
/// single message that failed to decode and should be skipped.
pub type Pulled = Option<Result<Event, MalformedEventError>>;

/// Ordered stream of events consumed by the engine.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event. A transport failure is an `Err` and ends ingestion.
    async fn next_event(&mut self) -> anyhow::Result<Pulled>;
}

/// Source fed by an external transport that pushes raw frames into a channel.
///
/// Frames are stamped with the time they are pulled off the channel.
pub struct FrameChannel {
    rx: mpsc::Receiver<Frame>,
}

impl FrameChannel {
    /// Create a bounded channel. The transport keeps the sender; dropping it ends the stream.
    pub fn bounded(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for FrameChannel {
    async fn next_event(&mut self) -> anyhow::Result<Pulled> {
        Ok(self
            .rx
            .recv()
            .await
            .map(|frame| Event::decode(&frame, Utc::now())))
    }
}
