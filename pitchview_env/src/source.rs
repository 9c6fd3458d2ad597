//! Frame sources: the per-view video feed.

use crate::types::{Frame, ViewId};
use crate::EnvError;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// A stream of frames for one camera view.
///
/// `Ok(None)` signals end of stream; the runtime treats it as the stop
/// signal for the whole rig.
#[async_trait]
pub trait FrameSource: Send + 'static {
    async fn next_frame(&mut self) -> Result<Option<Frame>, EnvError>;
}

/// Frame source backed by a tokio channel.
///
/// Used when frames are decoded on another task (capture thread, network
/// receiver). Dropping the sender ends the stream.
pub struct ChannelFrameSource {
    view: ViewId,
    rx: mpsc::Receiver<Frame>,
}

impl ChannelFrameSource {
    /// Creates a bounded feed and returns the producer half with it.
    pub fn new(view: ViewId, capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { view, rx })
    }

    pub fn view(&self) -> ViewId {
        self.view
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, EnvError> {
        Ok(self.rx.recv().await)
    }
}

/// Replays a pre-recorded sequence of frames.
pub struct ReplayFrameSource {
    frames: VecDeque<Frame>,
}

impl ReplayFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for ReplayFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, EnvError> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_source_ends_stream() {
        let mut src = ReplayFrameSource::new(vec![Frame::filled(0, 2, 2, 0), Frame::filled(1, 2, 2, 0)]);
        assert_eq!(src.next_frame().await.unwrap().map(|f| f.index), Some(0));
        assert_eq!(src.next_frame().await.unwrap().map(|f| f.index), Some(1));
        assert!(src.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_channel_source_closes_with_sender() {
        let (tx, mut src) = ChannelFrameSource::new(ViewId(3), 4);
        tx.send(Frame::filled(7, 2, 2, 0)).await.unwrap();
        drop(tx);
        assert_eq!(src.next_frame().await.unwrap().map(|f| f.index), Some(7));
        assert!(src.next_frame().await.unwrap().is_none());
        assert_eq!(src.view(), ViewId(3));
    }
}
