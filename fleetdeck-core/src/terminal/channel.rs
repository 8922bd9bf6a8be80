//! Full-duplex message channel seen by the terminal bridge
//!
//! A WebSocket or any other framed transport plugs in by implementing
//! [`FrameSink`] and [`FrameSource`]. [`frame_channel`] gives an in-process
//! pair backed by tokio mpsc channels.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One message on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text; inbound text may carry a control message
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Orderly close
    Close,
}

impl Frame {
    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
            Self::Close => 0,
        }
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The peer is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Channel closed")]
pub struct ChannelClosed;

/// Outbound half; shared by the stdout and stderr forwarders
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Sends one frame
    async fn send(&self, frame: Frame) -> Result<(), ChannelClosed>;
}

/// Inbound half
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when the peer went away
    async fn recv(&mut self) -> Option<Frame>;
}

/// Sending end backed by an mpsc channel
#[derive(Debug, Clone)]
pub struct MpscFrameSink(mpsc::Sender<Frame>);

#[async_trait]
impl FrameSink for MpscFrameSink {
    async fn send(&self, frame: Frame) -> Result<(), ChannelClosed> {
        self.0.send(frame).await.map_err(|_| ChannelClosed)
    }
}

/// Receiving end backed by an mpsc channel
#[derive(Debug)]
pub struct MpscFrameSource(mpsc::Receiver<Frame>);

#[async_trait]
impl FrameSource for MpscFrameSource {
    async fn recv(&mut self) -> Option<Frame> {
        self.0.recv().await
    }
}

/// One end of an in-process duplex channel
#[derive(Debug)]
pub struct FrameChannel {
    /// Frames sent to the other end
    pub sink: MpscFrameSink,
    /// Frames received from the other end
    pub source: MpscFrameSource,
}

/// Creates two connected channel ends
#[must_use]
pub fn frame_channel(capacity: usize) -> (FrameChannel, FrameChannel) {
    let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, b_rx) = mpsc::channel(capacity.max(1));
    (
        FrameChannel {
            sink: MpscFrameSink(a_tx),
            source: MpscFrameSource(b_rx),
        },
        FrameChannel {
            sink: MpscFrameSink(b_tx),
            source: MpscFrameSource(a_rx),
        },
    )
}
