//! Interactive terminal sessions over a message channel
//!
//! Inbound text frames are either a JSON control message (resize) or raw
//! input; everything else goes to remote stdin verbatim. Outbound frames
//! carry raw stdout and stderr bytes without distinguishing the two.

mod bridge;
mod channel;
mod control;

pub use bridge::{TerminalBridge, TerminalConfig};
pub use channel::{
    ChannelClosed, Frame, FrameChannel, FrameSink, FrameSource, MpscFrameSink, MpscFrameSource,
    frame_channel,
};
pub use control::ControlMessage;
