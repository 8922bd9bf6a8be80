//! Data models shared between the core components and their collaborators

mod host;
mod monitor;
mod session;

pub use host::{AuthMethod, DEFAULT_SSH_PORT, Host, HostStatus};
pub use monitor::{MonitorDefinition, MonitorKind, MonitorState, ProbeStatus, UptimeProbe};
pub use session::{CommandRecord, TerminalSession};
