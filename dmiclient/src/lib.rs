//! Client-side core for the dmicade arcade cabinet: the IPC client that
//! talks to the external process manager over a Unix domain socket, the
//! newline-delimited text protocol it speaks, and the scene state machine
//! the protocol drives.

pub mod cli;
pub mod client;
pub mod protocol;
pub mod scene;
pub mod utils;

// Re-export common types for easier access
pub use client::{ClientChannels, ClientEvent, ConnectionStatus, PmClient, DEFAULT_SOCKET_PATH};
pub use protocol::{PmCommand, PmEvent};
pub use scene::{CrashContext, SceneEffect, SceneState, SceneStateMachine, StartFailure};
pub use utils::{ClientError, Result, SceneError};
