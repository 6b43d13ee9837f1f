//! taskflow-ipc: canal explícito runner <-> paso por Unix domain socket.
pub mod errors;
pub mod proto;
pub mod server;

pub use errors::IpcError;
pub use proto::{IpcReply, IpcRequest, ENV_SOCKET};
pub use server::{ContextBridge, IpcServer};
