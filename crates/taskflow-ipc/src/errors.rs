//! Errores de la capa IPC.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("socket io: {0}")] Io(#[from] std::io::Error),
    #[error("codec: {0}")] Codec(#[from] serde_json::Error),
}
