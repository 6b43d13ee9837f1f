//! Errores del motor de orquestación.

use thiserror::Error;
use uuid::Uuid;

use taskflow_domain::DomainError;
use taskflow_ipc::IpcError;

use crate::repo::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task not found: {0}")] TaskNotFound(String),
    #[error("task busy: {0}")] TaskBusy(String),
    #[error("run not found: {0}")] RunNotFound(Uuid),
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("ipc: {0}")] Ipc(#[from] IpcError),
    #[error("storage: {0}")] Storage(#[from] StorageError),
    #[error("domain: {0}")] Domain(#[from] DomainError),
    #[error("internal: {0}")] Internal(String),
}
