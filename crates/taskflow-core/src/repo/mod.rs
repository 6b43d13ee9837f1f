//! Colaboradores de persistencia del motor.
//!
//! El motor es genérico sobre estos traits; las implementaciones en
//! memoria de este módulo sirven para tests, CLI y demos.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use taskflow_domain::{ContextMap, Run, Task};

mod memory;
pub use memory::{InMemoryRunStore, InMemoryTaskRepository};

/// Error de la capa de almacenamiento, agnóstico del backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("task not found: {0}")] TaskNotFound(String),
    #[error("run not found: {0}")] RunNotFound(Uuid),
    #[error("backend: {0}")] Backend(String),
}

/// Resolución de definiciones de task.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Carga la secuencia de pasos de una task por id.
    async fn load_task(&self, task_id: &str) -> Result<Task, StorageError>;
}

/// Registro de runs y de los snapshots de contexto por paso.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Registra el run al aceptarse el submit.
    async fn insert_run(&self, run: &Run) -> Result<(), StorageError>;

    /// Persiste el snapshot de contexto tras terminar un paso. Un fallo
    /// aquí aborta el pipeline con estado `error`.
    async fn persist_step_context(&self, run_id: Uuid, script: &str, snapshot: &ContextMap)
        -> Result<(), StorageError>;

    /// Registra el estado terminal y el contexto final del run.
    async fn persist_run_terminal(&self, run: &Run) -> Result<(), StorageError>;

    /// Recupera un run registrado.
    async fn load_run(&self, run_id: Uuid) -> Result<Run, StorageError>;

    /// Historial de snapshots por paso, en orden de ejecución.
    async fn load_step_contexts(&self, run_id: Uuid) -> Result<Vec<(String, ContextMap)>, StorageError>;
}
