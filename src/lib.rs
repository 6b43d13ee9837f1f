//! TaskFlow Rust Library
//!
//! Este crate actúa como la fachada del workspace:
//! - Re-exporta el dominio (tasks, runs, contexto, líneas de log).
//! - Re-exporta el motor (`TaskEngine`, stores en memoria, configuración).
//! - Re-exporta el SDK síncrono para pasos escritos en Rust.
//!
//! Puede usarse desde `main.rs` o por otros crates/clientes.

pub use taskflow_core::{ContextStore, EngineError, InMemoryRunStore, InMemoryTaskRepository,
                        LogSink, RunLockTable, RunStatusView, RunnerConfig, StepExecutor,
                        StepOutcome, TaskEngine};
pub use taskflow_domain::{ContextMap, DomainError, LogLevel, LogLine, Run, RunStatus, StepRef,
                          Task, CONTEXT_MARKER};
pub use taskflow_ipc::{IpcError, IpcServer, ENV_SOCKET};
pub use taskflow_sdk::{SdkError, TaskClient};
