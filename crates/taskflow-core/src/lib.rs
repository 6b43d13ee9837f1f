//! taskflow-core: motor de orquestación de pipelines de scripts.
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod lock;
pub mod policy;
pub mod registry;
pub mod repo;
pub mod sink;

pub use config::RunnerConfig;
pub use context::{parse_marker_updates, ContextStore};
pub use engine::TaskEngine;
pub use errors::EngineError;
pub use executor::{StepExecutor, StepOutcome};
pub use lock::RunLockTable;
pub use policy::{ExitCodeFailureDetector, FailureDetector, OutputHeuristicFailureDetector};
pub use registry::{RunRegistry, RunStatusView};
pub use repo::{InMemoryRunStore, InMemoryTaskRepository, RunStore, StorageError, TaskRepository};
pub use sink::LogSink;
