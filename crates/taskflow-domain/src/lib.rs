// taskflow-domain library entry point
pub mod context;
pub mod errors;
pub mod log;
pub mod run;
pub mod task;
pub use context::{env_string, merge_context, ContextMap, CONTEXT_MARKER};
pub use errors::DomainError;
pub use log::{LogLevel, LogLine};
pub use run::{Run, RunStatus};
pub use task::{StepRef, Task};
