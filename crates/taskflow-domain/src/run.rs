//! Runs: una ejecución concreta de una task, con estado y contexto final.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContextMap;
use crate::errors::DomainError;
use crate::task::{StepRef, Task};

/// Estado de un run.
///
/// Las transiciones válidas son:
/// - `Pending` -> `Running`
/// - `Running` -> `Success` | `Failed` | `Error` | `Timeout`
///
/// Los estados terminales son definitivos: una vez alcanzados, ninguna
/// transición posterior es válida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// El run fue aceptado pero aún no arranca.
    Pending,
    /// El run está ejecutando pasos.
    Running,
    /// Todos los pasos terminaron con código cero y sin políticas disparadas.
    Success,
    /// Un paso salió con código distinto de cero o una política lo marcó.
    Failed,
    /// Fallo interno del motor (spawn, IPC, persistencia).
    Error,
    /// Un paso superó su límite de tiempo y fue terminado.
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed | RunStatus::Error | RunStatus::Timeout)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Una ejecución de una task. Congela la secuencia de pasos y la huella de
/// definición en el momento del submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: Uuid,
    task_id: String,
    steps: Vec<StepRef>,
    definition_hash: String,
    initial_context: ContextMap,
    final_context: Option<ContextMap>,
    status: RunStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(task: &Task, initial_context: ContextMap) -> Self {
        Run { id: Uuid::new_v4(),
              task_id: task.id().to_string(),
              steps: task.steps().to_vec(),
              definition_hash: task.definition_hash(),
              initial_context,
              final_context: None,
              status: RunStatus::Pending,
              started_at: Utc::now(),
              finished_at: None }
    }

    /// Transición `Pending` -> `Running`.
    pub fn mark_running(&mut self) -> Result<(), DomainError> {
        if self.status != RunStatus::Pending {
            return Err(DomainError::InvalidTransition(self.status, RunStatus::Running));
        }
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Transición `Running` -> estado terminal, fijando el contexto final y
    /// la marca de tiempo de cierre. Rechaza destinos no terminales y
    /// cualquier transición sobre un run ya terminal.
    pub fn mark_terminal(&mut self, status: RunStatus, final_context: ContextMap)
        -> Result<(), DomainError>
    {
        if self.status.is_terminal() {
            return Err(DomainError::RunAlreadyTerminal);
        }
        if !status.is_terminal() || self.status != RunStatus::Running {
            return Err(DomainError::InvalidTransition(self.status, status));
        }
        self.status = status;
        self.final_context = Some(final_context);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn task_id(&self) -> &str { &self.task_id }
    pub fn steps(&self) -> &[StepRef] { &self.steps }
    pub fn definition_hash(&self) -> &str { &self.definition_hash }
    pub fn initial_context(&self) -> &ContextMap { &self.initial_context }
    pub fn final_context(&self) -> Option<&ContextMap> { self.final_context.as_ref() }
    pub fn status(&self) -> RunStatus { self.status }
    pub fn started_at(&self) -> DateTime<Utc> { self.started_at }
    pub fn finished_at(&self) -> Option<DateTime<Utc>> { self.finished_at }
}
