//! Registro en memoria de runs activos para consultas de estado.
//!
//! Las entradas viven mientras el run ejecuta y se retiran en la
//! transición terminal; el estado de runs terminados se responde desde el
//! run store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use taskflow_domain::{ContextMap, Run, RunStatus};

/// Entrada viva de un run en ejecución.
#[derive(Debug, Clone)]
struct ActiveRun {
    task_id: String,
    started_at: DateTime<Utc>,
    current_script: Option<String>,
}

/// Respuesta de una consulta de estado de run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub run_id: Uuid,
    pub task_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_script: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_context: Option<ContextMap>,
}

impl RunStatusView {
    /// Vista de un run terminado tal como quedó persistido.
    pub fn from_run(run: &Run) -> RunStatusView {
        RunStatusView { run_id: run.id(),
                        task_id: run.task_id().to_string(),
                        status: run.status(),
                        current_script: None,
                        started_at: run.started_at(),
                        finished_at: run.finished_at(),
                        final_context: run.final_context().cloned() }
    }
}

/// Tabla de runs activos.
#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<Uuid, ActiveRun>,
}

impl RunRegistry {
    pub fn new() -> RunRegistry { RunRegistry { runs: DashMap::new() } }

    pub fn insert(&self, run_id: Uuid, task_id: &str, started_at: DateTime<Utc>) {
        self.runs.insert(run_id, ActiveRun { task_id: task_id.to_string(),
                                             started_at,
                                             current_script: None });
    }

    /// Anota el script en curso del run.
    pub fn set_current_script(&self, run_id: Uuid, script: &str) {
        if let Some(mut entry) = self.runs.get_mut(&run_id) {
            entry.current_script = Some(script.to_string());
        }
    }

    /// Retira la entrada del run (transición terminal).
    pub fn remove(&self, run_id: Uuid) {
        self.runs.remove(&run_id);
    }

    /// Vista del run si sigue activo.
    pub fn status_view(&self, run_id: Uuid) -> Option<RunStatusView> {
        self.runs.get(&run_id).map(|entry| RunStatusView { run_id,
                                                           task_id: entry.task_id.clone(),
                                                           status: RunStatus::Running,
                                                           current_script: entry.current_script.clone(),
                                                           started_at: entry.started_at,
                                                           finished_at: None,
                                                           final_context: None })
    }

    pub fn len(&self) -> usize { self.runs.len() }
    pub fn is_empty(&self) -> bool { self.runs.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_reflects_current_script() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        registry.insert(run_id, "demo", Utc::now());

        let view = registry.status_view(run_id).expect("active view");
        assert_eq!(view.status, RunStatus::Running);
        assert!(view.current_script.is_none());

        registry.set_current_script(run_id, "b.sh");
        let view = registry.status_view(run_id).expect("active view");
        assert_eq!(view.current_script.as_deref(), Some("b.sh"));
    }

    #[test]
    fn removed_runs_disappear() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        registry.insert(run_id, "demo", Utc::now());
        assert_eq!(registry.len(), 1);
        registry.remove(run_id);
        assert!(registry.status_view(run_id).is_none());
        assert!(registry.is_empty(), "terminal transition must not leak entries");
    }

    #[test]
    fn set_current_on_unknown_run_is_a_noop() {
        let registry = RunRegistry::new();
        registry.set_current_script(Uuid::new_v4(), "x.sh");
        assert!(registry.is_empty());
    }
}
