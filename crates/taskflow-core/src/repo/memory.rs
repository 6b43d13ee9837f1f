//! Implementaciones en memoria de los colaboradores de persistencia.

use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use uuid::Uuid;

use taskflow_domain::{ContextMap, Run, Task};

use super::{RunStore, StorageError, TaskRepository};

/// Repositorio de tasks respaldado por un mapa en memoria.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: DashMap<String, Task>,
}

impl InMemoryTaskRepository {
    pub fn new() -> InMemoryTaskRepository { InMemoryTaskRepository { tasks: DashMap::new() } }

    /// Alta (o reemplazo) de una definición.
    pub fn register(&self, task: Task) {
        self.tasks.insert(task.id().to_string(), task);
    }

    pub fn len(&self) -> usize { self.tasks.len() }
    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn load_task(&self, task_id: &str) -> Result<Task, StorageError> {
        self.tasks.get(task_id)
                  .map(|entry| entry.clone())
                  .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }
}

/// Run store en memoria. El historial de contextos por paso conserva el
/// orden de inserción.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<Uuid, Run>,
    step_contexts: DashMap<Uuid, IndexMap<String, ContextMap>>,
}

impl InMemoryRunStore {
    pub fn new() -> InMemoryRunStore {
        InMemoryRunStore { runs: DashMap::new(),
                           step_contexts: DashMap::new() }
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, run: &Run) -> Result<(), StorageError> {
        self.runs.insert(run.id(), run.clone());
        Ok(())
    }

    async fn persist_step_context(&self, run_id: Uuid, script: &str, snapshot: &ContextMap)
        -> Result<(), StorageError>
    {
        self.step_contexts.entry(run_id)
                          .or_default()
                          .insert(script.to_string(), snapshot.clone());
        Ok(())
    }

    async fn persist_run_terminal(&self, run: &Run) -> Result<(), StorageError> {
        self.runs.insert(run.id(), run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Run, StorageError> {
        self.runs.get(&run_id)
                 .map(|entry| entry.clone())
                 .ok_or(StorageError::RunNotFound(run_id))
    }

    async fn load_step_contexts(&self, run_id: Uuid) -> Result<Vec<(String, ContextMap)>, StorageError> {
        let contexts = self.step_contexts.get(&run_id)
                                         .map(|entry| entry.iter()
                                                           .map(|(k, v)| (k.clone(), v.clone()))
                                                           .collect())
                                         .unwrap_or_default();
        Ok(contexts)
    }
}
