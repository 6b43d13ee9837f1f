//! Implementación del TaskEngine.

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, warn};
use uuid::Uuid;

use taskflow_domain::{ContextMap, Run, RunStatus};
use taskflow_ipc::IpcServer;

use crate::config::RunnerConfig;
use crate::context::ContextStore;
use crate::errors::EngineError;
use crate::executor::StepExecutor;
use crate::lock::RunLockTable;
use crate::policy::{ExitCodeFailureDetector, FailureDetector, OutputHeuristicFailureDetector};
use crate::registry::{RunRegistry, RunStatusView};
use crate::repo::{RunStore, StorageError, TaskRepository};
use crate::sink::LogSink;

/// Motor de orquestación de pipelines de scripts.
///
/// Genérico sobre los colaboradores de persistencia. Clonar el handle es
/// barato: todos los clones comparten el mismo estado interno (locks,
/// registro, stores).
pub struct TaskEngine<T, S>
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    inner: Arc<EngineInner<T, S>>,
}

impl<T, S> Clone for TaskEngine<T, S>
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    fn clone(&self) -> Self {
        TaskEngine { inner: self.inner.clone() }
    }
}

struct EngineInner<T, S>
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    config: RunnerConfig,
    tasks: T,
    runs: S,
    locks: RunLockTable,
    registry: RunRegistry,
    executor: StepExecutor,
    detectors: Vec<Box<dyn FailureDetector>>,
}

impl<T, S> TaskEngine<T, S>
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    /// Crea el motor con las políticas de fallo por defecto (código de
    /// salida + heurística de salida).
    pub fn new(config: RunnerConfig, tasks: T, runs: S) -> TaskEngine<T, S> {
        let executor = StepExecutor::new(&config.tasks_dir);
        let detectors: Vec<Box<dyn FailureDetector>> =
            vec![Box::new(ExitCodeFailureDetector), Box::new(OutputHeuristicFailureDetector::new())];
        TaskEngine { inner: Arc::new(EngineInner { config,
                                                   tasks,
                                                   runs,
                                                   locks: RunLockTable::new(),
                                                   registry: RunRegistry::new(),
                                                   executor,
                                                   detectors }) }
    }

    /// Acepta una ejecución de `task_id` con el contexto inicial dado.
    ///
    /// Carga la definición, adquiere el lock de la task dentro del plazo
    /// configurado, registra el run y lanza el pipeline en una tarea
    /// propia. Devuelve el id del run sin esperar a que ejecute.
    pub async fn submit_run(&self, task_id: &str, initial_context: ContextMap)
        -> Result<Uuid, EngineError>
    {
        let task = match self.inner.tasks.load_task(task_id).await {
            Ok(task) => task,
            Err(StorageError::TaskNotFound(id)) => return Err(EngineError::TaskNotFound(id)),
            Err(e) => return Err(EngineError::Storage(e)),
        };

        if !self.inner.locks.acquire(task_id, self.inner.config.lock_timeout).await {
            return Err(EngineError::TaskBusy(task_id.to_string()));
        }

        let mut run = Run::new(&task, initial_context);
        let run_id = run.id();
        if let Err(e) = self.prepare_run(&mut run).await {
            // Cualquier fallo tras adquirir el lock debe soltarlo.
            self.inner.locks.release(task_id);
            return Err(e);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            drive_run(inner, run).await;
        });
        debug!("submit:accepted task_id={task_id} run_id={run_id}");
        Ok(run_id)
    }

    async fn prepare_run(&self, run: &mut Run) -> Result<(), EngineError> {
        run.mark_running()?;
        self.inner.runs.insert_run(run).await?;
        self.inner.registry.insert(run.id(), run.task_id(), run.started_at());
        Ok(())
    }

    /// Estado actual de un run: primero el registro (runs vivos), después
    /// el run store (runs terminados).
    pub async fn run_status(&self, run_id: Uuid) -> Result<RunStatusView, EngineError> {
        if let Some(view) = self.inner.registry.status_view(run_id) {
            return Ok(view);
        }
        match self.inner.runs.load_run(run_id).await {
            Ok(run) => Ok(RunStatusView::from_run(&run)),
            Err(StorageError::RunNotFound(id)) => Err(EngineError::RunNotFound(id)),
            Err(e) => Err(EngineError::Storage(e)),
        }
    }

    /// Acceso de solo lectura al repositorio de tasks.
    pub fn task_repository(&self) -> &T { &self.inner.tasks }

    /// Acceso de solo lectura al run store.
    pub fn run_store(&self) -> &S { &self.inner.runs }

    /// Configuración activa del runner.
    pub fn config(&self) -> &RunnerConfig { &self.inner.config }

    /// Locks de task actualmente retenidos.
    pub fn active_locks(&self) -> usize { self.inner.locks.len() }

    /// Runs actualmente en ejecución.
    pub fn active_runs(&self) -> usize { self.inner.registry.len() }

    /// Indica si hay un run en vuelo para la task.
    pub fn is_task_running(&self, task_id: &str) -> bool {
        self.inner.locks.is_running(task_id)
    }
}

/// Conduce un run hasta su estado terminal. Corre en su propia tarea.
async fn drive_run<T, S>(inner: Arc<EngineInner<T, S>>, mut run: Run)
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    let run_id = run.id();
    let run_dir = inner.config.logs_dir.join(format!("run_{run_id}"));
    let store = ContextStore::new(run.initial_context().clone());

    let (status, ipc) = match IpcServer::bind(run_id, Arc::new(store.clone())) {
        Ok(server) => {
            let status = execute_pipeline(&inner, &run, &store, &server, &run_dir).await;
            (status, Some(server))
        }
        Err(e) => {
            error!("run ipc:bind error run_id={run_id} err={e}");
            (RunStatus::Error, None)
        }
    };

    // Sección terminal: transición guardada, persistencia y limpieza.
    let final_context = store.snapshot().await;
    if let Err(e) = run.mark_terminal(status, final_context) {
        error!("run terminal:transition error run_id={run_id} err={e}");
    }
    if let Err(e) = inner.runs.persist_run_terminal(&run).await {
        error!("run terminal:persist error run_id={run_id} err={e}");
    }
    inner.registry.remove(run_id);
    inner.locks.release(run.task_id());
    if let Some(server) = ipc {
        server.shutdown();
    }
    debug!("run finished run_id={run_id} status={status}");
}

/// Ejecuta los pasos en orden con corte al primer veredicto terminal.
async fn execute_pipeline<T, S>(inner: &EngineInner<T, S>,
                                run: &Run,
                                store: &ContextStore,
                                ipc: &IpcServer,
                                run_dir: &Path) -> RunStatus
    where T: TaskRepository + 'static,
          S: RunStore + 'static
{
    let run_id = run.id();
    if let Err(e) = tokio::fs::create_dir_all(run_dir).await {
        error!("run dir:create error run_id={run_id} err={e}");
        return RunStatus::Error;
    }

    for step in run.steps() {
        let script = step.script();
        inner.registry.set_current_script(run_id, script);
        debug!("step start run_id={run_id} script={script} position={}", step.position());

        // Sin sink el paso corre igual; solo se pierden sus logs.
        let sink = match LogSink::open(&run_dir.join(format!("{script}.log"))).await {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!("step sink:open error script={script} err={e}");
                None
            }
        };

        let outcome = match inner.executor
                                 .execute(step, store, sink.as_ref(), ipc, inner.config.step_timeout)
                                 .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("step execute:error run_id={run_id} script={script} err={e}");
                if let Some(sink) = sink {
                    let _ = sink.close().await;
                }
                return RunStatus::Error;
            }
        };

        if let Some(sink) = sink {
            match sink.close().await {
                Ok(lines) => debug!("step log:closed script={script} lines={lines}"),
                Err(e) => warn!("step log:close error script={script} err={e}"),
            }
        }

        let snapshot = store.snapshot().await;
        write_step_snapshot(run_dir, script, &snapshot).await;
        if let Err(e) = inner.runs.persist_step_context(run_id, script, &snapshot).await {
            error!("step context:persist error run_id={run_id} script={script} err={e}");
            return RunStatus::Error;
        }

        if outcome.timed_out {
            warn!("step timeout run_id={run_id} script={script}");
            return RunStatus::Timeout;
        }
        for detector in &inner.detectors {
            if let Some(reason) = detector.is_failure(&outcome) {
                warn!("step failed run_id={run_id} script={script} policy={} reason={reason}",
                      detector.name());
                return RunStatus::Failed;
            }
        }
        debug!("step ok run_id={run_id} script={script} duration_ms={}", outcome.duration.as_millis());
    }
    RunStatus::Success
}

/// Copia auditable del contexto tras el paso; un fallo de IO aquí solo
/// avisa, el run sigue.
async fn write_step_snapshot(run_dir: &Path, script: &str, snapshot: &ContextMap) {
    let path = run_dir.join(format!("{script}.context.json"));
    match serde_json::to_vec_pretty(snapshot) {
        Ok(payload) => {
            if let Err(e) = tokio::fs::write(&path, payload).await {
                warn!("step context:write error script={script} err={e}");
            }
        }
        Err(e) => warn!("step context:encode error script={script} err={e}"),
    }
}
