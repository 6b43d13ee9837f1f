use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

use taskflow_rust::{ContextMap, EngineError, InMemoryRunStore, InMemoryTaskRepository, RunStatus,
                    RunStatusView, RunnerConfig, Task, TaskEngine};

type MemoryEngine = TaskEngine<InMemoryTaskRepository, InMemoryRunStore>;

fn scratch(name: &str) -> (PathBuf, PathBuf, PathBuf) {
    let base = std::env::temp_dir().join(format!("taskflow-runner-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&base);
    let tasks = base.join("tasks");
    let logs = base.join("logs");
    fs::create_dir_all(&tasks).expect("crear tasks dir");
    fs::create_dir_all(&logs).expect("crear logs dir");
    (base, tasks, logs)
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("escribir script");
}

fn memory_engine(tasks: &Path, logs: &Path, step_timeout: Duration, lock_timeout: Duration)
    -> MemoryEngine
{
    let config = RunnerConfig { tasks_dir: tasks.to_path_buf(),
                                logs_dir: logs.to_path_buf(),
                                step_timeout,
                                lock_timeout };
    TaskEngine::new(config, InMemoryTaskRepository::new(), InMemoryRunStore::new())
}

async fn wait_terminal(engine: &MemoryEngine, run_id: Uuid) -> RunStatusView {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let view = engine.run_status(run_id).await.expect("consultar estado");
        if view.status.is_terminal() {
            return view;
        }
        assert!(Instant::now() < deadline, "el run no alcanzó estado terminal a tiempo");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Validación del pipeline feliz: dos pasos encadenados por contexto.
async fn run_pipeline_validation() {
    let (_base, tasks, logs) = scratch("pipeline");
    write_script(&tasks.join("emit_uuid.sh"),
                 "id=$(cat /proc/sys/kernel/random/uuid 2>/dev/null || echo \"id-$$\")\n\
                  echo \"__CONTEXT__{\\\"id\\\":\\\"$id\\\"}\"\n");
    write_script(&tasks.join("consume_uuid.sh"),
                 "[ -n \"$id\" ] || exit 1\n\
                  echo '__CONTEXT__{\"id_seen\":true}'\n");

    let engine = memory_engine(&tasks, &logs, Duration::from_secs(30), Duration::from_secs(1));
    engine.task_repository()
          .register(Task::new("uuid-chain",
                              vec!["emit_uuid.sh".to_string(), "consume_uuid.sh".to_string()])
                        .expect("task uuid-chain"));

    let run_id = engine.submit_run("uuid-chain", ContextMap::new()).await.expect("submit");
    let view = wait_terminal(&engine, run_id).await;
    assert_eq!(view.status, RunStatus::Success, "el pipeline debe terminar en success");
    let context = view.final_context.expect("contexto final presente");
    let id = context.get("id").and_then(|v| v.as_str()).expect("id en el contexto");
    assert!(!id.is_empty(), "el id emitido no puede ser vacío");
    assert_eq!(context.get("id_seen"), Some(&json!(true)),
               "el segundo paso debe haber visto el id por entorno");

    let run_dir = logs.join(format!("run_{run_id}"));
    assert!(run_dir.join("emit_uuid.sh.context.json").exists(), "snapshot del paso 1");
    assert!(run_dir.join("consume_uuid.sh.context.json").exists(), "snapshot del paso 2");
    println!("!Validación PIPELINE: OK (contexto propagado entre pasos, id={id})");
}

/// Validación de corte al primer fallo: el paso 2 no debe ejecutar.
async fn run_failure_validation() {
    let (base, tasks, logs) = scratch("fallo");
    write_script(&tasks.join("boom.sh"),
                 "echo \"algo salió mal\" 1>&2\nexit 1\n");
    write_script(&tasks.join("after.sh"), "touch \"$flag_dir/after-ran\"\n");

    let engine = memory_engine(&tasks, &logs, Duration::from_secs(30), Duration::from_secs(1));
    engine.task_repository()
          .register(Task::new("boom-chain", vec!["boom.sh".to_string(), "after.sh".to_string()])
                        .expect("task boom-chain"));

    let mut initial = ContextMap::new();
    initial.insert("flag_dir".to_string(), json!(base.display().to_string()));
    let run_id = engine.submit_run("boom-chain", initial.clone()).await.expect("submit");
    let view = wait_terminal(&engine, run_id).await;
    assert_eq!(view.status, RunStatus::Failed, "un exit 1 debe marcar el run como failed");
    assert!(!base.join("after-ran").exists(), "los pasos posteriores al fallo no deben correr");
    assert_eq!(view.final_context.as_ref(), Some(&initial),
               "sin updates el contexto final es el inicial");
    println!("!Validación FALLO: OK (corte al primer fallo y contexto intacto)");
}

/// Validación del deadline duro por paso.
async fn run_timeout_validation() {
    let (_base, tasks, logs) = scratch("timeout");
    write_script(&tasks.join("slow.sh"), "exec sleep 30\n");

    let engine = memory_engine(&tasks, &logs, Duration::from_secs(1), Duration::from_secs(1));
    engine.task_repository()
          .register(Task::new("slowpoke", vec!["slow.sh".to_string()]).expect("task slowpoke"));

    let started = Instant::now();
    let run_id = engine.submit_run("slowpoke", ContextMap::new()).await.expect("submit");
    let view = wait_terminal(&engine, run_id).await;
    assert_eq!(view.status, RunStatus::Timeout, "el paso lento debe terminar en timeout");
    assert!(started.elapsed() < Duration::from_secs(10),
            "el kill no puede esperar el sleep completo");
    println!("!Validación TIMEOUT: OK (deadline aplicado en {:?})", started.elapsed());
}

/// Validación de exclusión mutua por task.
async fn run_lock_validation() {
    let (_base, tasks, logs) = scratch("lock");
    write_script(&tasks.join("busy.sh"), "sleep 1\n");

    let engine = memory_engine(&tasks, &logs, Duration::from_secs(30), Duration::from_millis(200));
    engine.task_repository()
          .register(Task::new("exclusive", vec!["busy.sh".to_string()]).expect("task exclusive"));

    let first = engine.submit_run("exclusive", ContextMap::new()).await.expect("primer submit");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = engine.submit_run("exclusive", ContextMap::new()).await;
    assert!(matches!(second, Err(EngineError::TaskBusy(_))),
            "el segundo submit debe rechazarse con task busy");

    let view = wait_terminal(&engine, first).await;
    assert_eq!(view.status, RunStatus::Success);
    assert_eq!(engine.active_locks(), 0, "el lock debe liberarse al terminar");
    assert_eq!(engine.active_runs(), 0, "el registro no debe retener runs terminados");

    // consultas sobre runs inexistentes
    let missing = engine.run_status(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(EngineError::RunNotFound(_))));
    println!("!Validación LOCK: OK (exclusión por task y limpieza de registro)");
}

fn main() {
    // Cargar variables de entorno desde .env si existe
    let _ = dotenvy::dotenv();
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    runtime.block_on(async {
        println!("--- Iniciando validación PIPELINE ---");
        run_pipeline_validation().await;
        println!("--- Iniciando validación FALLO ---");
        run_failure_validation().await;
        println!("--- Iniciando validación TIMEOUT ---");
        run_timeout_validation().await;
        println!("--- Iniciando validación LOCK ---");
        run_lock_validation().await;
    });
    println!("!Validación global: OK (pipeline, fallo, timeout y lock)");
}
