//! Prueba sin harness: este binario corre dos veces. Lanzado por cargo
//! actúa como driver; relanzado por el motor como paso (se detecta por la
//! variable del socket) actúa como cliente SDK dentro del pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

use taskflow_rust::{ContextMap, InMemoryRunStore, InMemoryTaskRepository, RunStatus,
                    RunStatusView, RunnerConfig, Task, TaskClient, TaskEngine, ENV_SOCKET};

type MemoryEngine = TaskEngine<InMemoryTaskRepository, InMemoryRunStore>;

fn main() {
    if std::env::var(ENV_SOCKET).is_ok() {
        child_step();
        return;
    }
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    runtime.block_on(sdk_round_trip());
    println!("sdk_pipeline: ok");
}

/// Lado paso: habla el protocolo estructurado de punta a punta.
fn child_step() {
    let client = TaskClient::from_env();
    assert!(client.is_connected(), "the step must reach the run socket");

    client.info("sdk step alive");
    let context = client.context();
    let token = context.get("token")
                       .and_then(|v| v.as_str())
                       .expect("token must arrive through the snapshot")
                       .to_string();

    let mut update = ContextMap::new();
    update.insert("echoed".to_string(), json!(token));
    assert!(client.update(update), "structured update must be accepted");

    // texto plano: con logs estructurados presentes no debe persistirse
    println!("plain noise that must stay out of the log");
}

fn scratch() -> (PathBuf, PathBuf, PathBuf) {
    let base = std::env::temp_dir().join(format!("taskflow-sdkpipe-{}", std::process::id()));
    let _ = fs::remove_dir_all(&base);
    let tasks = base.join("tasks");
    let logs = base.join("logs");
    fs::create_dir_all(&tasks).expect("create tasks dir");
    fs::create_dir_all(&logs).expect("create logs dir");
    (base, tasks, logs)
}

async fn wait_terminal(engine: &MemoryEngine, run_id: Uuid) -> RunStatusView {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let view = engine.run_status(run_id).await.expect("run status");
        if view.status.is_terminal() {
            return view;
        }
        assert!(Instant::now() < deadline, "run did not reach a terminal status in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn memory_engine(tasks: &Path, logs: &Path) -> MemoryEngine {
    let config = RunnerConfig { tasks_dir: tasks.to_path_buf(),
                                logs_dir: logs.to_path_buf(),
                                step_timeout: Duration::from_secs(30),
                                lock_timeout: Duration::from_secs(1) };
    TaskEngine::new(config, InMemoryTaskRepository::new(), InMemoryRunStore::new())
}

/// Lado driver: el paso SDK propaga contexto que un script shell verifica.
async fn sdk_round_trip() {
    let (_base, tasks, logs) = scratch();
    let exe = std::env::current_exe().expect("current exe");
    std::os::unix::fs::symlink(&exe, tasks.join("sdk_step")).expect("symlink sdk step");
    fs::write(tasks.join("check.sh"),
              "[ \"$echoed\" = \"forty-two\" ] || exit 1\n")
        .expect("check.sh");

    let engine = memory_engine(&tasks, &logs);
    engine.task_repository()
          .register(Task::new("sdk-chain", vec!["sdk_step".to_string(), "check.sh".to_string()])
                        .expect("task"));

    let mut initial = ContextMap::new();
    initial.insert("token".to_string(), json!("forty-two"));
    let run_id = engine.submit_run("sdk-chain", initial).await.expect("submit");

    let view = wait_terminal(&engine, run_id).await;
    assert_eq!(view.status, RunStatus::Success, "both steps must pass");
    let context = view.final_context.expect("final context");
    assert_eq!(context.get("token"), Some(&json!("forty-two")));
    assert_eq!(context.get("echoed"), Some(&json!("forty-two")),
               "the sdk update must land in the run context");

    let log = fs::read_to_string(logs.join(format!("run_{run_id}")).join("sdk_step.log"))
        .expect("read sdk step log");
    assert!(log.contains("[INFO] sdk step alive"), "structured line missing: {log:?}");
    assert!(!log.contains("plain noise"),
            "captured stdout must be dropped when structured logs are present");
}
