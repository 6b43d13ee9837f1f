use std::time::Duration;

use taskflow_core::{InMemoryRunStore, InMemoryTaskRepository, RunnerConfig, TaskEngine};
use taskflow_domain::{ContextMap, RunStatus, Task};

fn main() {
    // Cargar .env si existe para TASKS_DIR / LOGS_DIR
    let _ = dotenvy::dotenv();
    // CLI mínima: `taskflow run --script <file> [--script <file> ...] [--name <task>] [--ctx '<JSON>'] [--timeout-secs <N>]`
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "run" {
        let mut scripts: Vec<String> = Vec::new();
        let mut name: Option<String> = None;
        let mut ctx: Option<String> = None;
        let mut timeout_secs: Option<u64> = None;
        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--script" => { i += 1; if i < args.len() { scripts.push(args[i].clone()); } }
                "--name" => { i += 1; if i < args.len() { name = Some(args[i].clone()); } }
                "--ctx" => { i += 1; if i < args.len() { ctx = Some(args[i].clone()); } }
                "--timeout-secs" => { i += 1; if i < args.len() { timeout_secs = args[i].parse::<u64>().ok(); } }
                _ => {}
            }
            i += 1;
        }

        if scripts.is_empty() {
            eprintln!("Uso: taskflow run --script <file> [--script <file> ...] [--name <task>] [--ctx '<JSON>'] [--timeout-secs <N>]");
            std::process::exit(2);
        }
        let initial: ContextMap = match ctx {
            Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => { eprintln!("[taskflow run] --ctx debe ser un objeto JSON"); std::process::exit(2); }
                Err(e) => { eprintln!("[taskflow run] --ctx JSON parse error: {e}"); std::process::exit(2); }
            },
            None => ContextMap::new(),
        };
        let task = match Task::new(name.as_deref().unwrap_or("adhoc"), scripts) {
            Ok(t) => t,
            Err(e) => { eprintln!("[taskflow run] task inválida: {e}"); std::process::exit(2); }
        };

        let mut config = RunnerConfig::from_env();
        if let Some(secs) = timeout_secs { config.step_timeout = Duration::from_secs(secs); }
        if let Err(e) = config.ensure_directories() {
            eprintln!("[taskflow run] directorios de trabajo: {e}");
            std::process::exit(5);
        }

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => { eprintln!("[taskflow run] runtime error: {e}"); std::process::exit(5); }
        };
        let code = runtime.block_on(run_pipeline(config, task, initial));
        std::process::exit(code);
    } else {
        println!("taskflow: use el subcomando 'run'");
    }
}

async fn run_pipeline(config: RunnerConfig, task: Task, initial: ContextMap) -> i32 {
    let logs_dir = config.logs_dir.clone();
    let repo = InMemoryTaskRepository::new();
    let task_id = task.id().to_string();
    repo.register(task);
    let engine = TaskEngine::new(config, repo, InMemoryRunStore::new());

    let run_id = match engine.submit_run(&task_id, initial).await {
        Ok(id) => id,
        Err(e) => { eprintln!("[taskflow run] submit rechazado: {e}"); return 5; }
    };
    println!("run aceptado: {run_id} task={task_id}");
    println!("logs: {}", logs_dir.join(format!("run_{run_id}")).display());

    let mut last_script: Option<String> = None;
    loop {
        let view = match engine.run_status(run_id).await {
            Ok(view) => view,
            Err(e) => { eprintln!("[taskflow run] status error: {e}"); return 5; }
        };
        if view.status.is_terminal() {
            println!("estado: {}", view.status);
            if let Some(context) = view.final_context {
                match serde_json::to_string_pretty(&context) {
                    Ok(rendered) => println!("contexto final:\n{rendered}"),
                    Err(e) => eprintln!("[taskflow run] contexto no serializable: {e}"),
                }
            }
            return match view.status {
                RunStatus::Success => 0,
                RunStatus::Failed => 3,
                RunStatus::Timeout => 4,
                _ => 5,
            };
        }
        if view.current_script != last_script {
            if let Some(script) = &view.current_script {
                println!("paso: {script}");
            }
            last_script = view.current_script;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
