//! Ejecutor de pasos: procesos hijos con captura acotada, timeout duro y
//! contexto inyectado por entorno.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use taskflow_domain::{merge_context, LogLevel, LogLine, StepRef, CONTEXT_MARKER};
use taskflow_ipc::{IpcServer, ENV_SOCKET};

use crate::constants::{IO_DRAIN_TIMEOUT_SECS, MAX_CAPTURED_BYTES};
use crate::context::{parse_marker_updates, ContextStore};
use crate::errors::EngineError;
use crate::sink::LogSink;

/// Resultado observable de un paso terminado.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Código de salida; `None` si el hijo murió por señal o timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub captured_stdout: String,
    pub captured_stderr: String,
    pub duration: Duration,
}

impl StepOutcome {
    /// Salida combinada (stdout + stderr) para las políticas de fallo.
    pub fn captured(&self) -> String {
        let mut out = String::with_capacity(self.captured_stdout.len() + self.captured_stderr.len() + 1);
        out.push_str(&self.captured_stdout);
        if !self.captured_stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.captured_stderr);
        }
        out
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Ejecutor de scripts de paso.
pub struct StepExecutor {
    tasks_dir: PathBuf,
    max_captured_bytes: usize,
}

impl StepExecutor {
    pub fn new(tasks_dir: &Path) -> StepExecutor {
        StepExecutor { tasks_dir: tasks_dir.to_path_buf(),
                       max_captured_bytes: MAX_CAPTURED_BYTES }
    }

    /// Ejecuta el paso como proceso hijo y devuelve su resultado.
    ///
    /// El hijo hereda el entorno del runner con el contexto aplanado por
    /// encima y `TASKFLOW_IPC_SOCKET` apuntando al socket del run. Durante
    /// la ejecución las peticiones `log` del socket se enrutan al sink del
    /// paso; si el paso no emitió ninguna línea estructurada, la salida
    /// capturada se vuelca al sink como fallback (stdout como INFO, stderr
    /// como ERROR). Con líneas estructuradas presentes, la salida capturada
    /// se suprime del resultado para no duplicar ni disparar heurísticas
    /// sobre texto ya logueado.
    pub async fn execute(&self,
                         step: &StepRef,
                         store: &ContextStore,
                         sink: Option<&LogSink>,
                         ipc: &IpcServer,
                         limit: Duration) -> Result<StepOutcome, EngineError> {
        if let Some(sink) = sink {
            ipc.route_logs(step.script(), sink.sender()).await;
        }
        let result = self.run_child(step, store, ipc, limit).await;
        let delivered = ipc.unroute_logs().await;

        let mut outcome = result?;
        if delivered == 0 {
            if let Some(sink) = sink {
                echo_captured(sink, step.script(), &outcome.captured_stdout, &outcome.captured_stderr).await;
            }
        } else {
            debug!("step capture:suppressed script={} structured={delivered} stdout_bytes={} stderr_bytes={}",
                   step.script(), outcome.captured_stdout.len(), outcome.captured_stderr.len());
            outcome.captured_stdout.clear();
            outcome.captured_stderr.clear();
        }
        Ok(outcome)
    }

    async fn run_child(&self,
                       step: &StepRef,
                       store: &ContextStore,
                       ipc: &IpcServer,
                       limit: Duration) -> Result<StepOutcome, EngineError> {
        let script_path = self.tasks_dir.join(step.script());
        let mut command = resolve_command(&script_path);
        command.stdin(Stdio::null())
               .stdout(Stdio::piped())
               .stderr(Stdio::piped())
               .kill_on_drop(true);
        for (key, value) in store.to_env().await {
            command.env(key, value);
        }
        command.env(ENV_SOCKET, ipc.socket_path());

        let started = Instant::now();
        let mut child = command.spawn()?;
        debug!("step spawn:ok script={} pid={:?}", step.script(), child.id());

        let stdout_task = capture_stream(child.stdout.take(), self.max_captured_bytes);
        let stderr_task = capture_stream(child.stderr.take(), self.max_captured_bytes);

        let (timed_out, exit_code) = match timeout(limit, child.wait()).await {
            Ok(status) => (false, status?.code()),
            Err(_) => {
                warn!("step timeout:killing script={} limit_ms={}", step.script(), limit.as_millis());
                kill_and_reap(&mut child).await;
                (true, None)
            }
        };

        let (captured_stdout, captured_stderr) = tokio::join!(join_capture(stdout_task),
                                                              join_capture(stderr_task));
        let duration = started.elapsed();

        // El marcador heredado se busca siempre sobre la salida cruda.
        let mut updates = parse_marker_updates(&captured_stdout);
        let stderr_updates = parse_marker_updates(&captured_stderr);
        if !stderr_updates.is_empty() {
            updates = merge_context(&updates, &stderr_updates);
        }
        if !updates.is_empty() {
            debug!("step marker:updates script={} keys={}", step.script(), updates.len());
            store.apply_update(&updates).await;
        }

        Ok(StepOutcome { exit_code,
                         timed_out,
                         captured_stdout,
                         captured_stderr,
                         duration })
    }
}

/// Resuelve el comando según la extensión: `.py` via python3, `.sh` via
/// sh, el resto se invoca directamente.
fn resolve_command(script_path: &Path) -> Command {
    let ext = script_path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "py" => {
            let mut cmd = Command::new("python3");
            cmd.arg(script_path);
            cmd
        }
        "sh" => {
            let mut cmd = Command::new("sh");
            cmd.arg(script_path);
            cmd
        }
        _ => Command::new(script_path),
    }
}

/// Lee un stream del hijo acumulando hasta `cap` bytes; el resto se drena
/// y descarta para no bloquear al hijo en un pipe lleno.
fn capture_stream<R>(stream: Option<R>, cap: usize) -> JoinHandle<(String, bool)>
    where R: AsyncRead + Unpin + Send + 'static
{
    tokio::spawn(async move {
        let mut stream = match stream {
            Some(stream) => stream,
            None => return (String::new(), false),
        };
        let mut captured: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if captured.len() < cap {
                        let take = n.min(cap - captured.len());
                        captured.extend_from_slice(&chunk[..take]);
                        if take < n {
                            truncated = true;
                        }
                    } else {
                        truncated = true;
                    }
                }
                Err(_) => break,
            }
        }
        (String::from_utf8_lossy(&captured).into_owned(), truncated)
    })
}

async fn join_capture(mut handle: JoinHandle<(String, bool)>) -> String {
    match timeout(Duration::from_secs(IO_DRAIN_TIMEOUT_SECS), &mut handle).await {
        Ok(Ok((mut captured, truncated))) => {
            if truncated {
                captured.push_str("\n...[output truncated]");
            }
            captured
        }
        Ok(Err(e)) => {
            warn!("step capture:join error err={e}");
            String::new()
        }
        Err(_) => {
            handle.abort();
            warn!("step capture:drain timeout secs={IO_DRAIN_TIMEOUT_SECS}");
            String::new()
        }
    }
}

/// Mata al hijo y espera su salida para no dejar zombies.
async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("step kill:error err={e}");
    }
    match timeout(Duration::from_secs(IO_DRAIN_TIMEOUT_SECS), child.wait()).await {
        Ok(Ok(status)) => debug!("step kill:reaped status={status}"),
        Ok(Err(e)) => warn!("step kill:wait error err={e}"),
        Err(_) => warn!("step kill:reap timeout secs={IO_DRAIN_TIMEOUT_SECS}"),
    }
}

/// Fallback de log: stdout del hijo como INFO y stderr como ERROR. Las
/// líneas de marcador son protocolo, no contenido, y se omiten.
async fn echo_captured(sink: &LogSink, script: &str, stdout: &str, stderr: &str) {
    let tx = sink.sender();
    for line in stdout.lines() {
        if line.is_empty() || line.trim_start().starts_with(CONTEXT_MARKER) {
            continue;
        }
        let _ = tx.send(LogLine::new(LogLevel::Info, line, script)).await;
    }
    for line in stderr.lines() {
        if line.is_empty() {
            continue;
        }
        let _ = tx.send(LogLine::new(LogLevel::Error, line, script)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stdout: &str, stderr: &str) -> StepOutcome {
        StepOutcome { exit_code: Some(0),
                      timed_out: false,
                      captured_stdout: stdout.to_string(),
                      captured_stderr: stderr.to_string(),
                      duration: Duration::from_millis(1) }
    }

    #[test]
    fn captured_joins_both_streams_with_newline() {
        assert_eq!(outcome("out", "err").captured(), "out\nerr");
        assert_eq!(outcome("out\n", "err").captured(), "out\nerr");
        assert_eq!(outcome("", "only err").captured(), "only err");
        assert_eq!(outcome("only out", "").captured(), "only out");
    }

    #[test]
    fn success_requires_zero_exit_and_no_timeout() {
        assert!(outcome("", "").success());
        let mut failed = outcome("", "");
        failed.exit_code = Some(1);
        assert!(!failed.success());
        let mut signalled = outcome("", "");
        signalled.exit_code = None;
        assert!(!signalled.success());
        let mut late = outcome("", "");
        late.timed_out = true;
        assert!(!late.success());
    }
}
