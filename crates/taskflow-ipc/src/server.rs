//! Servidor IPC por run: un Unix socket que atiende a los procesos hijos.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use taskflow_domain::{ContextMap, LogLevel, LogLine};

use crate::errors::IpcError;
use crate::proto::{IpcReply, IpcRequest};

/// Acceso del servidor al contexto del run; lo implementa el store del
/// runner. Mantiene al servidor independiente de la representación.
#[async_trait]
pub trait ContextBridge: Send + Sync + 'static {
    async fn apply_update(&self, entries: ContextMap);
    async fn snapshot(&self) -> ContextMap;
}

/// Ventana de enrutado: destino de las peticiones `log` en este momento.
struct LogRoute {
    script: String,
    tx: mpsc::Sender<LogLine>,
    delivered: Arc<AtomicU64>,
}

/// Servidor de socket de un run. Acepta conexiones de los pasos hijos y
/// atiende `log` / `update` / `snapshot` hasta su apagado.
pub struct IpcServer {
    path: PathBuf,
    route: Arc<RwLock<Option<LogRoute>>>,
    accept_task: JoinHandle<()>,
}

impl IpcServer {
    /// Crea el socket del run bajo el directorio temporal del sistema y
    /// lanza el bucle de aceptación. Un socket huérfano de un run previo
    /// con el mismo id se elimina antes de enlazar.
    pub fn bind(run_id: Uuid, bridge: Arc<dyn ContextBridge>) -> Result<IpcServer, IpcError> {
        let path = std::env::temp_dir().join(format!("taskflow-ipc-{run_id}.sock"));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        let route: Arc<RwLock<Option<LogRoute>>> = Arc::new(RwLock::new(None));
        let accept_route = route.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, bridge.clone(), accept_route.clone()));
                    }
                    Err(e) => {
                        warn!("ipc accept:error err={e}");
                        break;
                    }
                }
            }
        });
        debug!("ipc bind:ok path={}", path.display());
        Ok(IpcServer { path, route, accept_task })
    }

    /// Ruta del socket, para inyectarla en el entorno del hijo.
    pub fn socket_path(&self) -> &Path { &self.path }

    /// Abre la ventana de enrutado: las peticiones `log` van al emisor dado
    /// hasta el próximo `unroute_logs`.
    pub async fn route_logs(&self, script: &str, tx: mpsc::Sender<LogLine>) {
        let mut guard = self.route.write().await;
        *guard = Some(LogRoute { script: script.to_string(),
                                 tx,
                                 delivered: Arc::new(AtomicU64::new(0)) });
    }

    /// Cierra la ventana de enrutado y devuelve cuántas líneas se
    /// entregaron durante ella.
    pub async fn unroute_logs(&self) -> u64 {
        let mut guard = self.route.write().await;
        match guard.take() {
            Some(route) => route.delivered.load(Ordering::Relaxed),
            None => 0,
        }
    }

    /// Detiene el bucle de aceptación y borra el archivo de socket.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(stream: UnixStream,
                           bridge: Arc<dyn ContextBridge>,
                           route: Arc<RwLock<Option<LogRoute>>>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("ipc conn:read error err={e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        // Una línea malformada responde ok=false y la conexión sigue viva.
        let reply = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(req) => dispatch(req, &bridge, &route).await,
            Err(e) => IpcReply::err(format!("bad request: {e}")),
        };
        let mut payload = match serde_json::to_vec(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("ipc conn:encode error err={e}");
                break;
            }
        };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
}

async fn dispatch(req: IpcRequest,
                  bridge: &Arc<dyn ContextBridge>,
                  route: &Arc<RwLock<Option<LogRoute>>>) -> IpcReply {
    match req {
        IpcRequest::Log { level, message } => {
            // El emisor se clona fuera del lock: el send puede bloquear.
            let target = {
                let guard = route.read().await;
                guard.as_ref()
                     .map(|r| (r.script.clone(), r.tx.clone(), r.delivered.clone()))
            };
            match target {
                Some((script, tx, delivered)) => {
                    let line = LogLine::new(LogLevel::parse(&level), message, script);
                    if tx.send(line).await.is_ok() {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => debug!("ipc log:dropped (no active step)"),
            }
            IpcReply::ok()
        }
        IpcRequest::Update { entries } => {
            bridge.apply_update(entries).await;
            IpcReply::ok()
        }
        IpcRequest::Snapshot => IpcReply::with_context(bridge.snapshot().await),
    }
}
