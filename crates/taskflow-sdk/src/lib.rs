//! taskflow-sdk: cliente sincrónico para pasos escritos en Rust.
//!
//! Uso dentro de un paso:
//!
//! ```no_run
//! use taskflow_sdk::TaskClient;
//!
//! let client = TaskClient::from_env();
//! client.info("arrancando");
//! let ctx = client.context();
//! client.set("resultado", serde_json::json!("ok"));
//! ```
//!
//! Si el socket del runner no está disponible (paso ejecutado a mano), las
//! lecturas caen al entorno del proceso y las escrituras emiten el marcador
//! `__CONTEXT__` por stdout para que el capturador lo recoja igualmente.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use taskflow_domain::{ContextMap, CONTEXT_MARKER};
use taskflow_ipc::{IpcReply, IpcRequest, ENV_SOCKET};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("socket io: {0}")] Io(#[from] std::io::Error),
    #[error("codec: {0}")] Codec(#[from] serde_json::Error),
    #[error("runner rejected request: {0}")] Rejected(String),
}

struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

/// Cliente del runner. Conectado habla el protocolo JSON por líneas; sin
/// conexión aplica los fallbacks heredados (entorno + marcador).
pub struct TaskClient {
    conn: Option<Mutex<Connection>>,
}

impl TaskClient {
    /// Conecta usando `TASKFLOW_IPC_SOCKET`. Sin la variable, o con un
    /// socket inaccesible, devuelve un cliente en modo fallback.
    pub fn from_env() -> TaskClient {
        match std::env::var(ENV_SOCKET) {
            Ok(path) => TaskClient::connect(path),
            Err(_) => TaskClient { conn: None },
        }
    }

    /// Conecta contra una ruta de socket concreta; si falla, el cliente
    /// queda en modo fallback.
    pub fn connect(path: impl AsRef<Path>) -> TaskClient {
        let conn = UnixStream::connect(path.as_ref()).ok().and_then(|stream| {
            let reader = stream.try_clone().ok()?;
            Some(Mutex::new(Connection { reader: BufReader::new(reader), writer: stream }))
        });
        TaskClient { conn }
    }

    pub fn is_connected(&self) -> bool { self.conn.is_some() }

    /// Envía una línea de log al archivo del paso en curso; en fallback la
    /// imprime por stdout con el mismo formato `[NIVEL] mensaje`.
    pub fn log(&self, level: &str, message: &str) {
        if self.conn.is_some() {
            let req = IpcRequest::Log { level: level.to_string(), message: message.to_string() };
            if self.call(&req).is_ok() {
                return;
            }
        }
        println!("[{level}] {message}");
    }

    pub fn debug(&self, message: &str) { self.log("DEBUG", message) }
    pub fn info(&self, message: &str) { self.log("INFO", message) }
    pub fn warning(&self, message: &str) { self.log("WARNING", message) }
    pub fn error(&self, message: &str) { self.log("ERROR", message) }

    /// Copia del contexto actual. En fallback devuelve las variables de
    /// entorno con clave en minúscula (las que inyecta el runner).
    pub fn context(&self) -> ContextMap {
        if self.conn.is_some() {
            if let Ok(reply) = self.call(&IpcRequest::Snapshot) {
                if let Some(ctx) = reply.context {
                    return ctx;
                }
            }
        }
        env_context()
    }

    /// Valor de una clave del contexto, si existe.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.context().get(key).cloned()
    }

    /// Mezcla superficial de `entries` en el contexto del run. En fallback
    /// imprime el marcador heredado por stdout; devuelve `false` solo si
    /// ninguna de las dos vías funcionó.
    pub fn update(&self, entries: ContextMap) -> bool {
        if self.conn.is_some() {
            let req = IpcRequest::Update { entries: entries.clone() };
            if self.call(&req).is_ok() {
                return true;
            }
        }
        match fallback_marker_line(&entries) {
            Some(line) => {
                println!("{line}");
                true
            }
            None => false,
        }
    }

    pub fn set(&self, key: &str, value: Value) -> bool {
        let mut entries = ContextMap::new();
        entries.insert(key.to_string(), value);
        self.update(entries)
    }

    fn call(&self, req: &IpcRequest) -> Result<IpcReply, SdkError> {
        let mutex = match &self.conn {
            Some(mutex) => mutex,
            None => return Err(SdkError::Rejected("not connected".to_string())),
        };
        let mut conn = mutex.lock()
                            .map_err(|_| SdkError::Rejected("client state poisoned".to_string()))?;
        let mut payload = serde_json::to_vec(req)?;
        payload.push(b'\n');
        conn.writer.write_all(&payload)?;
        conn.writer.flush()?;
        let mut line = String::new();
        let read = conn.reader.read_line(&mut line)?;
        if read == 0 {
            return Err(SdkError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof,
                                                        "runner closed the socket")));
        }
        let reply: IpcReply = serde_json::from_str(&line)?;
        if !reply.ok {
            return Err(SdkError::Rejected(reply.error.unwrap_or_else(|| "unknown".to_string())));
        }
        Ok(reply)
    }
}

/// Contexto de fallback: entorno del proceso filtrado a claves que parecen
/// de contexto (todo en minúscula), con los valores como strings crudos.
pub fn env_context() -> ContextMap {
    let mut ctx = ContextMap::new();
    for (k, v) in std::env::vars() {
        if is_context_key(&k) {
            ctx.insert(k, Value::String(v));
        }
    }
    ctx
}

fn is_context_key(key: &str) -> bool {
    let mut has_lower = false;
    for c in key.chars() {
        if c.is_uppercase() {
            return false;
        }
        if c.is_lowercase() {
            has_lower = true;
        }
    }
    has_lower
}

/// Línea de marcador heredado para un update; `None` si no serializa.
pub fn fallback_marker_line(entries: &ContextMap) -> Option<String> {
    serde_json::to_string(entries).ok()
                                  .map(|json| format!("{CONTEXT_MARKER}{json}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_keys_are_fully_lowercase() {
        assert!(is_context_key("resultado"));
        assert!(is_context_key("paso_actual"));
        assert!(!is_context_key("PATH"));
        assert!(!is_context_key("MixedCase"));
        assert!(!is_context_key("_"));
        assert!(!is_context_key(""));
    }

    #[test]
    fn marker_line_has_the_legacy_prefix() {
        let mut entries = ContextMap::new();
        entries.insert("k".to_string(), json!("v"));
        let line = fallback_marker_line(&entries).unwrap();
        assert_eq!(line, r#"__CONTEXT__{"k":"v"}"#);
    }

    #[test]
    fn env_context_picks_only_injected_style_keys() {
        std::env::set_var("tfsdk_probe_key", "probe-value");
        std::env::set_var("TFSDK_PROBE_UPPER", "ignored");
        let ctx = env_context();
        assert_eq!(ctx.get("tfsdk_probe_key"), Some(&Value::String("probe-value".to_string())));
        assert!(!ctx.contains_key("TFSDK_PROBE_UPPER"));
        std::env::remove_var("tfsdk_probe_key");
        std::env::remove_var("TFSDK_PROBE_UPPER");
    }

    #[test]
    fn disconnected_client_reads_environment() {
        let client = TaskClient { conn: None };
        assert!(!client.is_connected());
        std::env::set_var("tfsdk_disc_key", "fallback");
        assert_eq!(client.get("tfsdk_disc_key"), Some(json!("fallback")));
        std::env::remove_var("tfsdk_disc_key");
    }
}
