//! Protocolo de cable: JSON delimitado por saltos de línea, una respuesta
//! por petición.

use serde::{Deserialize, Serialize};

use taskflow_domain::ContextMap;

/// Variable de entorno con la ruta del socket del run, inyectada a cada
/// proceso hijo por el ejecutor.
pub const ENV_SOCKET: &str = "TASKFLOW_IPC_SOCKET";

/// Petición de un paso al runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Línea de log estructurada para el archivo del paso en curso.
    Log { level: String, message: String },
    /// Mezcla superficial de `entries` en el contexto del run.
    Update { entries: ContextMap },
    /// Copia del contexto actual.
    Snapshot,
}

/// Respuesta del runner; `context` solo viaja en la respuesta a `snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcReply {
    pub fn ok() -> IpcReply {
        IpcReply { ok: true, context: None, error: None }
    }

    pub fn with_context(context: ContextMap) -> IpcReply {
        IpcReply { ok: true, context: Some(context), error: None }
    }

    pub fn err(message: impl Into<String>) -> IpcReply {
        IpcReply { ok: false, context: None, error: Some(message.into()) }
    }
}
