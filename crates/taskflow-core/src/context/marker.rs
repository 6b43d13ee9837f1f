//! Marcador heredado `__CONTEXT__` en la salida capturada de un paso.
//!
//! Es la vía de compatibilidad para scripts que no hablan el socket: una
//! línea `__CONTEXT__{...}` por stdout equivale a un `update`.

use log::debug;
use serde_json::Value;

use taskflow_domain::{merge_context, ContextMap, CONTEXT_MARKER};

/// Extrae y mezcla, en orden de aparición, los updates anunciados con el
/// marcador. Las líneas con JSON inválido o payload no-objeto se ignoran.
pub fn parse_marker_updates(captured: &str) -> ContextMap {
    let mut merged = ContextMap::new();
    for line in captured.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(CONTEXT_MARKER) {
            match serde_json::from_str::<Value>(rest) {
                Ok(Value::Object(entries)) => merged = merge_context(&merged, &entries),
                Ok(other) => debug!("marker:non-object payload={other}"),
                Err(e) => debug!("marker:unparseable err={e}"),
            }
        }
    }
    merged
}
