//! Contexto de ejecución: el objeto JSON compartido que fluye entre pasos.

use serde_json::Value;

/// Mapa de contexto a nivel de run (claves string, valores JSON).
pub type ContextMap = serde_json::Map<String, Value>;

/// Prefijo con el que un paso sin socket anuncia updates de contexto
/// imprimiendo una línea `__CONTEXT__{...json...}` por stdout.
pub const CONTEXT_MARKER: &str = "__CONTEXT__";

/// Mezcla superficial: las claves de `update` sobreescriben las de `base`,
/// las nuevas se añaden. Los objetos anidados se reemplazan completos, sin
/// merge profundo.
pub fn merge_context(base: &ContextMap, update: &ContextMap) -> ContextMap {
    let mut out = base.clone();
    for (k, v) in update.iter() {
        out.insert(k.clone(), v.clone());
    }
    out
}

/// Representación de un valor de contexto como variable de entorno: los
/// strings pasan tal cual (sin comillas añadidas), el resto serializa como
/// JSON compacto.
pub fn env_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
