//! Store de contexto del run: un objeto JSON compartido y thread-safe.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::sync::RwLock;

use taskflow_domain::{env_string, merge_context, ContextMap};
use taskflow_ipc::ContextBridge;

/// Handle clonable al contexto del run. Todos los clones comparten el
/// mismo mapa; lectores y escritores nunca observan un estado a medias.
#[derive(Clone)]
pub struct ContextStore {
    inner: Arc<RwLock<ContextMap>>,
}

impl ContextStore {
    /// Siembra el store con el contexto inicial del run.
    pub fn new(initial: ContextMap) -> ContextStore {
        ContextStore { inner: Arc::new(RwLock::new(initial)) }
    }

    /// Copia profunda del contexto actual.
    pub async fn snapshot(&self) -> ContextMap {
        self.inner.read().await.clone()
    }

    /// Mezcla superficial de `entries`: sobreescribe claves existentes y
    /// añade las nuevas. Un mapa vacío es un no-op.
    pub async fn apply_update(&self, entries: &ContextMap) {
        if entries.is_empty() {
            return;
        }
        let mut guard = self.inner.write().await;
        *guard = merge_context(&guard, entries);
    }

    /// Acepta un `Value` arbitrario; los payloads no-objeto se descartan
    /// en silencio.
    pub async fn apply_json(&self, value: Value) {
        match value {
            Value::Object(entries) => self.apply_update(&entries).await,
            other => debug!("context update:dropped non-object value={other}"),
        }
    }

    /// Aplana el contexto a pares de variables de entorno: claves tal
    /// cual, strings crudos y el resto como JSON compacto.
    pub async fn to_env(&self) -> Vec<(String, String)> {
        let guard = self.inner.read().await;
        guard.iter()
             .map(|(k, v)| (k.clone(), env_string(v)))
             .collect()
    }
}

#[async_trait]
impl ContextBridge for ContextStore {
    async fn apply_update(&self, entries: ContextMap) {
        ContextStore::apply_update(self, &entries).await;
    }

    async fn snapshot(&self) -> ContextMap {
        ContextStore::snapshot(self).await
    }
}
