//! Tasks: definición nombrada de una secuencia ordenada de scripts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DomainError;

/// Referencia a un script dentro de una task: nombre de archivo relativo
/// al directorio de scripts y posición 0-based en la secuencia.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    script: String,
    position: usize,
}

impl StepRef {
    pub fn script(&self) -> &str { &self.script }
    pub fn position(&self) -> usize { self.position }
}

/// Task: lista ordenada de scripts identificada por nombre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: String,
    steps: Vec<StepRef>,
}

impl Task {
    /// Valida y construye una task. El nombre no puede ser vacío, debe haber
    /// al menos un paso y los scripts deben ser rutas relativas sin `..`.
    pub fn new(id: &str, scripts: Vec<String>) -> Result<Self, DomainError> {
        if id.trim().is_empty() {
            return Err(DomainError::Validation("task id must not be empty".to_string()));
        }
        if scripts.is_empty() {
            return Err(DomainError::Validation("task must have at least one step".to_string()));
        }
        let mut steps = Vec::with_capacity(scripts.len());
        for (position, script) in scripts.into_iter().enumerate() {
            if script.trim().is_empty() {
                return Err(DomainError::Validation("script name must not be empty".to_string()));
            }
            if script.contains("..") || script.starts_with('/') {
                return Err(DomainError::Validation(format!("script must be a relative path: {script}")));
            }
            steps.push(StepRef { script, position });
        }
        Ok(Task { id: id.to_string(), steps })
    }

    /// Huella SHA-256 (hex) de la definición: id + scripts en orden. Permite
    /// a los stores detectar derivas de definición entre submit y ejecución.
    pub fn definition_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        for step in &self.steps {
            hasher.update(b"\0");
            hasher.update(step.script.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn steps(&self) -> &[StepRef] { &self.steps }
    pub fn len(&self) -> usize { self.steps.len() }
    pub fn is_empty(&self) -> bool { self.steps.is_empty() }
}
