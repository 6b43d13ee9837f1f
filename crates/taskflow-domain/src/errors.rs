//! Errores del dominio de orquestación (simples por ahora).

use thiserror::Error;

use crate::run::RunStatus;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DomainError {
    #[error("validation: {0}")] Validation(String),
    #[error("invalid status transition: {0} -> {1}")] InvalidTransition(RunStatus, RunStatus),
    #[error("run already terminal")] RunAlreadyTerminal,
}
