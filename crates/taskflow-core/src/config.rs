//! Carga de configuración del runner desde variables de entorno.
//! Usa convención `TASKS_DIR` / `LOGS_DIR` y límites de tiempo opcionales.

use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Configuración efectiva del runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directorio raíz de los scripts de tasks.
    pub tasks_dir: PathBuf,
    /// Directorio raíz de los run dirs (logs y snapshots por paso).
    pub logs_dir: PathBuf,
    /// Límite duro por paso; al superarlo el hijo se mata y el run queda
    /// en `timeout`.
    pub step_timeout: Duration,
    /// Plazo máximo de espera al adquirir el lock de una task ocupada.
    pub lock_timeout: Duration,
}

impl RunnerConfig {
    /// Lee la configuración del entorno. Variables: `TASKS_DIR` (default
    /// `./tasks`), `LOGS_DIR` (default `./logs`), `TASK_TIMEOUT` en
    /// segundos (default 3600) y `LOCK_TIMEOUT` en segundos (default 5).
    /// Los valores no parseables caen al default.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let tasks_dir = env::var("TASKS_DIR").unwrap_or_else(|_| "./tasks".to_string());
        let logs_dir = env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
        let step_timeout = env::var("TASK_TIMEOUT").ok().and_then(|v| v.parse().ok()).unwrap_or(3600);
        let lock_timeout = env::var("LOCK_TIMEOUT").ok().and_then(|v| v.parse().ok()).unwrap_or(5);
        Self { tasks_dir: PathBuf::from(tasks_dir),
               logs_dir: PathBuf::from(logs_dir),
               step_timeout: Duration::from_secs(step_timeout),
               lock_timeout: Duration::from_secs(lock_timeout) }
    }

    /// Crea los directorios de trabajo si no existen (idempotente).
    pub fn ensure_directories(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.tasks_dir)?;
        std::fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }
