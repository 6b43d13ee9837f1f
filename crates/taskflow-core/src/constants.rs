//! Constantes del runner.
//!
//! Este módulo agrupa los valores estáticos de la mecánica de ejecución:
//! capacidades de canal, intervalos de sondeo y topes de captura. Son
//! límites operativos, no configuración de usuario (esa vive en
//! `config::RunnerConfig`).

/// Capacidad del canal de líneas hacia el consumidor de cada sink de log.
pub const SINK_CHANNEL_CAPACITY: usize = 256;

/// Intervalo de sondeo del consumidor del sink mientras espera líneas.
pub const SINK_POLL_MS: u64 = 500;

/// Intervalo de sondeo al intentar adquirir el lock de una task ocupada.
pub const LOCK_POLL_MS: u64 = 100;

/// Tope de captura por stream (stdout / stderr) de un paso. Más allá del
/// tope el stream se sigue drenando pero se descarta.
pub const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

/// Plazo para drenar los lectores de salida y cosechar al hijo tras un
/// kill; pasado el plazo los lectores se abortan.
pub const IO_DRAIN_TIMEOUT_SECS: u64 = 5;
