//! Motor de orquestación de runs.
//!
//! Acepta submits, ejecuta cada pipeline en una tarea propia y responde
//! consultas de estado combinando registro vivo y run store.

pub mod core;

pub use core::TaskEngine;
