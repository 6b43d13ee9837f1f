//! Contexto compartido del run y marcador heredado de stdout.

pub mod marker;
pub mod store;

pub use marker::parse_marker_updates;
pub use store::ContextStore;
