//! Líneas de log estructuradas producidas por los pasos.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nivel de severidad de una línea de log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Interpreta un nivel textual; los valores desconocidos degradan a
    /// `Info` en vez de fallar.
    pub fn parse(raw: &str) -> LogLevel {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Línea de log con script de origen y marca de tiempo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub script: String,
    pub at: DateTime<Utc>,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>, script: impl Into<String>) -> Self {
        LogLine { level,
                  message: message.into(),
                  script: script.into(),
                  at: Utc::now() }
    }

    /// Forma persistida en el archivo de log del paso.
    pub fn format_line(&self) -> String {
        format!("[{}] {}\n", self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_levels() {
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("info"), LogLevel::Info);
        assert_eq!(LogLevel::parse(" WARNING "), LogLevel::Warning);
        assert_eq!(LogLevel::parse("warn"), LogLevel::Warning);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
    }

    #[test]
    fn parse_unknown_degrades_to_info() {
        assert_eq!(LogLevel::parse("CRITICAL"), LogLevel::Info);
        assert_eq!(LogLevel::parse(""), LogLevel::Info);
    }

    #[test]
    fn format_line_matches_persisted_shape() {
        let line = LogLine::new(LogLevel::Error, "boom", "a.sh");
        assert_eq!(line.format_line(), "[ERROR] boom\n");
        let line = LogLine::new(LogLevel::Info, "hello", "a.sh");
        assert_eq!(line.format_line(), "[INFO] hello\n");
    }
}
