//! Políticas de detección de fallo sobre el resultado de un paso.
//!
//! Se evalúan en orden tras cada paso no-timeout; la primera que devuelve
//! una razón marca el run como `failed`.

use crate::executor::StepOutcome;

/// Decide si un resultado de paso constituye un fallo del run.
pub trait FailureDetector: Send + Sync {
    /// Nombre corto para los logs.
    fn name(&self) -> &str;

    /// `Some(razón)` si el resultado debe fallar el run.
    fn is_failure(&self, outcome: &StepOutcome) -> Option<String>;
}

/// Falla cuando el código de salida no es cero o el hijo murió por señal.
pub struct ExitCodeFailureDetector;

impl FailureDetector for ExitCodeFailureDetector {
    fn name(&self) -> &str { "exit_code" }

    fn is_failure(&self, outcome: &StepOutcome) -> Option<String> {
        match outcome.exit_code {
            Some(0) => None,
            Some(code) => Some(format!("exit code {code}")),
            None => Some("terminated by signal".to_string()),
        }
    }
}

/// Heurística heredada: la salida capturada contiene una subcadena
/// centinela (por defecto `ERROR`, sensible a mayúsculas). Las líneas de
/// log estructuradas no pasan por aquí: un paso que loguea a nivel ERROR
/// por el socket no falla el run por sí solo.
pub struct OutputHeuristicFailureDetector {
    needle: String,
}

impl OutputHeuristicFailureDetector {
    pub fn new() -> OutputHeuristicFailureDetector {
        OutputHeuristicFailureDetector { needle: "ERROR".to_string() }
    }

    pub fn with_needle(needle: &str) -> OutputHeuristicFailureDetector {
        OutputHeuristicFailureDetector { needle: needle.to_string() }
    }
}

impl Default for OutputHeuristicFailureDetector {
    fn default() -> Self { OutputHeuristicFailureDetector::new() }
}

impl FailureDetector for OutputHeuristicFailureDetector {
    fn name(&self) -> &str { "output_heuristic" }

    fn is_failure(&self, outcome: &StepOutcome) -> Option<String> {
        if outcome.captured().contains(&self.needle) {
            Some(format!("output contains '{}'", self.needle))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(exit_code: Option<i32>, stdout: &str, stderr: &str) -> StepOutcome {
        StepOutcome { exit_code,
                      timed_out: false,
                      captured_stdout: stdout.to_string(),
                      captured_stderr: stderr.to_string(),
                      duration: Duration::from_millis(1) }
    }

    #[test]
    fn exit_code_detector_flags_nonzero_and_signals() {
        let detector = ExitCodeFailureDetector;
        assert!(detector.is_failure(&outcome(Some(0), "", "")).is_none());
        assert_eq!(detector.is_failure(&outcome(Some(3), "", "")).as_deref(),
                   Some("exit code 3"));
        assert_eq!(detector.is_failure(&outcome(None, "", "")).as_deref(),
                   Some("terminated by signal"));
    }

    #[test]
    fn heuristic_matches_needle_in_either_stream() {
        let detector = OutputHeuristicFailureDetector::new();
        assert!(detector.is_failure(&outcome(Some(0), "all good", "")).is_none());
        assert!(detector.is_failure(&outcome(Some(0), "an ERROR happened", "")).is_some());
        assert!(detector.is_failure(&outcome(Some(0), "", "ERROR: broken pipe")).is_some());
    }

    #[test]
    fn heuristic_is_case_sensitive() {
        let detector = OutputHeuristicFailureDetector::new();
        assert!(detector.is_failure(&outcome(Some(0), "a soft error occurred", "")).is_none(),
                "lowercase must not match the sentinel");
    }

    #[test]
    fn heuristic_accepts_a_custom_needle() {
        let detector = OutputHeuristicFailureDetector::with_needle("PANIC");
        assert!(detector.is_failure(&outcome(Some(0), "PANIC at the disco", "")).is_some());
        assert!(detector.is_failure(&outcome(Some(0), "ERROR ignored", "")).is_none());
    }
}
