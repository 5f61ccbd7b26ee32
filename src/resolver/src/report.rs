//! Results that carry non-fatal warnings alongside the value.

use serde::Serialize;

/// Where a non-fatal base image lookup failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningPhase {
    /// Collecting ONBUILD triggers during dependency resolution; the result
    /// may miss files those triggers would have added.
    OnbuildDiscovery,
    /// Collecting inherited exposed ports.
    PortInheritance,
}

impl std::fmt::Display for WarningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningPhase::OnbuildDiscovery => write!(f, "onbuild discovery"),
            WarningPhase::PortInheritance => write!(f, "port inheritance"),
        }
    }
}

/// A base image whose contribution was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub reference: String,
    pub phase: WarningPhase,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for {}: {}", self.phase, self.reference, self.message)
    }
}

/// A value plus the warnings raised while producing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Report<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    /// True when no base image lookup was skipped.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Report<U> {
        Report {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning() -> Warning {
        Warning {
            reference: "base:1".to_string(),
            phase: WarningPhase::OnbuildDiscovery,
            message: "registry unreachable".to_string(),
        }
    }

    #[test]
    fn test_new_report_is_complete() {
        let report = Report::new(vec![1, 2]);
        assert!(report.is_complete());
        assert_eq!(report.into_value(), vec![1, 2]);
    }

    #[test]
    fn test_map_keeps_warnings() {
        let report = Report::with_warnings(2, vec![warning()]).map(|v| v * 10);
        assert_eq!(report.value, 20);
        assert!(!report.is_complete());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(
            warning().to_string(),
            "onbuild discovery for base:1: registry unreachable"
        );
    }

    #[test]
    fn test_warning_serialization() {
        let json = serde_json::to_value(warning()).unwrap();
        assert_eq!(json["phase"], "onbuild_discovery");
        assert_eq!(json["reference"], "base:1");
    }
}
