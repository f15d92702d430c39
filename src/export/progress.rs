//! Progress shape shared by the still-image export modes.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Idle,
    Exporting,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub status: ExportStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for ExportProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            status: ExportStatus::Idle,
            message: String::new(),
            error: None,
        }
    }
}

impl ExportProgress {
    /// Fraction done in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64).min(1.0)
    }
}

/// Emits a consistent progress sequence for one export call.
pub(crate) struct Reporter<F: Fn(&ExportProgress)> {
    callback: F,
    total: usize,
}

impl<F: Fn(&ExportProgress)> Reporter<F> {
    pub(crate) fn start(callback: F, total: usize, message: impl Into<String>) -> Self {
        let reporter = Self { callback, total };
        reporter.emit(0, ExportStatus::Exporting, message.into(), None);
        reporter
    }

    pub(crate) fn step(&self, current: usize, message: impl Into<String>) {
        self.emit(current, ExportStatus::Exporting, message.into(), None);
    }

    /// Report the terminal state of `result` and pass it through.
    pub(crate) fn finish<T>(&self, result: crate::Result<T>, message: &str) -> crate::Result<T> {
        match &result {
            Ok(_) => self.emit(self.total, ExportStatus::Completed, message.to_string(), None),
            Err(e) => self.emit(
                0,
                ExportStatus::Error,
                "Export failed".to_string(),
                Some(e.to_string()),
            ),
        }
        result
    }

    fn emit(&self, current: usize, status: ExportStatus, message: String, error: Option<String>) {
        (self.callback)(&ExportProgress {
            current,
            total: self.total,
            status,
            message,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DxError;
    use std::cell::RefCell;

    #[test]
    fn test_reporter_sequence() {
        let seen = RefCell::new(Vec::new());
        let reporter = Reporter::start(|p: &ExportProgress| seen.borrow_mut().push(p.clone()), 2, "go");
        reporter.step(1, "one");
        let _ = reporter.finish(Ok(()), "done");

        let seen = seen.into_inner();
        let statuses: Vec<_> = seen.iter().map(|p| (p.current, p.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (0, ExportStatus::Exporting),
                (1, ExportStatus::Exporting),
                (2, ExportStatus::Completed)
            ]
        );
    }

    #[test]
    fn test_reporter_error_carries_message() {
        let seen = RefCell::new(Vec::new());
        let reporter = Reporter::start(|p: &ExportProgress| seen.borrow_mut().push(p.clone()), 1, "go");
        let result: crate::Result<()> = reporter.finish(Err(DxError::NoVisibleShapes), "done");
        assert!(result.is_err());
        let last = seen.borrow().last().cloned().unwrap();
        assert_eq!(last.status, ExportStatus::Error);
        assert!(last.error.unwrap().contains("No visible shapes"));
    }

    #[test]
    fn test_fraction() {
        let progress = ExportProgress {
            current: 1,
            total: 4,
            ..ExportProgress::default()
        };
        assert!((progress.fraction() - 0.25).abs() < f64::EPSILON);
        assert!(ExportProgress::default().fraction().abs() < f64::EPSILON);
    }
}
