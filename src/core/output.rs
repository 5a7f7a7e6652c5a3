//! Shared report types for multi-step operations.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ran,
    Skipped,
    Failed,
    Disabled,
}

/// Outcome of one step of a build, init, clean or sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepReport {
    pub fn ran(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Ran,
            detail: None,
        }
    }

    pub fn skipped(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Skipped,
            detail: Some(reason.into()),
        }
    }

    pub fn disabled(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Disabled,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Count of steps per status, for summaries.
pub fn count(steps: &[StepReport], status: StepStatus) -> usize {
    steps.iter().filter(|s| s.status == status).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(StepReport::skipped("composer install", "unchanged")).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["detail"], "unchanged");
    }

    #[test]
    fn counts_by_status() {
        let steps = vec![
            StepReport::ran("a"),
            StepReport::ran("b"),
            StepReport::disabled("c"),
        ];
        assert_eq!(count(&steps, StepStatus::Ran), 2);
        assert_eq!(count(&steps, StepStatus::Failed), 0);
    }
}
