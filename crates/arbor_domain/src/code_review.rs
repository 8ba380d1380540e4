#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeReviewState {
    Open,
    Merged,
    Closed,
}

impl CodeReviewState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Merged)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "opened" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Unknown,
}

impl PipelineStatus {
    /// Maps both GitLab pipeline statuses and GitHub check conclusions.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "waiting_for_resource" | "preparing" | "pending" | "scheduled"
            | "queued" | "manual" => Self::Pending,
            "running" | "in_progress" => Self::Running,
            "success" | "passed" | "neutral" => Self::Success,
            "failed" | "failure" | "timed_out" | "action_required" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            "skipped" => Self::Skipped,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: PipelineStatus,
    pub web_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeReview {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub state: CodeReviewState,
    pub web_url: String,
    pub pipeline: Option<Pipeline>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_review_state_parse_accepts_provider_spellings() {
        assert_eq!(CodeReviewState::parse("opened"), Some(CodeReviewState::Open));
        assert_eq!(CodeReviewState::parse(" OPEN "), Some(CodeReviewState::Open));
        assert_eq!(CodeReviewState::parse("merged"), Some(CodeReviewState::Merged));
        assert_eq!(CodeReviewState::parse("locked"), None);
        assert!(CodeReviewState::Merged.is_finished());
        assert!(!CodeReviewState::Open.is_finished());
    }

    #[test]
    fn pipeline_status_parse_maps_gitlab_and_github_values() {
        assert_eq!(PipelineStatus::parse("running"), PipelineStatus::Running);
        assert_eq!(PipelineStatus::parse("in_progress"), PipelineStatus::Running);
        assert_eq!(PipelineStatus::parse("failure"), PipelineStatus::Failed);
        assert_eq!(PipelineStatus::parse("cancelled"), PipelineStatus::Canceled);
        assert_eq!(PipelineStatus::parse("weird"), PipelineStatus::Unknown);
    }
}
