use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable record of one thing the session did, appended in order.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
    pub page_url: String,
}

impl ActionRecord {
    pub fn now(kind: impl Into<String>, detail: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            kind: kind.into(),
            detail: detail.into(),
            page_url: page_url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SessionOutcome {
    Completed(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub instance: u32,
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub pages_visited: usize,
    pub visited_urls: Vec<String>,
    pub action_count: usize,
    pub actions: Vec<ActionRecord>,
    pub proxy: Option<String>,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    pub fn summary(&self) -> String {
        let state = match &self.outcome {
            SessionOutcome::Completed(reason) => format!("completed ({reason})"),
            SessionOutcome::Failed(reason) => format!("failed ({reason})"),
        };
        format!(
            "session {} [#{}] {} — {} pages, {} actions, {}s, proxy: {}",
            self.session_id,
            self.instance,
            state,
            self.pages_visited,
            self.action_count,
            self.duration_seconds,
            self.proxy.as_deref().unwrap_or("none"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_names_outcome_and_counts() {
        let report = SessionReport {
            session_id: "s-1".into(),
            instance: 2,
            target_url: "https://example.com".into(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            duration_seconds: 42,
            pages_visited: 3,
            visited_urls: vec!["https://example.com/".into()],
            action_count: 17,
            actions: Vec::new(),
            proxy: None,
            outcome: SessionOutcome::Completed("page budget reached".into()),
        };
        let summary = report.summary();
        assert!(summary.contains("completed (page budget reached)"));
        assert!(summary.contains("3 pages"));
        assert!(summary.contains("proxy: none"));
    }
}
