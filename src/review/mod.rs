//! Review outcome classification.
//!
//! Turns free-text review-agent output plus an exit code into a verdict.
//! Marker matching is case-insensitive substring search, approval markers
//! first: "no issues found" must approve even though it contains the
//! rejection marker "issues found". With no marker at all the exit code
//! decides, and a non-zero exit is an *error*, never a silent rejection.

use serde::{Deserialize, Serialize};

const APPROVAL_MARKERS: &[&str] = &["approved", "lgtm", "review passed", "no issues found"];

const REJECTION_MARKERS: &[&str] = &["rejected", "changes requested", "needs work", "issues found"];

/// Verdict of a review invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDisposition {
    Approved,
    Rejected,
    Error,
}

impl std::fmt::Display for ReviewDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewDisposition::Approved => "approved",
            ReviewDisposition::Rejected => "rejected",
            ReviewDisposition::Error => "error",
        };
        f.write_str(s)
    }
}

/// Parsed review result. Rejections always carry the agent's raw output
/// as feedback for the rework cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub outcome: ReviewDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ReviewOutcome {
    pub fn is_approved(&self) -> bool {
        self.outcome == ReviewDisposition::Approved
    }

    pub fn is_rejected(&self) -> bool {
        self.outcome == ReviewDisposition::Rejected
    }
}

/// Classify review-agent output.
pub fn parse_review_outcome(output: &str, exit_code: i32) -> ReviewOutcome {
    let haystack = output.to_lowercase();

    for marker in APPROVAL_MARKERS {
        if haystack.contains(marker) {
            return ReviewOutcome {
                outcome: ReviewDisposition::Approved,
                feedback: None,
            };
        }
    }

    for marker in REJECTION_MARKERS {
        if haystack.contains(marker) {
            return ReviewOutcome {
                outcome: ReviewDisposition::Rejected,
                feedback: Some(output.trim().to_string()),
            };
        }
    }

    if exit_code == 0 {
        ReviewOutcome {
            outcome: ReviewDisposition::Approved,
            feedback: None,
        }
    } else {
        let trimmed = output.trim();
        ReviewOutcome {
            outcome: ReviewDisposition::Error,
            feedback: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }
}
