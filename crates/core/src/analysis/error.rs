use std::fmt;

/// Input the analysis stages cannot work with (too short, degenerate).
///
/// Returned inside `anyhow::Error`; callers that care can `downcast_ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisError {
    pub stage: &'static str,
    pub detail: String,
}

impl AnalysisError {
    pub fn insufficient_data(stage: &'static str, required: usize, actual: usize) -> Self {
        Self {
            stage,
            detail: format!("need at least {required} price points, got {actual}"),
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analysis error (stage={}): {}", self.stage, self.detail)
    }
}

impl std::error::Error for AnalysisError {}
