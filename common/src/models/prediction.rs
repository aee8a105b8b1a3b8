use serde::{Deserialize, Serialize};

/// One line of a predictions JSONL file. `question`, `title` and `summary`
/// are only required when the run includes LLM judging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub prediction: String,
    pub answers: Vec<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl PredictionRecord {
    /// Fields the judge prompt needs beyond the lexical metrics.
    pub fn has_judge_context(&self) -> bool {
        self.question.is_some() && self.title.is_some() && self.summary.is_some()
    }
}
