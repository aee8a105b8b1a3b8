use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A single question with its reference answers and the LiteraryQA
/// modification flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answers: Vec<String>,
    #[serde(default)]
    pub is_question_modified: bool,
    #[serde(default)]
    pub is_answer_modified: Vec<bool>,
}

impl QaPair {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.answers.is_empty() {
            return Err(AppError::Validation(format!(
                "question '{}' has no reference answers",
                self.question
            )));
        }
        if !self.is_answer_modified.is_empty()
            && self.is_answer_modified.len() != self.answers.len()
        {
            return Err(AppError::Validation(format!(
                "question '{}' has {} answers but {} modification flags",
                self.question,
                self.answers.len(),
                self.is_answer_modified.len()
            )));
        }
        Ok(())
    }
}
