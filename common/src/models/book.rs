use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::qa::QaPair};

/// Dataset split a book belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Self; 3] = [Self::Train, Self::Validation, Self::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "validation" | "valid" | "dev" => Ok(Self::Validation),
            "test" => Ok(Self::Test),
            other => Err(AppError::Validation(format!(
                "unknown dataset split: {other}"
            ))),
        }
    }
}

/// Bibliographic information carried alongside the narrative text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub genre_tags: Vec<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

/// A fully joined LiteraryQA book record. Created once per pipeline run and
/// immutable afterwards; `text` stays `None` when the cleaned book could not
/// be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub document_id: String,
    pub gutenberg_id: String,
    pub split: Split,
    pub title: String,
    pub text: Option<String>,
    pub summary: String,
    pub qas: Vec<QaPair>,
    #[serde(default)]
    pub metadata: BookMetadata,
}

impl BookRecord {
    /// A valid record carries at least one QA pair, and every pair is
    /// internally consistent.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.document_id.trim().is_empty() {
            return Err(AppError::Validation(
                "book record is missing a document_id".to_string(),
            ));
        }
        if self.qas.is_empty() {
            return Err(AppError::Validation(format!(
                "book record {} has no QA pairs",
                self.document_id
            )));
        }
        for qa in &self.qas {
            qa.validate()?;
        }
        Ok(())
    }
}
