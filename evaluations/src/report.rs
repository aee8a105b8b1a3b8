use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::metrics::CorpusScores;

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub overview: OverviewSection,
    pub metrics: LexicalSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeSection>,
}

#[derive(Debug, Serialize)]
pub struct OverviewSection {
    pub generated_at: String,
    pub predictions_file: String,
    pub evaluated: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct LexicalSection {
    pub exact_match: f64,
    pub f1: f64,
    pub rouge_l: f64,
    pub meteor: f64,
}

#[derive(Debug, Serialize)]
pub struct JudgeSection {
    pub model: String,
    pub setting: String,
    pub score: f64,
    pub judged: usize,
    pub failed: usize,
}

impl MetricsReport {
    pub fn new(
        predictions_file: &Path,
        corpus: &CorpusScores,
        skipped: usize,
        judge: Option<JudgeSection>,
    ) -> Self {
        Self {
            overview: OverviewSection {
                generated_at: format_timestamp(&Utc::now()),
                predictions_file: predictions_file.display().to_string(),
                evaluated: corpus.entries,
                skipped,
            },
            metrics: LexicalSection {
                exact_match: corpus.exact_match,
                f1: corpus.token_f1,
                rouge_l: corpus.rouge_l,
                meteor: corpus.meteor,
            },
            judge,
        }
    }

    /// Pretty JSON to the output file when one was given, otherwise into
    /// the log.
    pub fn write(&self, output_file: Option<&Path>) -> Result<()> {
        let rendered =
            serde_json::to_string_pretty(self).context("serialising metrics report")?;
        match output_file {
            Some(path) => {
                fs::write(path, &rendered)
                    .with_context(|| format!("writing metrics report to {}", path.display()))?;
                info!(path = %path.display(), "Wrote metrics report");
            }
            None => {
                info!("Evaluation metrics:\n{rendered}");
            }
        }
        Ok(())
    }
}
