use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};

/// Known judge-model aliases, resolved during `finalize`.
const MODEL_ALIASES: &[(&str, &str)] = &[("prometheus", "prometheus-eval/prometheus-7b-v2.0")];

/// What the judge sees besides the question and candidate answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum JudgeSetting {
    /// Grade against the reference answers only.
    References,
    /// Grade against the references with the book summary as added context.
    Summary,
}

impl Default for JudgeSetting {
    fn default() -> Self {
        Self::References
    }
}

impl std::fmt::Display for JudgeSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::References => write!(f, "references"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path to the predictions JSONL file
    #[arg(long)]
    pub predictions_file: PathBuf,

    /// Path to save the computed metrics (logged when omitted)
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Model name for judging; no judging is performed when omitted
    #[arg(long, env = "EVAL_JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// Context handed to the judge
    #[arg(long, default_value_t = JudgeSetting::References)]
    pub judge_setting: JudgeSetting,

    /// Limit the number of predictions evaluated (0 = all)
    #[arg(long = "limit", default_value_t = 0)]
    pub limit_arg: usize,

    /// Maximum retries per judge call
    #[arg(long, default_value_t = 3)]
    pub judge_max_retries: usize,

    // Computed fields (not arguments)
    #[arg(skip)]
    pub limit: Option<usize>,
}

impl Config {
    pub fn finalize(&mut self) -> Result<()> {
        if !self.predictions_file.is_file() {
            return Err(anyhow!(
                "--predictions-file {} does not exist",
                self.predictions_file.display()
            ));
        }

        if let Some(output_file) = &self.output_file {
            ensure_parent(output_file)?;
        }

        if let Some(model) = &self.judge_model {
            let trimmed = model.trim();
            if trimmed.is_empty() {
                return Err(anyhow!("--judge-model requires a non-empty model name"));
            }
            let resolved = MODEL_ALIASES
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
                .map_or(trimmed, |(_, full)| *full);
            self.judge_model = Some(resolved.to_string());
        }

        if self.judge_model.is_some() && self.judge_max_retries == 0 {
            return Err(anyhow!("--judge-max-retries must be greater than zero"));
        }

        // Handle limit
        if self.limit_arg == 0 {
            self.limit = None;
        } else {
            self.limit = Some(self.limit_arg);
        }

        Ok(())
    }
}

pub struct ParsedArgs {
    pub config: Config,
}

pub fn parse() -> Result<ParsedArgs> {
    let mut config = Config::parse();
    config.finalize()?;
    Ok(ParsedArgs { config })
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {}", path.display()))?;
    }
    Ok(())
}
