mod args;
mod judge;
mod metrics;
mod openai;
mod predictions;
mod report;

use anyhow::Result;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    args::Config,
    judge::Judge,
    report::{JudgeSection, MetricsReport},
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let parsed = args::parse()?;
    let config = parsed.config;

    info!(
        predictions_file = %config.predictions_file.display(),
        judging = config.judge_model.is_some(),
        "Starting evaluation of predictions"
    );

    let loaded = predictions::load_predictions(&config.predictions_file, config.limit)?;
    info!(
        loaded = loaded.entries.len(),
        skipped = loaded.skipped,
        "Loaded predictions"
    );

    let entry_scores: Vec<_> = loaded.entries.iter().map(metrics::score_entry).collect();
    let corpus = metrics::aggregate(&entry_scores);
    info!(
        exact_match = corpus.exact_match,
        f1 = corpus.token_f1,
        rouge_l = corpus.rouge_l,
        meteor = corpus.meteor,
        "Computed n-gram based metrics"
    );

    let judge_section = match &config.judge_model {
        Some(model) => Some(run_judging(model, &config, &loaded.entries).await?),
        None => None,
    };

    let report = MetricsReport::new(
        &config.predictions_file,
        &corpus,
        loaded.skipped,
        judge_section,
    );
    report.write(config.output_file.as_deref())?;

    Ok(())
}

/// Grade every entry with the LLM judge. Per-entry failures are logged and
/// excluded from the average; only client construction errors are fatal.
async fn run_judging(
    model: &str,
    config: &Config,
    entries: &[common::models::PredictionRecord],
) -> Result<JudgeSection> {
    predictions::ensure_judge_fields(entries)?;
    let judge = Judge::from_env(model, config.judge_setting)?;
    info!(model, setting = %config.judge_setting, "Evaluating with LLM judge");

    let mut scores: Vec<u8> = Vec::with_capacity(entries.len());
    let mut failed = 0usize;
    for (idx, entry) in entries.iter().enumerate() {
        let retry_strategy = ExponentialBackoff::from_millis(500)
            .map(jitter)
            .take(config.judge_max_retries.saturating_sub(1));

        let verdict = RetryIf::spawn(
            retry_strategy,
            || judge.grade(entry),
            |err: &common::error::AppError| err.is_transient(),
        )
        .await;

        match verdict {
            Ok(score) => scores.push(score),
            Err(err) => {
                warn!(entry = idx, error = %err, "Judge call failed, excluding entry");
                failed = failed.saturating_add(1);
            }
        }
    }

    let score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64
    };
    info!(score, judged = scores.len(), failed, "Completed LLM judging");

    Ok(JudgeSection {
        model: model.to_string(),
        setting: config.judge_setting.to_string(),
        score,
        judged: scores.len(),
        failed,
    })
}
