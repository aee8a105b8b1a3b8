use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use common::{models::Split, utils::config::get_config};
use download_pipeline::{DownloadPipeline, PipelineOptions};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rebuild the LiteraryQA dataset: download Gutenberg books, strip
/// boilerplate, join with the NarrativeQA annotations and write the
/// per-split layout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory that receives the per-split book files
    #[arg(long, default_value = "data/literaryqa")]
    output_dir: PathBuf,

    /// Dash-separated list of splits to process, e.g. `train-validation-test`
    #[arg(long, default_value = "train-validation-test")]
    splits: String,

    /// Tab-separated URL manifest (document id, Gutenberg id, split, URL)
    #[arg(long, default_value = "data/literaryqa_urls.tsv")]
    manifest: PathBuf,

    /// Directory holding the per-split annotation JSONL files
    #[arg(long, default_value = "data/annotations")]
    annotations_dir: PathBuf,

    /// Also mirror the joined records as jsonl/<split>.jsonl
    #[arg(long)]
    write_as_jsonl: bool,
}

fn parse_splits(raw: &str) -> anyhow::Result<Vec<Split>> {
    let mut splits = Vec::new();
    for part in raw.split('-').filter(|part| !part.is_empty()) {
        let split = part
            .parse::<Split>()
            .with_context(|| format!("parsing --splits value '{raw}'"))?;
        if !splits.contains(&split) {
            splits.push(split);
        }
    }
    if splits.is_empty() {
        anyhow::bail!("--splits selected no dataset splits");
    }
    Ok(splits)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config()?;
    let splits = parse_splits(&args.splits)?;

    info!(
        output_dir = %args.output_dir.display(),
        ?splits,
        write_as_jsonl = args.write_as_jsonl,
        "Starting LiteraryQA reconstruction"
    );

    let options = PipelineOptions {
        output_dir: args.output_dir,
        manifest_path: args.manifest,
        annotations_dir: args.annotations_dir,
        splits,
        write_jsonl: args.write_as_jsonl,
    };

    let pipeline = DownloadPipeline::new(&config, options)?;
    let summary = pipeline.run().await?;

    info!(
        downloaded = summary.downloaded,
        skipped = summary.download_skipped,
        failed = summary.download_failed,
        cleaned = summary.cleaned,
        flagged_for_review = summary.flagged_for_review,
        joined = summary.joined,
        missing_text = summary.missing_text,
        "Pipeline finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dash_separated_splits() {
        let splits = parse_splits("train-validation-test").expect("splits");
        assert_eq!(splits, vec![Split::Train, Split::Validation, Split::Test]);
    }

    #[test]
    fn deduplicates_repeated_splits() {
        let splits = parse_splits("train-train").expect("splits");
        assert_eq!(splits, vec![Split::Train]);
    }

    #[test]
    fn rejects_unknown_split_names() {
        assert!(parse_splits("train-eval").is_err());
        assert!(parse_splits("").is_err());
    }
}
