use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::PathBuf,
};

use common::{
    error::AppError,
    models::Split,
    utils::config::AppConfig,
};
use tracing::{info, info_span, warn};

use crate::{
    cleaner,
    fetcher::GutenbergFetcher,
    joiner::{self, JoinOutcome},
    urls::{self, UrlEntry},
    writer::{DatasetWriter, DownloadFailure},
};

/// What a pipeline run should do, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub annotations_dir: PathBuf,
    pub splits: Vec<Split>,
    pub write_jsonl: bool,
}

/// Counters surfaced at the end of a run. Everything that went wrong is
/// already on disk (failed_downloads.tsv, per-book cleaning logs); this is
/// the one-glance version.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub downloaded: usize,
    pub download_skipped: usize,
    pub download_failed: usize,
    pub cleaned: usize,
    pub clean_skipped: usize,
    pub flagged_for_review: usize,
    pub missing_raw: usize,
    pub joined: usize,
    pub missing_text: usize,
    pub invalid_records: usize,
    pub duplicate_records: usize,
    pub malformed_annotations: usize,
}

/// Sequential download/clean/join/write pipeline, one pass per split.
pub struct DownloadPipeline {
    fetcher: GutenbergFetcher,
    writer: DatasetWriter,
    options: PipelineOptions,
}

impl DownloadPipeline {
    pub fn new(config: &AppConfig, options: PipelineOptions) -> Result<Self, AppError> {
        let fetcher = GutenbergFetcher::new(config)?;
        let writer = DatasetWriter::new(&options.output_dir)?;
        Ok(Self {
            fetcher,
            writer,
            options,
        })
    }

    pub async fn run(&self) -> Result<PipelineSummary, AppError> {
        let manifest = urls::load_url_manifest(&self.options.manifest_path)?;
        let counts: BTreeMap<&str, usize> = manifest
            .iter()
            .map(|(split, entries)| (split.as_str(), entries.len()))
            .collect();
        info!(?counts, "Loaded URL manifest");

        let mut summary = PipelineSummary::default();
        let mut failures: Vec<DownloadFailure> = Vec::new();

        for split in &self.options.splits {
            let Some(entries) = manifest.get(split) else {
                warn!(%split, "URL manifest has no entries for split");
                continue;
            };
            let span = info_span!("split", name = %split);
            let _enter = span.enter();

            self.download_split(*split, entries, &mut summary, &mut failures)
                .await;
            self.clean_split(*split, entries, &mut summary)?;
            self.join_split(*split, entries, &mut summary)?;
        }

        self.writer.write_failed_downloads(&failures)?;
        summary.download_failed = failures.len();

        info!(?summary, "Download and cleaning completed");
        Ok(summary)
    }

    async fn download_split(
        &self,
        split: Split,
        entries: &[UrlEntry],
        summary: &mut PipelineSummary,
        failures: &mut Vec<DownloadFailure>,
    ) {
        info!(%split, books = entries.len(), "Downloading split");
        for entry in entries {
            let raw_path = self.writer.raw_path(split, &entry.gutenberg_id);
            if raw_path.exists() {
                info!(book_id = %entry.gutenberg_id, "Raw file already present, skipping download");
                summary.download_skipped = summary.download_skipped.saturating_add(1);
                continue;
            }

            match self.fetcher.fetch_book(entry).await {
                Ok(body) => match self.writer.write_raw(split, &entry.gutenberg_id, &body) {
                    Ok(()) => summary.downloaded = summary.downloaded.saturating_add(1),
                    Err(err) => {
                        warn!(book_id = %entry.gutenberg_id, error = %err, "Failed to persist download");
                        failures.push(failure_for(entry));
                    }
                },
                Err(err) => {
                    warn!(
                        book_id = %entry.gutenberg_id,
                        url = %entry.url,
                        error = %err,
                        "Download permanently failed"
                    );
                    failures.push(failure_for(entry));
                }
            }
        }
    }

    fn clean_split(
        &self,
        split: Split,
        entries: &[UrlEntry],
        summary: &mut PipelineSummary,
    ) -> Result<(), AppError> {
        info!(%split, "Cleaning split");
        for entry in entries {
            let raw_path = self.writer.raw_path(split, &entry.gutenberg_id);
            let cleaned_path = self.writer.cleaned_path(split, &entry.gutenberg_id);

            if cleaned_path.exists() {
                summary.clean_skipped = summary.clean_skipped.saturating_add(1);
                continue;
            }
            if !raw_path.exists() {
                summary.missing_raw = summary.missing_raw.saturating_add(1);
                continue;
            }

            let raw = match fs::read(&raw_path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    warn!(book_id = %entry.gutenberg_id, error = %err, "Unreadable raw file");
                    summary.missing_raw = summary.missing_raw.saturating_add(1);
                    continue;
                }
            };

            let outcome = cleaner::clean_book(&raw)?;
            if outcome.needs_review() {
                warn!(
                    book_id = %entry.gutenberg_id,
                    start_marker = outcome.start_marker_found,
                    end_marker = outcome.end_marker_found,
                    "Boilerplate markers not found, flagged for manual review"
                );
                summary.flagged_for_review = summary.flagged_for_review.saturating_add(1);
            }
            self.writer
                .write_cleaning_log(split, &entry.gutenberg_id, &outcome)?;
            self.writer
                .write_cleaned(split, &entry.gutenberg_id, &outcome.text)?;
            summary.cleaned = summary.cleaned.saturating_add(1);
        }
        Ok(())
    }

    fn join_split(
        &self,
        split: Split,
        entries: &[UrlEntry],
        summary: &mut PipelineSummary,
    ) -> Result<(), AppError> {
        let annotations_path = self
            .options
            .annotations_dir
            .join(format!("{split}.jsonl"));
        if !annotations_path.exists() {
            warn!(
                %split,
                path = %annotations_path.display(),
                "No annotation file for split, skipping join"
            );
            return Ok(());
        }

        let (annotations, malformed) = joiner::load_annotations(&annotations_path)?;
        summary.malformed_annotations = summary.malformed_annotations.saturating_add(malformed);

        let mapping: HashMap<String, String> = entries
            .iter()
            .map(|entry| (entry.document_id.clone(), entry.gutenberg_id.clone()))
            .collect();

        let mut cleaned_texts: HashMap<String, String> = HashMap::new();
        for entry in entries {
            let path = self.writer.cleaned_path(split, &entry.gutenberg_id);
            if let Ok(text) = fs::read_to_string(&path) {
                cleaned_texts.insert(entry.gutenberg_id.clone(), text);
            }
        }

        let JoinOutcome {
            records,
            missing_text,
            invalid,
            duplicates,
            unmapped,
        } = joiner::join_split(split, annotations, &cleaned_texts, &mapping);

        summary.joined = summary.joined.saturating_add(records.len());
        summary.missing_text = summary.missing_text.saturating_add(missing_text.len());
        summary.invalid_records = summary.invalid_records.saturating_add(invalid.len());
        summary.duplicate_records = summary
            .duplicate_records
            .saturating_add(duplicates.len().saturating_add(unmapped.len()));

        if self.options.write_jsonl {
            let path = self.writer.write_jsonl(split, &records)?;
            info!(%split, records = records.len(), path = %path.display(), "Wrote JSONL mirror");
        }

        Ok(())
    }
}

fn failure_for(entry: &UrlEntry) -> DownloadFailure {
    DownloadFailure {
        document_id: entry.document_id.clone(),
        gutenberg_id: entry.gutenberg_id.clone(),
        split: entry.split,
        url: entry.url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use common::models::QaPair;

    use super::*;

    fn options(dir: &std::path::Path, write_jsonl: bool) -> PipelineOptions {
        PipelineOptions {
            output_dir: dir.join("out"),
            manifest_path: dir.join("urls.tsv"),
            annotations_dir: dir.join("annotations"),
            splits: vec![Split::Train],
            write_jsonl,
        }
    }

    fn seed_fixtures(dir: &std::path::Path) {
        let mut manifest = fs::File::create(dir.join("urls.tsv")).expect("manifest");
        write!(
            manifest,
            "split\tid\tbook_id\turl\n\
             train\tdoc-a\t11\thttps://www.gutenberg.org/files/11/11-h/11-h.htm\n"
        )
        .expect("write manifest");

        fs::create_dir_all(dir.join("annotations")).expect("annotations dir");
        let annotation = serde_json::json!({
            "document_id": "doc-a",
            "title": "Alice",
            "summary": "A girl in a strange world.",
            "qas": [{"question": "Who falls?", "answers": ["Alice"]}]
        });
        fs::write(
            dir.join("annotations/train.jsonl"),
            format!("{annotation}\n"),
        )
        .expect("write annotations");

        // Pre-seeded raw file keeps the fetcher offline in tests.
        fs::create_dir_all(dir.join("out/train")).expect("out dir");
        fs::write(
            dir.join("out/train/11.htm"),
            "*** START OF THIS PROJECT GUTENBERG EBOOK ALICE ***\n\
             Down the rabbit hole.\n\
             *** END OF THIS PROJECT GUTENBERG EBOOK ALICE ***\n",
        )
        .expect("write raw");
    }

    #[tokio::test]
    async fn run_cleans_joins_and_mirrors_jsonl() {
        let dir = tempfile::tempdir().expect("temp dir");
        seed_fixtures(dir.path());

        let pipeline = DownloadPipeline::new(&AppConfig::default(), options(dir.path(), true))
            .expect("pipeline");
        let summary = pipeline.run().await.expect("run");

        assert_eq!(summary.download_skipped, 1);
        assert_eq!(summary.cleaned, 1);
        assert_eq!(summary.joined, 1);
        assert_eq!(summary.download_failed, 0);

        let cleaned = fs::read_to_string(dir.path().join("out/train/11.cleaned.txt"))
            .expect("cleaned file");
        assert_eq!(cleaned, "Down the rabbit hole.");

        // The cleaning log is written even when the book is not flagged.
        assert_eq!(summary.flagged_for_review, 0);
        let cleaning_log = fs::read_to_string(dir.path().join("out/logs/train/11_cleaning.log"))
            .expect("cleaning log");
        assert!(cleaning_log.contains("flagged_for_review\tfalse"));

        let jsonl =
            fs::read_to_string(dir.path().join("out/jsonl/train.jsonl")).expect("jsonl file");
        let record: common::models::BookRecord =
            serde_json::from_str(jsonl.trim()).expect("record");
        assert_eq!(record.document_id, "doc-a");
        assert_eq!(record.text.as_deref(), Some("Down the rabbit hole."));
        assert_eq!(record.qas.len(), 1);
    }

    #[tokio::test]
    async fn second_run_skips_existing_work() {
        let dir = tempfile::tempdir().expect("temp dir");
        seed_fixtures(dir.path());

        let config = AppConfig::default();
        let pipeline =
            DownloadPipeline::new(&config, options(dir.path(), false)).expect("pipeline");
        pipeline.run().await.expect("first run");

        let summary = pipeline.run().await.expect("second run");
        assert_eq!(summary.cleaned, 0);
        assert_eq!(summary.clean_skipped, 1);
    }

    #[test]
    fn qa_fixture_is_valid() {
        let qa = QaPair {
            question: "Who falls?".into(),
            answers: vec!["Alice".into()],
            is_question_modified: false,
            is_answer_modified: vec![],
        };
        assert!(qa.validate().is_ok());
    }
}
