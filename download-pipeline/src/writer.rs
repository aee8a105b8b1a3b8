use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use common::{
    error::AppError,
    models::{BookRecord, Split},
};
use tracing::info;

use crate::cleaner::CleanOutcome;

/// A permanently failed download, reported in `logs/failed_downloads.tsv`.
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub document_id: String,
    pub gutenberg_id: String,
    pub split: Split,
    pub url: String,
}

/// Owns the on-disk layout of a pipeline run:
/// `<out>/<split>/<gutenberg_id>.htm`, `<out>/<split>/<gutenberg_id>.cleaned.txt`,
/// `<out>/logs/` for failure reports, and `<out>/jsonl/<split>.jsonl` for the
/// optional mirror.
pub struct DatasetWriter {
    output_dir: PathBuf,
}

impl DatasetWriter {
    /// Creating the writer also validates the output directory; an
    /// unwritable path is the one fatal configuration error of a run.
    pub fn new(output_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;
        fs::create_dir_all(output_dir.join("logs"))
            .with_context(|| format!("creating log directory under {}", output_dir.display()))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn raw_path(&self, split: Split, gutenberg_id: &str) -> PathBuf {
        self.output_dir
            .join(split.as_str())
            .join(format!("{gutenberg_id}.htm"))
    }

    pub fn cleaned_path(&self, split: Split, gutenberg_id: &str) -> PathBuf {
        self.output_dir
            .join(split.as_str())
            .join(format!("{gutenberg_id}.cleaned.txt"))
    }

    pub fn write_raw(&self, split: Split, gutenberg_id: &str, body: &str) -> Result<(), AppError> {
        let path = self.raw_path(split, gutenberg_id);
        self.write_file(&path, body.as_bytes())
    }

    pub fn write_cleaned(
        &self,
        split: Split,
        gutenberg_id: &str,
        text: &str,
    ) -> Result<(), AppError> {
        let path = self.cleaned_path(split, gutenberg_id);
        self.write_file(&path, text.as_bytes())
    }

    /// Per-book cleaning note, written for every cleaned book.
    pub fn write_cleaning_log(
        &self,
        split: Split,
        gutenberg_id: &str,
        outcome: &CleanOutcome,
    ) -> Result<(), AppError> {
        let path = self
            .output_dir
            .join("logs")
            .join(split.as_str())
            .join(format!("{gutenberg_id}_cleaning.log"));
        let note = format!(
            "start_marker_found\t{}\nend_marker_found\t{}\nflagged_for_review\t{}\n",
            outcome.start_marker_found,
            outcome.end_marker_found,
            outcome.needs_review()
        );
        self.write_file(&path, note.as_bytes())
    }

    pub fn write_failed_downloads(&self, failures: &[DownloadFailure]) -> Result<(), AppError> {
        if failures.is_empty() {
            return Ok(());
        }
        let path = self.output_dir.join("logs").join("failed_downloads.tsv");
        let mut body = String::from("doc_id\tbook_id\tsplit\turl\n");
        for failure in failures {
            body.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                failure.document_id, failure.gutenberg_id, failure.split, failure.url
            ));
        }
        self.write_file(&path, body.as_bytes())?;
        info!(count = failures.len(), path = %path.display(), "Recorded failed downloads");
        Ok(())
    }

    /// One fully joined record per line under `jsonl/<split>.jsonl`.
    pub fn write_jsonl(&self, split: Split, records: &[BookRecord]) -> Result<PathBuf, AppError> {
        let path = self
            .output_dir
            .join("jsonl")
            .join(format!("{split}.jsonl"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        for record in records {
            let line = serde_json::to_vec(record)?;
            file.write_all(&line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(path)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::models::{BookMetadata, QaPair};

    use super::*;

    fn sample_record(document_id: &str) -> BookRecord {
        BookRecord {
            document_id: document_id.into(),
            gutenberg_id: "11".into(),
            split: Split::Train,
            title: "Alice".into(),
            text: Some("Down the rabbit hole.".into()),
            summary: "A girl in a strange world.".into(),
            qas: vec![QaPair {
                question: "Who falls?".into(),
                answers: vec!["Alice".into()],
                is_question_modified: false,
                is_answer_modified: vec![false],
            }],
            metadata: BookMetadata::default(),
        }
    }

    #[test]
    fn layout_paths_are_split_scoped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = DatasetWriter::new(dir.path()).expect("writer");
        assert_eq!(
            writer.raw_path(Split::Test, "84"),
            dir.path().join("test").join("84.htm")
        );
        assert_eq!(
            writer.cleaned_path(Split::Train, "11"),
            dir.path().join("train").join("11.cleaned.txt")
        );
    }

    #[test]
    fn jsonl_mirror_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = DatasetWriter::new(dir.path()).expect("writer");
        let records = vec![sample_record("doc-a"), sample_record("doc-b")];

        let path = writer.write_jsonl(Split::Train, &records).expect("write");
        let body = fs::read_to_string(path).expect("read back");
        let lines: Vec<BookRecord> = body
            .lines()
            .map(|line| serde_json::from_str(line).expect("parse line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.first().map(|r| r.document_id.as_str()), Some("doc-a"));
    }

    #[test]
    fn raw_and_cleaned_files_land_under_split_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = DatasetWriter::new(dir.path()).expect("writer");
        writer
            .write_raw(Split::Validation, "2701", "<html></html>")
            .expect("raw");
        writer
            .write_cleaned(Split::Validation, "2701", "Call me Ishmael.")
            .expect("cleaned");
        assert!(writer.raw_path(Split::Validation, "2701").exists());
        assert!(writer.cleaned_path(Split::Validation, "2701").exists());
    }
}
