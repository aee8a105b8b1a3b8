use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::Context;
use common::{
    error::AppError,
    models::{BookMetadata, BookRecord, QaPair, Split},
};
use serde::Deserialize;
use tracing::warn;

/// One NarrativeQA annotation row from the per-split JSONL files.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationRecord {
    pub document_id: String,
    #[serde(default)]
    pub gutenberg_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub qas: Vec<QaPair>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub genre_tags: Vec<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

/// Outcome of joining one split. Problem IDs are reported, never fatal.
#[derive(Debug, Default)]
pub struct JoinOutcome {
    pub records: Vec<BookRecord>,
    /// document_ids whose mapped gutenberg_id had no cleaned text.
    pub missing_text: Vec<String>,
    /// document_ids dropped because the record failed validation.
    pub invalid: Vec<String>,
    /// document_ids dropped as duplicates within the split.
    pub duplicates: Vec<String>,
    /// document_ids with no gutenberg_id mapping at all.
    pub unmapped: Vec<String>,
}

/// Read the annotation JSONL for one split. Malformed lines are logged with
/// their line number and counted, and the load continues.
pub fn load_annotations(path: &Path) -> Result<(Vec<AnnotationRecord>, usize), AppError> {
    let file = File::open(path)
        .with_context(|| format!("opening annotations at {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut malformed = 0usize;
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!(
                "reading annotations line {} from {}",
                line_idx + 1,
                path.display()
            )
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AnnotationRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(
                    line = line_idx + 1,
                    error = %err,
                    path = %path.display(),
                    "Skipping malformed annotation line"
                );
                malformed = malformed.saturating_add(1);
            }
        }
    }
    Ok((records, malformed))
}

/// Merge cleaned book texts with the annotation records for one split.
///
/// `mapping` is the manifest's document_id -> gutenberg_id association and
/// takes precedence over any gutenberg_id carried inline by the annotation.
/// Records keep their position in the annotation file; a book without
/// cleaned text is still emitted (with `text: None`) so the on-disk layout
/// stays aligned with the annotations, but it is reported in `missing_text`.
pub fn join_split(
    split: Split,
    annotations: Vec<AnnotationRecord>,
    cleaned_texts: &HashMap<String, String>,
    mapping: &HashMap<String, String>,
) -> JoinOutcome {
    let mut outcome = JoinOutcome::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for annotation in annotations {
        let document_id = annotation.document_id.clone();

        if !seen.insert(document_id.clone()) {
            warn!(%document_id, %split, "Dropping duplicate document in split");
            outcome.duplicates.push(document_id);
            continue;
        }

        let Some(gutenberg_id) = mapping
            .get(&document_id)
            .cloned()
            .or_else(|| annotation.gutenberg_id.clone())
        else {
            warn!(%document_id, %split, "No gutenberg_id mapping for document");
            outcome.unmapped.push(document_id);
            continue;
        };

        let text = cleaned_texts.get(&gutenberg_id).cloned();
        if text.is_none() {
            warn!(
                %document_id,
                %gutenberg_id,
                %split,
                "No cleaned text for mapped book"
            );
            outcome.missing_text.push(document_id.clone());
        }

        let record = BookRecord {
            document_id: document_id.clone(),
            gutenberg_id,
            split,
            title: annotation.title,
            text,
            summary: annotation.summary,
            qas: annotation.qas,
            metadata: BookMetadata {
                author: annotation.author,
                publication_year: annotation.publication_year,
                genre_tags: annotation.genre_tags,
                source_urls: annotation.source_urls,
            },
        };

        match record.validate() {
            Ok(()) => outcome.records.push(record),
            Err(err) => {
                warn!(%document_id, error = %err, "Dropping invalid book record");
                outcome.invalid.push(document_id);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn annotation(document_id: &str, gutenberg_id: Option<&str>) -> AnnotationRecord {
        AnnotationRecord {
            document_id: document_id.to_string(),
            gutenberg_id: gutenberg_id.map(str::to_string),
            title: "Alice's Adventures in Wonderland".into(),
            summary: "Alice follows a rabbit underground.".into(),
            qas: vec![QaPair {
                question: "Who does Alice follow?".into(),
                answers: vec!["The White Rabbit".into()],
                is_question_modified: false,
                is_answer_modified: vec![false],
            }],
            author: Some("Lewis Carroll".into()),
            publication_year: Some(1865),
            genre_tags: vec!["fantasy".into()],
            source_urls: vec![],
        }
    }

    #[test]
    fn joins_text_via_manifest_mapping() {
        let mut texts = HashMap::new();
        texts.insert("11".to_string(), "Down the rabbit hole.".to_string());
        let mut mapping = HashMap::new();
        mapping.insert("doc-a".to_string(), "11".to_string());

        let outcome = join_split(Split::Train, vec![annotation("doc-a", None)], &texts, &mapping);
        assert_eq!(outcome.records.len(), 1);
        let record = outcome.records.first().expect("record");
        assert_eq!(record.gutenberg_id, "11");
        assert_eq!(record.text.as_deref(), Some("Down the rabbit hole."));
        assert!(outcome.missing_text.is_empty());
    }

    #[test]
    fn missing_text_is_reported_not_fatal() {
        let texts = HashMap::new();
        let mut mapping = HashMap::new();
        mapping.insert("doc-a".to_string(), "11".to_string());

        let outcome = join_split(Split::Test, vec![annotation("doc-a", None)], &texts, &mapping);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.missing_text, vec!["doc-a".to_string()]);
        assert!(outcome.records.first().expect("record").text.is_none());
    }

    #[test]
    fn duplicates_are_dropped_and_ids_stay_unique() {
        let mut texts = HashMap::new();
        texts.insert("11".to_string(), "text".to_string());
        let mut mapping = HashMap::new();
        mapping.insert("doc-a".to_string(), "11".to_string());

        let outcome = join_split(
            Split::Train,
            vec![annotation("doc-a", None), annotation("doc-a", None)],
            &texts,
            &mapping,
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.duplicates.len(), 1);

        let mut ids: Vec<&str> = outcome
            .records
            .iter()
            .map(|r| r.document_id.as_str())
            .collect();
        ids.dedup();
        assert_eq!(ids.len(), outcome.records.len());
    }

    #[test]
    fn records_without_qas_are_invalid() {
        let mut bad = annotation("doc-b", Some("84"));
        bad.qas.clear();
        let texts = HashMap::new();
        let mapping = HashMap::new();

        let outcome = join_split(Split::Validation, vec![bad], &texts, &mapping);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.invalid, vec!["doc-b".to_string()]);
        assert!(outcome.records.iter().all(|r| !r.qas.is_empty()));
    }

    #[test]
    fn inline_gutenberg_id_is_a_fallback() {
        let mut texts = HashMap::new();
        texts.insert("84".to_string(), "It was a dreary night.".to_string());
        let mapping = HashMap::new();

        let outcome = join_split(
            Split::Train,
            vec![annotation("doc-b", Some("84"))],
            &texts,
            &mapping,
        );
        assert_eq!(
            outcome.records.first().map(|r| r.gutenberg_id.as_str()),
            Some("84")
        );
    }

    #[test]
    fn malformed_annotation_lines_are_counted() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "{}",
            serde_json::json!({
                "document_id": "doc-a",
                "title": "Alice",
                "summary": "s",
                "qas": [{"question": "q", "answers": ["a"]}]
            })
        )
        .expect("write");
        writeln!(file, "{{ not json").expect("write");

        let (records, malformed) = load_annotations(file.path()).expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(malformed, 1);
    }
}
