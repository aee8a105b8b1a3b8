use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use common::models::PredictionRecord;
use tracing::warn;

/// Predictions parsed from a JSONL file. Malformed lines are counted and
/// excluded from aggregation, never fatal.
#[derive(Debug)]
pub struct LoadedPredictions {
    pub entries: Vec<PredictionRecord>,
    pub skipped: usize,
}

pub fn load_predictions(path: &Path, limit: Option<usize>) -> Result<LoadedPredictions> {
    let file =
        File::open(path).with_context(|| format!("opening predictions at {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for (line_idx, line) in reader.lines().enumerate() {
        if let Some(limit) = limit {
            if entries.len() >= limit {
                break;
            }
        }
        let line = line.with_context(|| {
            format!(
                "reading predictions line {} from {}",
                line_idx + 1,
                path.display()
            )
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(record) => entries.push(record),
            Err(reason) => {
                warn!(line = line_idx + 1, %reason, "Skipping malformed prediction entry");
                skipped = skipped.saturating_add(1);
            }
        }
    }

    Ok(LoadedPredictions { entries, skipped })
}

fn parse_line(line: &str) -> Result<PredictionRecord, String> {
    let record: PredictionRecord = serde_json::from_str(line).map_err(|err| err.to_string())?;
    if record.answers.is_empty() {
        return Err("'answers' must be a non-empty list of reference answers".to_string());
    }
    if record.answers.iter().any(|answer| answer.trim().is_empty()) {
        return Err("'answers' contains an empty reference".to_string());
    }
    Ok(record)
}

/// Judging needs question, title and summary on every entry; checked up
/// front so a judge run fails before any API call goes out.
pub fn ensure_judge_fields(entries: &[PredictionRecord]) -> Result<()> {
    let missing = entries
        .iter()
        .filter(|entry| !entry.has_judge_context())
        .count();
    if missing > 0 {
        return Err(anyhow!(
            "{missing} prediction entries are missing 'question', 'title' or 'summary', \
             which judging requires"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn predictions_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        for line in lines {
            writeln!(file, "{line}").expect("write line");
        }
        file
    }

    #[test]
    fn loads_valid_entries() {
        let file = predictions_file(&[
            r#"{"prediction": "The White Rabbit", "answers": ["The White Rabbit"]}"#,
            r#"{"prediction": "Ishmael", "answers": ["Ishmael", "the narrator"]}"#,
        ]);
        let loaded = load_predictions(file.path(), None).expect("load");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.skipped, 0);
    }

    #[test]
    fn malformed_entries_are_skipped_and_counted() {
        let file = predictions_file(&[
            r#"{"prediction": "ok", "answers": ["ok"]}"#,
            r#"{"prediction": "missing answers"}"#,
            r#"{"prediction": "empty answers", "answers": []}"#,
            "not json at all",
        ]);
        let loaded = load_predictions(file.path(), None).expect("load");
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.skipped, 3);
    }

    #[test]
    fn limit_caps_loaded_entries() {
        let file = predictions_file(&[
            r#"{"prediction": "a", "answers": ["a"]}"#,
            r#"{"prediction": "b", "answers": ["b"]}"#,
            r#"{"prediction": "c", "answers": ["c"]}"#,
        ]);
        let loaded = load_predictions(file.path(), Some(2)).expect("load");
        assert_eq!(loaded.entries.len(), 2);
    }

    #[test]
    fn judge_fields_are_validated() {
        let file = predictions_file(&[
            r#"{"prediction": "a", "answers": ["a"], "question": "q", "title": "t", "summary": "s"}"#,
            r#"{"prediction": "b", "answers": ["b"]}"#,
        ]);
        let loaded = load_predictions(file.path(), None).expect("load");
        assert!(ensure_judge_fields(&loaded.entries).is_err());
        assert!(ensure_judge_fields(&loaded.entries[..1]).is_ok());
    }
}
