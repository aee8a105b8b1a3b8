use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::Context;
use common::{error::AppError, models::Split};
use tracing::warn;

/// One row of the URL manifest: which Gutenberg book backs which
/// NarrativeQA document, and where to fetch it.
#[derive(Debug, Clone)]
pub struct UrlEntry {
    pub document_id: String,
    pub gutenberg_id: String,
    pub split: Split,
    pub url: String,
}

/// Parse the tab-separated URL manifest into per-split entry lists.
///
/// The file carries a header row naming at least `id`, `book_id`, `split`
/// and `url`. Rows with missing columns or an unknown split are logged with
/// their line number and skipped; they never abort the load.
pub fn load_url_manifest(path: &Path) -> Result<BTreeMap<Split, Vec<UrlEntry>>, AppError> {
    let file = File::open(path)
        .with_context(|| format!("opening URL manifest at {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| AppError::Validation("URL manifest is empty".to_string()))?
        .with_context(|| format!("reading URL manifest header from {}", path.display()))?;
    let columns = parse_header(&header)?;

    let mut by_split: BTreeMap<Split, Vec<UrlEntry>> = BTreeMap::new();
    for (line_idx, line) in lines.enumerate() {
        let line = line.with_context(|| {
            format!(
                "reading URL manifest line {} from {}",
                line_idx + 2,
                path.display()
            )
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(&line, &columns) {
            Ok(entry) => by_split.entry(entry.split).or_default().push(entry),
            Err(reason) => {
                warn!(
                    line = line_idx + 2,
                    %reason,
                    "Skipping malformed URL manifest row"
                );
            }
        }
    }

    Ok(by_split)
}

struct ManifestColumns {
    document_id: usize,
    gutenberg_id: usize,
    split: usize,
    url: usize,
}

fn parse_header(header: &str) -> Result<ManifestColumns, AppError> {
    let names: Vec<&str> = header.split('\t').map(str::trim).collect();
    let find = |name: &str| {
        names
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                AppError::Validation(format!("URL manifest header is missing column '{name}'"))
            })
    };
    Ok(ManifestColumns {
        document_id: find("id")?,
        gutenberg_id: find("book_id")?,
        split: find("split")?,
        url: find("url")?,
    })
}

fn parse_row(line: &str, columns: &ManifestColumns) -> Result<UrlEntry, String> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let field = |index: usize, name: &str| {
        fields
            .get(index)
            .filter(|value| !value.is_empty())
            .map(|value| (*value).to_string())
            .ok_or_else(|| format!("missing '{name}' column"))
    };

    let split = field(columns.split, "split")?
        .parse::<Split>()
        .map_err(|err| err.to_string())?;

    Ok(UrlEntry {
        document_id: field(columns.document_id, "id")?,
        gutenberg_id: field(columns.gutenberg_id, "book_id")?,
        split,
        url: field(columns.url, "url")?,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_manifest(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write manifest");
        file
    }

    #[test]
    fn parses_rows_grouped_by_split() {
        let file = write_manifest(
            "split\tid\tbook_id\turl\n\
             train\tdoc-a\t11\thttps://www.gutenberg.org/files/11/11-h/11-h.htm\n\
             test\tdoc-b\t84\thttps://www.gutenberg.org/files/84/84-h/84-h.htm\n\
             train\tdoc-c\t2701\thttps://www.gutenberg.org/files/2701/2701-h/2701-h.htm\n",
        );

        let manifest = load_url_manifest(file.path()).expect("manifest");
        assert_eq!(manifest.get(&Split::Train).map(Vec::len), Some(2));
        assert_eq!(manifest.get(&Split::Test).map(Vec::len), Some(1));

        let train = manifest.get(&Split::Train).expect("train entries");
        assert_eq!(train.first().map(|e| e.gutenberg_id.as_str()), Some("11"));
        assert_eq!(train.first().map(|e| e.document_id.as_str()), Some("doc-a"));
    }

    #[test]
    fn skips_rows_with_missing_columns() {
        let file = write_manifest(
            "split\tid\tbook_id\turl\n\
             train\tdoc-a\t11\thttps://www.gutenberg.org/files/11/11-h/11-h.htm\n\
             train\tdoc-b\t84\n\
             nonsense\tdoc-c\t2701\thttps://example.org\n",
        );

        let manifest = load_url_manifest(file.path()).expect("manifest");
        assert_eq!(manifest.get(&Split::Train).map(Vec::len), Some(1));
    }

    #[test]
    fn rejects_manifest_without_required_header() {
        let file = write_manifest("split\tid\turl\ntrain\tdoc-a\thttps://example.org\n");
        assert!(load_url_manifest(file.path()).is_err());
    }
}
