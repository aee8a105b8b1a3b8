use common::error::AppError;
use dom_smoothie::{Readability, TextMode};
use tracing::warn;

/// Result of cleaning one book. When either boilerplate marker is missing
/// the text passes through unchanged and the book is flagged for manual
/// review instead of being silently truncated.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub text: String,
    pub start_marker_found: bool,
    pub end_marker_found: bool,
}

impl CleanOutcome {
    pub fn needs_review(&self) -> bool {
        !self.start_marker_found || !self.end_marker_found
    }
}

/// Full cleaning pass: markup removal, boilerplate stripping, whitespace
/// normalization. Idempotent on its own output.
pub fn clean_book(raw: &str) -> Result<CleanOutcome, AppError> {
    let text = extract_raw_text(raw)?;
    let stripped = strip_boilerplate(&text);
    Ok(CleanOutcome {
        text: normalize_whitespace(&stripped.text),
        ..stripped
    })
}

/// Turn a raw Gutenberg payload into plain text. HTML pages go through the
/// readability parser; a parse failure falls back to tag stripping rather
/// than losing the book. Plain-text payloads pass through untouched.
pub fn extract_raw_text(raw: &str) -> Result<String, AppError> {
    if !looks_like_html(raw) {
        return Ok(raw.to_string());
    }

    let config = dom_smoothie::Config {
        text_mode: TextMode::Formatted,
        ..Default::default()
    };
    match Readability::new(raw.to_string(), None, Some(config))
        .and_then(|mut readability| readability.parse())
    {
        Ok(article) => Ok(article.text_content.to_string()),
        Err(err) => {
            warn!(error = %err, "Readability parse failed, falling back to tag stripping");
            Ok(strip_tags(raw))
        }
    }
}

fn looks_like_html(raw: &str) -> bool {
    let head = raw.get(..4096.min(raw.len())).unwrap_or(raw);
    let lowered = head.to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<!doctype") || lowered.contains("<body")
}

/// Minimal tag stripper used when the readability parser rejects a page.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                if in_tag {
                    in_tag = false;
                } else {
                    out.push(ch);
                }
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    for (entity, replacement) in [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&nbsp;", " "),
    ] {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Remove the standard Project Gutenberg header/footer boilerplate.
///
/// The start and end markers are full lines of the shape
/// `*** START OF THIS PROJECT GUTENBERG EBOOK ... ***`; Gutenberg files vary
/// in THIS/THE, title suffixes and asterisk counts, so matching happens on
/// the asterisk-trimmed, case-folded core of the line. Missing markers leave
/// the text unchanged and set the review flags.
pub fn strip_boilerplate(text: &str) -> CleanOutcome {
    let lines: Vec<&str> = text.lines().collect();

    let start = lines.iter().position(|line| is_start_marker(line));
    let end = match start {
        Some(start_idx) => lines
            .iter()
            .skip(start_idx.saturating_add(1))
            .rposition(|line| is_end_marker(line))
            .map(|offset| start_idx.saturating_add(1).saturating_add(offset)),
        None => None,
    };

    match (start, end) {
        (Some(start_idx), Some(end_idx)) => {
            let body = lines
                .get(start_idx.saturating_add(1)..end_idx)
                .unwrap_or(&[])
                .join("\n");
            CleanOutcome {
                text: body,
                start_marker_found: true,
                end_marker_found: true,
            }
        }
        _ => CleanOutcome {
            text: text.to_string(),
            start_marker_found: start.is_some(),
            end_marker_found: false,
        },
    }
}

fn marker_core(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if !trimmed.starts_with('*') {
        return None;
    }
    Some(
        trimmed
            .trim_matches(|c: char| c == '*' || c.is_whitespace())
            .to_ascii_uppercase(),
    )
}

fn is_start_marker(line: &str) -> bool {
    marker_core(line).is_some_and(|core| {
        core.starts_with("START OF") && core.contains("PROJECT GUTENBERG")
    })
}

fn is_end_marker(line: &str) -> bool {
    marker_core(line).is_some_and(|core| {
        core == "END" || (core.starts_with("END OF") && core.contains("PROJECT GUTENBERG"))
    })
}

/// Collapse redundant whitespace: trailing spaces go, runs of spaces and
/// tabs become one space, runs of blank lines become a single blank line.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    let mut wrote_line = false;

    for line in text.lines() {
        let collapsed = collapse_inline_whitespace(line);
        if collapsed.is_empty() {
            pending_blank = wrote_line;
            continue;
        }
        if wrote_line {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        out.push_str(&collapsed);
        wrote_line = true;
        pending_blank = false;
    }

    out
}

fn collapse_inline_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = true;
    for ch in line.chars() {
        if ch == ' ' || ch == '\t' || ch == '\u{a0}' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "The Project Gutenberg eBook of Alice\n\
        Produced by volunteers.\n\
        *** START OF THIS PROJECT GUTENBERG EBOOK ALICE'S ADVENTURES ***\n\
        Chapter I.\n\
        \n\
        Down the rabbit hole went Alice.\n\
        *** END OF THIS PROJECT GUTENBERG EBOOK ALICE'S ADVENTURES ***\n\
        End of the Project Gutenberg eBook.\n";

    #[test]
    fn strips_header_and_footer() {
        let outcome = strip_boilerplate(SAMPLE);
        assert!(outcome.start_marker_found);
        assert!(outcome.end_marker_found);
        assert!(outcome.text.contains("Down the rabbit hole"));
        assert!(!outcome.text.contains("START OF"));
        assert!(!outcome.text.contains("END OF"));
        assert!(!outcome.text.contains("Produced by volunteers"));
        assert!(!outcome.text.contains("End of the Project Gutenberg"));
    }

    #[test]
    fn accepts_bare_end_marker() {
        let text = "preamble\n\
            *** START OF THIS PROJECT GUTENBERG EBOOK ***\n\
            The story itself.\n\
            *** END ***\n\
            license text\n";
        let outcome = strip_boilerplate(text);
        assert!(outcome.start_marker_found);
        assert!(outcome.end_marker_found);
        assert_eq!(outcome.text, "The story itself.");
    }

    #[test]
    fn missing_markers_pass_text_through_flagged() {
        let text = "Just a plain narrative without any markers.\nSecond line.";
        let outcome = strip_boilerplate(text);
        assert!(!outcome.start_marker_found);
        assert!(!outcome.end_marker_found);
        assert!(outcome.needs_review());
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn start_without_end_is_not_truncated() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***\nCall me Ishmael.";
        let outcome = strip_boilerplate(text);
        assert!(outcome.start_marker_found);
        assert!(!outcome.end_marker_found);
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn normalization_collapses_whitespace() {
        let text = "Call  me \t Ishmael.   \n\n\n\nSome years ago.\n";
        let normalized = normalize_whitespace(text);
        assert_eq!(normalized, "Call me Ishmael.\n\nSome years ago.");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let outcome = clean_book(SAMPLE).expect("clean");
        let again = clean_book(&outcome.text).expect("clean twice");
        assert_eq!(again.text, outcome.text);
    }

    #[test]
    fn plain_text_passes_through_extraction() {
        let text = "No markup here, just prose.";
        assert_eq!(extract_raw_text(text).expect("extract"), text);
    }

    #[test]
    fn tag_stripper_drops_markup_and_decodes_entities() {
        let html = "<p>Alice &amp; the <b>White Rabbit</b></p>";
        assert_eq!(strip_tags(html), "Alice & the White Rabbit");
    }
}
