use common::models::PredictionRecord;
use unicode_normalization::UnicodeNormalization;

/// SQuAD-style answer normalization: NFKD fold, lowercase, punctuation
/// stripped, English articles removed, whitespace collapsed.
pub fn normalize_answer(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|ch| !unicode_normalization::char::is_combining_mark(*ch))
        .collect();

    let lowered: String = folded
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();

    lowered
        .split_whitespace()
        .filter(|token| !matches!(*token, "a" | "an" | "the"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> Vec<String> {
    normalize_answer(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn as_score(hit: bool) -> f64 {
    if hit {
        1.0
    } else {
        0.0
    }
}

/// 1.0 when the normalized strings are identical, otherwise 0.0.
pub fn exact_match(prediction: &str, reference: &str) -> f64 {
    as_score(normalize_answer(prediction) == normalize_answer(reference))
}

/// Bag-of-tokens F1 between prediction and reference.
pub fn token_f1(prediction: &str, reference: &str) -> f64 {
    let pred_tokens = tokens(prediction);
    let ref_tokens = tokens(reference);
    if pred_tokens.is_empty() || ref_tokens.is_empty() {
        return as_score(pred_tokens == ref_tokens);
    }

    let overlap = multiset_overlap(&pred_tokens, &ref_tokens);
    if overlap == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / pred_tokens.len() as f64;
    let recall = overlap as f64 / ref_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// ROUGE-L F-measure: longest common subsequence over normalized tokens.
pub fn rouge_l(prediction: &str, reference: &str) -> f64 {
    let pred_tokens = tokens(prediction);
    let ref_tokens = tokens(reference);
    if pred_tokens.is_empty() || ref_tokens.is_empty() {
        return as_score(pred_tokens == ref_tokens);
    }

    let lcs = lcs_length(&pred_tokens, &ref_tokens);
    if lcs == 0 {
        return 0.0;
    }
    let precision = lcs as f64 / pred_tokens.len() as f64;
    let recall = lcs as f64 / ref_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// METEOR with the exact-match alignment stage only (no stemming or
/// synonyms): recall-weighted harmonic mean (alpha = 0.9) times a chunk
/// fragmentation penalty (gamma = 0.5, beta = 3).
pub fn meteor(prediction: &str, reference: &str) -> f64 {
    const ALPHA: f64 = 0.9;
    const BETA: f64 = 3.0;
    const GAMMA: f64 = 0.5;

    let pred_tokens = tokens(prediction);
    let ref_tokens = tokens(reference);
    if pred_tokens.is_empty() || ref_tokens.is_empty() {
        return as_score(pred_tokens == ref_tokens);
    }

    let alignment = align_unigrams(&pred_tokens, &ref_tokens);
    let matches = alignment.len();
    if matches == 0 {
        return 0.0;
    }

    let precision = matches as f64 / pred_tokens.len() as f64;
    let recall = matches as f64 / ref_tokens.len() as f64;
    let f_mean = precision * recall / (ALPHA * precision + (1.0 - ALPHA) * recall);

    let chunks = count_chunks(&alignment);
    let penalty = GAMMA * (chunks as f64 / matches as f64).powf(BETA);
    f_mean * (1.0 - penalty)
}

fn multiset_overlap(left: &[String], right: &[String]) -> usize {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for token in right {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let mut overlap = 0usize;
    for token in left {
        if let Some(count) = counts.get_mut(token.as_str()) {
            if *count > 0 {
                *count -= 1;
                overlap += 1;
            }
        }
    }
    overlap
}

fn lcs_length(left: &[String], right: &[String]) -> usize {
    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];
    for left_token in left {
        for (j, right_token) in right.iter().enumerate() {
            current[j + 1] = if left_token == right_token {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

/// Greedy in-order alignment of prediction unigrams to reference
/// positions; each reference token is used at most once.
fn align_unigrams(pred_tokens: &[String], ref_tokens: &[String]) -> Vec<(usize, usize)> {
    let mut used = vec![false; ref_tokens.len()];
    let mut alignment = Vec::new();
    for (pred_idx, token) in pred_tokens.iter().enumerate() {
        let matched = ref_tokens
            .iter()
            .enumerate()
            .position(|(ref_idx, candidate)| !used[ref_idx] && candidate == token);
        if let Some(ref_idx) = matched {
            used[ref_idx] = true;
            alignment.push((pred_idx, ref_idx));
        }
    }
    alignment
}

/// Number of maximal runs of adjacent matches on both sides.
fn count_chunks(alignment: &[(usize, usize)]) -> usize {
    let mut chunks = 0usize;
    let mut previous: Option<(usize, usize)> = None;
    for &(pred_idx, ref_idx) in alignment {
        let contiguous = previous
            .is_some_and(|(prev_pred, prev_ref)| pred_idx == prev_pred + 1 && ref_idx == prev_ref + 1);
        if !contiguous {
            chunks += 1;
        }
        previous = Some((pred_idx, ref_idx));
    }
    chunks
}

/// Per-entry scores, each taken as the maximum over the references.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryScores {
    pub exact_match: f64,
    pub token_f1: f64,
    pub rouge_l: f64,
    pub meteor: f64,
}

pub fn max_over_references(scorer: fn(&str, &str) -> f64, prediction: &str, answers: &[String]) -> f64 {
    answers
        .iter()
        .map(|answer| scorer(prediction, answer))
        .fold(0.0, f64::max)
}

pub fn score_entry(entry: &PredictionRecord) -> EntryScores {
    EntryScores {
        exact_match: max_over_references(exact_match, &entry.prediction, &entry.answers),
        token_f1: max_over_references(token_f1, &entry.prediction, &entry.answers),
        rouge_l: max_over_references(rouge_l, &entry.prediction, &entry.answers),
        meteor: max_over_references(meteor, &entry.prediction, &entry.answers),
    }
}

/// Corpus-level averages over the scored entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusScores {
    pub exact_match: f64,
    pub token_f1: f64,
    pub rouge_l: f64,
    pub meteor: f64,
    pub entries: usize,
}

pub fn aggregate(scores: &[EntryScores]) -> CorpusScores {
    if scores.is_empty() {
        return CorpusScores::default();
    }
    let count = scores.len() as f64;
    CorpusScores {
        exact_match: scores.iter().map(|s| s.exact_match).sum::<f64>() / count,
        token_f1: scores.iter().map(|s| s.token_f1).sum::<f64>() / count,
        rouge_l: scores.iter().map(|s| s.rouge_l).sum::<f64>() / count,
        meteor: scores.iter().map(|s| s.meteor).sum::<f64>() / count,
        entries: scores.len(),
    }
}
