//! Proxy answer-quality metrics: ROUGE-L and BLEU.
//!
//! Both metrics compare a generated answer (the *hypothesis*) with a
//! reference text, usually the concatenated retrieved context. They share
//! one tokenizer, [`tokenize`], so their scores are comparable.
//!
//! Neither metric ever fails: empty input on either side yields all-zero
//! scores. Every reported value is rounded to 4 decimal places.
//!
//! # Example
//!
//! ```rust
//! use tutor_harness_core::metrics::{compute_bleu, compute_rouge_l};
//!
//! let rouge = compute_rouge_l("the cat sat", "the cat sat");
//! assert_eq!(rouge.f1, 1.0);
//! assert_eq!(compute_bleu("the cat sat", "the cat sat").bleu, 1.0);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Default maximum n-gram order for [`compute_bleu`] (unigram + bigram).
pub const DEFAULT_BLEU_MAX_N: usize = 2;

/// ROUGE-L precision, recall and F1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RougeScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// BLEU score plus the per-order modified precisions (index 0 = unigrams).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BleuScore {
    pub bleu: f64,
    /// A `0.0` here is either a real zero precision, which zeroes `bleu`,
    /// or an order the hypothesis is too short to have, which is left out
    /// of the mean. `scored_orders` tells the two apart.
    pub precisions: Vec<f64>,
    /// Number of leading orders that entered the geometric mean. Orders
    /// at index `>= scored_orders` had no hypothesis n-grams.
    #[serde(default)]
    pub scored_orders: usize,
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static word pattern compiles"))
}

/// Lowercase the text and return its maximal runs of word characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Round to 4 decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Length of the longest common subsequence of two token sequences.
///
/// O(m·n) time, O(n) space: only the previous and current DP rows are kept.
fn lcs_length(x: &[String], y: &[String]) -> usize {
    if x.is_empty() || y.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; y.len() + 1];
    let mut curr = vec![0usize; y.len() + 1];
    for xi in x {
        for (j, yj) in y.iter().enumerate() {
            curr[j + 1] = if xi == yj {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[y.len()]
}

/// ROUGE-L between a hypothesis and a reference.
pub fn compute_rouge_l(hypothesis: &str, reference: &str) -> RougeScore {
    let hyp = tokenize(hypothesis);
    let reference = tokenize(reference);
    if hyp.is_empty() || reference.is_empty() {
        return RougeScore::default();
    }

    let lcs = lcs_length(&hyp, &reference) as f64;
    let precision = lcs / hyp.len() as f64;
    let recall = lcs / reference.len() as f64;
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    RougeScore {
        precision: round4(precision),
        recall: round4(recall),
        f1: round4(f1),
    }
}

fn count_ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// Unigram + bigram BLEU, see [`compute_bleu_n`].
pub fn compute_bleu(hypothesis: &str, reference: &str) -> BleuScore {
    compute_bleu_n(hypothesis, reference, DEFAULT_BLEU_MAX_N)
}

/// BLEU with clipped n-gram precisions for orders `1..=max_n`.
///
/// The score is the geometric mean of the precisions times the brevity
/// penalty `min(1, |hyp| / |ref|)`. A zero precision makes the whole
/// score zero (no smoothing). An order for which the hypothesis has no
/// n-grams at all (hypothesis shorter than `n`) is reported as `0.0` but
/// left out of the geometric mean, so a one-word answer compared with
/// itself still scores `1.0`, and `compute_bleu("photosynthesis",
/// "photosynthesis uses light")` scores `1.0 × 1/3 = 0.3333` rather than
/// `0`. Check [`BleuScore::scored_orders`] to tell such an order from a
/// real zero. `max_n` is clamped to at least 1.
pub fn compute_bleu_n(hypothesis: &str, reference: &str, max_n: usize) -> BleuScore {
    let max_n = max_n.max(1);
    let hyp = tokenize(hypothesis);
    let reference = tokenize(reference);
    if hyp.is_empty() || reference.is_empty() {
        return BleuScore {
            bleu: 0.0,
            precisions: vec![0.0; max_n],
            scored_orders: 0,
        };
    }

    let mut precisions = Vec::with_capacity(max_n);
    let mut log_sum = 0.0;
    let mut orders = 0usize;
    let mut any_zero = false;

    for n in 1..=max_n {
        let hyp_counts = count_ngrams(&hyp, n);
        let total: usize = hyp_counts.values().sum();
        if total == 0 {
            precisions.push(0.0);
            continue;
        }
        let ref_counts = count_ngrams(&reference, n);
        let clipped: usize = hyp_counts
            .iter()
            .map(|(gram, count)| (*count).min(ref_counts.get(gram).copied().unwrap_or(0)))
            .sum();

        let p = clipped as f64 / total as f64;
        precisions.push(p);
        orders += 1;
        if p == 0.0 {
            any_zero = true;
        } else {
            log_sum += p.ln();
        }
    }

    let geo_mean = if any_zero || orders == 0 {
        0.0
    } else {
        (log_sum / orders as f64).exp()
    };
    let brevity = (hyp.len() as f64 / reference.len() as f64).min(1.0);

    BleuScore {
        bleu: round4(geo_mean * brevity),
        precisions: precisions.into_iter().map(round4).collect(),
        scored_orders: orders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_drops_punctuation() {
        assert_eq!(
            tokenize("Hello, World! It's 2024."),
            vec!["hello", "world", "it", "s", "2024"]
        );
    }

    #[test]
    fn test_tokenize_unicode_words() {
        assert_eq!(tokenize("Ångström café"), vec!["ångström", "café"]);
    }

    #[test]
    fn test_lcs_length() {
        let x = tokenize("a b c d e");
        let y = tokenize("a c e f");
        assert_eq!(lcs_length(&x, &y), 3);
        assert_eq!(lcs_length(&x, &[]), 0);
    }

    #[test]
    fn test_rouge_self_match() {
        let s = "Gradient descent minimizes the loss function iteratively.";
        let r = compute_rouge_l(s, s);
        assert_eq!(r.precision, 1.0);
        assert_eq!(r.recall, 1.0);
        assert_eq!(r.f1, 1.0);
    }

    #[test]
    fn test_rouge_disjoint() {
        let r = compute_rouge_l("alpha beta", "gamma delta");
        assert_eq!(r, RougeScore::default());
    }

    #[test]
    fn test_rouge_empty_inputs() {
        assert_eq!(compute_rouge_l("", "anything").f1, 0.0);
        assert_eq!(compute_rouge_l("anything", "").f1, 0.0);
        assert_eq!(compute_rouge_l("...", "!!!").f1, 0.0);
    }

    #[test]
    fn test_rouge_partial() {
        // hyp: the cat sat (3), ref: the cat sat on the mat (6), lcs = 3
        let r = compute_rouge_l("the cat sat", "the cat sat on the mat");
        assert_eq!(r.precision, 1.0);
        assert_eq!(r.recall, 0.5);
        assert_eq!(r.f1, 0.6667);
    }

    #[test]
    fn test_bleu_self_match() {
        let s = "Mitochondria produce most of the cell's chemical energy.";
        assert_eq!(compute_bleu(s, s).bleu, 1.0);
        assert_eq!(compute_bleu(s, s).precisions, vec![1.0, 1.0]);
    }

    #[test]
    fn test_bleu_single_word_self_match() {
        let b = compute_bleu("photosynthesis", "photosynthesis");
        assert_eq!(b.bleu, 1.0);
        assert_eq!(b.precisions, vec![1.0, 0.0]);
        assert_eq!(b.scored_orders, 1);
    }

    #[test]
    fn test_bleu_short_hypothesis_order_is_excluded_not_zero() {
        let b = compute_bleu("photosynthesis", "photosynthesis uses light");
        assert_eq!(b.precisions, vec![1.0, 0.0]);
        assert_eq!(b.scored_orders, 1);
        // unigram precision 1.0 times brevity penalty 1/3
        assert_eq!(b.bleu, 0.3333);

        let zeroed = compute_bleu("cat the", "the cat");
        assert_eq!(zeroed.precisions, vec![1.0, 0.0]);
        assert_eq!(zeroed.scored_orders, 2);
        assert_eq!(zeroed.bleu, 0.0);
    }

    #[test]
    fn test_bleu_disjoint() {
        let b = compute_bleu("alpha beta", "gamma delta");
        assert_eq!(b.bleu, 0.0);
        assert_eq!(b.precisions, vec![0.0, 0.0]);
    }

    #[test]
    fn test_bleu_empty_inputs() {
        assert_eq!(compute_bleu("", "ref text").bleu, 0.0);
        assert_eq!(compute_bleu("hyp text", "").precisions, vec![0.0, 0.0]);
        assert_eq!(compute_bleu_n("", "", 4).precisions.len(), 4);
    }

    #[test]
    fn test_bleu_clipping() {
        // hyp unigrams: the x3; ref has "the" x2 -> clipped 2/3
        let b = compute_bleu_n("the the the", "the cat the", 1);
        assert_eq!(b.precisions, vec![0.6667]);
        assert_eq!(b.bleu, 0.6667);
    }

    #[test]
    fn test_bleu_brevity_penalty() {
        // all n-grams match, hyp half as long as ref
        let b = compute_bleu("the cat", "the cat sat down");
        assert_eq!(b.precisions, vec![1.0, 1.0]);
        assert_eq!(b.bleu, 0.5);
    }

    #[test]
    fn test_bleu_zero_bigram_precision_zeroes_score() {
        // unigrams all match but no bigram does
        let b = compute_bleu("cat the", "the cat");
        assert_eq!(b.precisions, vec![1.0, 0.0]);
        assert_eq!(b.bleu, 0.0);
    }

    #[test]
    fn test_bleu_geometric_mean() {
        // unigram 3/4, bigram 1/3, bp = 1 -> sqrt(0.25) = 0.5
        let b = compute_bleu("a b x c", "a b c d");
        assert_eq!(b.precisions, vec![0.75, 0.3333]);
        assert_eq!(b.bleu, 0.5);
    }
}
