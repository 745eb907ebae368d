//! Claim Text Utilities
//!
//! Normalization and similarity helpers shared by clustering and
//! outcome-to-origin matching. All comparisons in the pipeline go through
//! these functions so the two sides of a match see the same transformation.

use std::collections::HashSet;

/// Normalize claim text for comparison: lowercase, strip punctuation,
/// collapse runs of whitespace, then truncate to `max_len` characters.
pub fn normalize_claim(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len));
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            // Punctuation, whitespace, and symbols all collapse to one space
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    truncate_chars(&out, max_len)
}

/// Truncate a string to at most `max_len` characters on a char boundary.
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    text.chars().take(max_len).collect()
}

/// Token-set Jaccard similarity between two already-normalized strings.
/// Returns 0.0 when both sides are empty.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Bidirectional containment test on normalized prefixes. Each side is
/// normalized and truncated to `prefix_len`; the texts match if either
/// prefix contains the other. Empty prefixes never match.
pub fn prefix_overlap(a: &str, b: &str, prefix_len: usize) -> bool {
    let pa = normalize_claim(a, prefix_len);
    let pb = normalize_claim(b, prefix_len);
    if pa.is_empty() || pb.is_empty() {
        return false;
    }
    pa.contains(&pb) || pb.contains(&pa)
}
