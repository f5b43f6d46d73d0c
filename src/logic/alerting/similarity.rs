//! Title similarity used for alert deduplication

/// Similarity of two strings in [0, 1]; 1 means identical
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))` over case-folded, trimmed input
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinSimilarity;

impl TextSimilarity for LevenshteinSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.trim().to_lowercase().chars().collect();
        let b: Vec<char> = b.trim().to_lowercase().chars().collect();

        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

/// Edit distance, two-row dynamic programming
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
