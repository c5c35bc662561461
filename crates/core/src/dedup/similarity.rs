//! Name normalization and string similarity for duplicate detection.

/// Filler words stripped before comparison; they carry no discriminating
/// signal ("Evening Run Workout" vs "Evening Run").
const FILLER_WORDS: [&str; 4] = ["workout", "exercise", "training", "session"];

/// Normalize an exercise name for comparison: lowercase, punctuation to
/// spaces, whitespace collapsed, filler words removed.
pub fn normalize_name(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .filter(|word| !FILLER_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classic Levenshtein edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate().take(m + 1) {
        row[0] = i;
    }
    for (j, val) in dp[0].iter_mut().enumerate().take(n + 1) {
        *val = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

/// Normalized similarity between two exercise names, in [0,1].
///
/// Computed as `1 - distance / max_length` over the normalized forms.
/// Symmetric: `name_similarity(a, b) == name_similarity(b, a)`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_name(a);
    let norm_b = normalize_name(b);

    if norm_a.is_empty() && norm_b.is_empty() {
        return 1.0;
    }
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }

    let max_len = norm_a.chars().count().max(norm_b.chars().count());
    let dist = levenshtein(&norm_a, &norm_b);
    1.0 - dist as f64 / max_len as f64
}
