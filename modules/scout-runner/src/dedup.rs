//! Embedding-based deduplication against a scout's recent findings.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use scout_common::RecentFinding;

/// Cosine similarity at or above this marks a run as a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub execution_id: Uuid,
    pub similarity: f64,
    pub summary_text: String,
    pub completed_at: DateTime<Utc>,
}

/// Cosine similarity in [-1, 1]. A zero-norm vector yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Compare the new embedding against each recent finding and return the
/// best match at or above the threshold. Findings whose vector length
/// differs from the new embedding's are skipped (and logged), not treated
/// as zero-similarity.
pub fn find_duplicate(embedding: &[f32], recent: &[RecentFinding]) -> Option<DuplicateMatch> {
    let mut best: Option<DuplicateMatch> = None;

    for finding in recent {
        if finding.embedding.len() != embedding.len() {
            warn!(
                execution_id = %finding.execution_id,
                expected = embedding.len(),
                actual = finding.embedding.len(),
                "Skipping finding with mismatched embedding dimension"
            );
            continue;
        }

        let similarity = cosine_similarity(embedding, &finding.embedding);
        if similarity < DUPLICATE_THRESHOLD {
            continue;
        }
        if best.as_ref().is_none_or(|b| similarity > b.similarity) {
            best = Some(DuplicateMatch {
                execution_id: finding.execution_id,
                similarity,
                summary_text: finding.summary_text.clone(),
                completed_at: finding.completed_at,
            });
        }
    }

    best
}

/// Human-readable annotation appended to a duplicate run's response.
pub fn duplicate_note(m: &DuplicateMatch) -> String {
    format!(
        "\n\n---\nNote: this finding closely resembles a previous result from {}: \
         \"{}\" (similarity {:.0}%)",
        m.completed_at.format("%Y-%m-%d"),
        m.summary_text,
        m.similarity * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_common::EMBEDDING_DIM;

    fn finding(embedding: Vec<f32>, summary: &str) -> RecentFinding {
        RecentFinding {
            execution_id: Uuid::new_v4(),
            summary_text: summary.to_string(),
            embedding,
            completed_at: Utc::now(),
        }
    }

    /// A unit vector with a single non-zero component, padded to full
    /// dimension so it passes the length check.
    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[i] = 1.0;
        v
    }

    fn blend(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
        a.iter().zip(b).map(|(x, y)| x * (1.0 - t) + y * t).collect()
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = axis(0);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!(cosine_similarity(&axis(0), &axis(1)).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_have_similarity_minus_one() {
        let v = axis(0);
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = blend(&axis(0), &axis(1), 0.3);
        let b = blend(&axis(0), &axis(2), 0.6);
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn zero_norm_yields_zero() {
        let zero = vec![0.0; EMBEDDING_DIM];
        assert_eq!(cosine_similarity(&zero, &axis(0)), 0.0);
        assert_eq!(cosine_similarity(&axis(0), &zero), 0.0);
    }

    #[test]
    fn near_identical_finding_is_a_duplicate() {
        let new = axis(0);
        let old = blend(&axis(0), &axis(1), 0.05);
        let found = find_duplicate(&new, &[finding(old, "previous")]).unwrap();
        assert!(found.similarity >= DUPLICATE_THRESHOLD);
        assert_eq!(found.summary_text, "previous");
    }

    #[test]
    fn dissimilar_finding_is_not_a_duplicate() {
        assert!(find_duplicate(&axis(0), &[finding(axis(1), "other topic")]).is_none());
    }

    #[test]
    fn picks_the_argmax_match() {
        let new = axis(0);
        let close = blend(&axis(0), &axis(1), 0.02);
        let closer = axis(0);
        let found = find_duplicate(
            &new,
            &[finding(close, "close"), finding(closer, "closest")],
        )
        .unwrap();
        assert_eq!(found.summary_text, "closest");
    }

    #[test]
    fn mismatched_dimension_is_skipped_not_zero() {
        // A short vector that would otherwise be an exact match.
        let new = axis(0);
        let short = vec![1.0, 0.0, 0.0];
        assert!(find_duplicate(&new, &[finding(short, "wrong dim")]).is_none());
    }

    #[test]
    fn decision_is_monotone_in_threshold() {
        // A pair just under the threshold stays non-duplicate; nudging the
        // blend closer flips it. Guards against off-by-one on >=.
        let new = axis(0);
        let t_under = 0.4; // cos ~ 0.83
        let t_over = 0.3; // cos ~ 0.92
        let under = blend(&axis(0), &axis(1), t_under);
        let over = blend(&axis(0), &axis(1), t_over);
        assert!(cosine_similarity(&new, &under) < DUPLICATE_THRESHOLD);
        assert!(find_duplicate(&new, &[finding(under, "under")]).is_none());
        assert!(cosine_similarity(&new, &over) >= DUPLICATE_THRESHOLD);
        assert!(find_duplicate(&new, &[finding(over, "over")]).is_some());
    }

    #[test]
    fn note_mentions_date_summary_and_percentage() {
        let m = DuplicateMatch {
            execution_id: Uuid::new_v4(),
            similarity: 0.91,
            summary_text: "Model X released".to_string(),
            completed_at: "2026-07-01T12:00:00Z".parse().unwrap(),
        };
        let note = duplicate_note(&m);
        assert!(note.contains("2026-07-01"));
        assert!(note.contains("Model X released"));
        assert!(note.contains("91%"));
    }
}
