/// Cosine similarity between two vectors. Zero-norm vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Softmax over similarity scores. Subtracts the max before exponentiating
/// for numerical stability.
pub fn softmax_weights(similarities: &[f64]) -> Vec<f64> {
    if similarities.is_empty() {
        return Vec::new();
    }
    let max = similarities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = similarities.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    if total == 0.0 {
        return vec![0.0; similarities.len()];
    }
    exps.into_iter().map(|e| e / total).collect()
}

/// Round to a fixed number of decimal places (half away from zero).
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(-12.345, 2), -12.35);
        assert_eq!(round_to(100.0, 2), 100.0);
    }

    #[test]
    fn cosine_identity_is_one() {
        let v = vec![0.3_f32, -0.5, 0.8, 0.1];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let weights = softmax_weights(&[0.9, 0.5, 0.1]);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(weights[0] > weights[1] && weights[1] > weights[2]);
    }

    #[test]
    fn softmax_stable_for_large_inputs() {
        let weights = softmax_weights(&[1000.0, 999.0]);
        assert!(weights.iter().all(|w| w.is_finite()));
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn softmax_equal_scores_equal_weights() {
        let weights = softmax_weights(&[0.5, 0.5, 0.5, 0.5, 0.5]);
        for w in &weights {
            assert!((w - 0.2).abs() < 1e-9);
        }
    }
}
