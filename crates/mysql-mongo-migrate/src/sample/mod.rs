//! Lightweight-coreset sampling for cheap validation.
//!
//! Reduces an O(n) full-chunk comparison to an O(k) sample while keeping the
//! sample statistically representative: rows far from the chunk centroid are
//! oversampled so outliers that uniform sampling would miss stay visible.
//!
//! The weight of row `x` in a chunk of size `n` is
//! `q(x) = 0.5/n + 0.5 * d(x, mean)^2 / sum(d^2)`, the lightweight-coreset
//! distribution. Positions are drawn without replacement, so the requested
//! sample size is never silently reduced by collisions.

use chrono::Datelike;
use rand::Rng;

use crate::core::value::{Batch, SqlValue};

/// Sampler behavior knobs.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Chunk size threshold: batches smaller than this are validated in
    /// full, sampling only pays off at chunk scale.
    pub chunk_size: usize,

    /// Fraction of a full-size chunk to sample.
    pub sample_percentage: f64,
}

/// Select the row positions of `batch` to validate.
///
/// Batches below the chunk threshold are returned whole (full coverage is
/// cheaper than sampling overhead for small batches); full-size chunks are
/// reduced to `round(n * sample_percentage)` positions by the lightweight
/// coreset. Positions are returned sorted ascending.
pub fn sample_positions<R: Rng>(batch: &Batch, config: &SamplerConfig, rng: &mut R) -> Vec<usize> {
    let n = batch.len();
    if n < config.chunk_size {
        return (0..n).collect();
    }

    let k = (n as f64 * config.sample_percentage).round() as usize;
    lightweight_coreset(&feature_matrix(batch), k, rng)
}

/// Draw `k` distinct row positions weighted by distance to the mean.
///
/// Uses exponential-key weighted reservoir selection (Efraimidis-Spirakis):
/// each row gets key `ln(u) / w` and the `k` largest keys win. Exactly
/// `min(k, n)` positions are returned, sorted ascending. Deterministic up to
/// the randomness source; seed the RNG for reproducible samples.
pub fn lightweight_coreset<R: Rng>(features: &[Vec<f64>], k: usize, rng: &mut R) -> Vec<usize> {
    let n = features.len();
    if k == 0 || n == 0 {
        return Vec::new();
    }
    if k >= n {
        return (0..n).collect();
    }

    let weights = coreset_weights(features);

    let mut keyed: Vec<(f64, usize)> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            (u.ln() / w, i)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut chosen: Vec<usize> = keyed.into_iter().take(k).map(|(_, i)| i).collect();
    chosen.sort_unstable();
    chosen
}

/// Per-row lightweight-coreset weights: base term plus distance term.
///
/// Every row keeps nonzero probability through the `0.5/n` base weight; the
/// distance term oversamples rows far from the centroid. Degenerate chunks
/// (all rows identical) collapse to the uniform distribution.
fn coreset_weights(features: &[Vec<f64>]) -> Vec<f64> {
    let n = features.len();
    let dims = features.first().map(Vec::len).unwrap_or(0);

    let mut mean = vec![0.0; dims];
    for row in features {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let dist_sq: Vec<f64> = features
        .iter()
        .map(|row| {
            row.iter()
                .zip(&mean)
                .map(|(v, m)| (v - m) * (v - m))
                .sum::<f64>()
        })
        .collect();

    let total: f64 = dist_sq.iter().sum();
    let base = 0.5 / n as f64;

    if total > 0.0 {
        dist_sq.iter().map(|d| base + 0.5 * d / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Encode a batch into the numeric feature space used for distances.
fn feature_matrix(batch: &Batch) -> Vec<Vec<f64>> {
    batch
        .rows
        .iter()
        .map(|row| row.iter().map(encode_feature).collect())
        .collect()
}

/// Stable numeric encoding of one value.
///
/// Numerics and temporals map to their natural magnitude; text and binary
/// map through FNV-1a into [0, 1]. No randomness: the same input always
/// produces the same features.
fn encode_feature(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Null => 0.0,
        SqlValue::Bool(v) => f64::from(*v),
        SqlValue::I64(v) => *v as f64,
        SqlValue::F64(v) => *v,
        SqlValue::Decimal(d) => {
            use rust_decimal::prelude::ToPrimitive;
            d.to_f64().unwrap_or_else(|| hash_unit(d.to_string().as_bytes()))
        }
        SqlValue::Text(s) => hash_unit(s.as_bytes()),
        SqlValue::Bytes(b) => hash_unit(b),
        SqlValue::Date(d) => f64::from(d.num_days_from_ce()),
        SqlValue::Time(t) => {
            use chrono::Timelike;
            f64::from(t.num_seconds_from_midnight())
        }
        SqlValue::DateTime(dt) => dt.and_utc().timestamp() as f64,
    }
}

/// FNV-1a scaled into [0, 1].
fn hash_unit(bytes: &[u8]) -> f64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as f64 / u64::MAX as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn int_batch(n: usize) -> Batch {
        Batch {
            columns: Arc::new(vec!["id".into(), "amount".into()]),
            pk_indexes: vec![0],
            rows: (0..n)
                .map(|i| vec![SqlValue::I64(i as i64), SqlValue::I64((i % 7) as i64)])
                .collect(),
            is_last: true,
        }
    }

    fn config() -> SamplerConfig {
        SamplerConfig {
            chunk_size: 100,
            sample_percentage: 0.2,
        }
    }

    #[test]
    fn test_small_batch_bypasses_sampler() {
        let batch = int_batch(50);
        let mut rng = SmallRng::seed_from_u64(1);
        let positions = sample_positions(&batch, &config(), &mut rng);
        assert_eq!(positions, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_chunk_is_sampled_to_k() {
        let batch = int_batch(100);
        let mut rng = SmallRng::seed_from_u64(1);
        let positions = sample_positions(&batch, &config(), &mut rng);
        assert_eq!(positions.len(), 20); // round(100 * 0.2)

        // Distinct and in range
        let mut deduped = positions.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), positions.len());
        assert!(positions.iter().all(|&p| p < 100));
    }

    #[test]
    fn test_same_seed_same_sample() {
        let batch = int_batch(200);
        let mut rng_a = SmallRng::seed_from_u64(99);
        let mut rng_b = SmallRng::seed_from_u64(99);
        assert_eq!(
            sample_positions(&batch, &config(), &mut rng_a),
            sample_positions(&batch, &config(), &mut rng_b)
        );
    }

    #[test]
    fn test_identical_rows_fall_back_to_uniform() {
        let features = vec![vec![3.0, 3.0]; 50];
        let mut rng = SmallRng::seed_from_u64(5);
        let positions = lightweight_coreset(&features, 10, &mut rng);
        assert_eq!(positions.len(), 10);
    }

    #[test]
    fn test_outliers_are_oversampled() {
        // 99 near-identical rows plus one far outlier; the outlier holds
        // roughly half the probability mass and should appear in almost
        // every draw.
        let mut features: Vec<Vec<f64>> = (0..99).map(|i| vec![(i % 3) as f64]).collect();
        features.push(vec![1.0e6]);

        let mut hits = 0;
        for seed in 0..50 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let positions = lightweight_coreset(&features, 10, &mut rng);
            if positions.contains(&99) {
                hits += 1;
            }
        }
        assert!(hits > 40, "outlier sampled only {}/50 times", hits);
    }

    #[test]
    fn test_k_at_least_n_returns_everything() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(lightweight_coreset(&features, 10, &mut rng), vec![0, 1, 2]);
    }

    #[test]
    fn test_feature_encoding_is_stable() {
        let a = encode_feature(&SqlValue::Text("payment".into()));
        let b = encode_feature(&SqlValue::Text("payment".into()));
        assert_eq!(a, b);
        assert!(a >= 0.0 && a <= 1.0);
        assert_eq!(encode_feature(&SqlValue::I64(42)), 42.0);
        assert_eq!(encode_feature(&SqlValue::Null), 0.0);
    }
}
