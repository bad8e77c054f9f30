//! Confidence interval estimation for the Monte Carlo driver's win-rate
//! estimate: an exact Wilson score interval for the i.i.d. (no momentum)
//! case, and an empirical bootstrap for the momentum extension where
//! points are no longer independent (spec §4.3, §9).

const Z_95: f64 = 1.959_963_984_540_054; // two-sided 95% normal quantile

/// Wilson score interval for a binomial proportion, exact for i.i.d. trials.
pub fn wilson_interval(wins: u64, n: u64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let n = n as f64;
    let p_hat = wins as f64 / n;
    let z2 = Z_95 * Z_95;
    let denom = 1.0 + z2 / n;
    let center = p_hat + z2 / (2.0 * n);
    let spread = Z_95 * ((p_hat * (1.0 - p_hat) / n) + z2 / (4.0 * n * n)).sqrt();
    let low = (center - spread) / denom;
    let high = (center + spread) / denom;
    (low.clamp(0.0, 1.0), high.clamp(0.0, 1.0))
}

/// Empirical bootstrap interval over per-rally win indicators, used when
/// momentum is enabled and rallies within a shard are no longer
/// independent. `bootstrap_samples` should be >= 200 per spec §4.3.
pub fn bootstrap_interval(
    wins: &[bool],
    bootstrap_samples: usize,
    rng: &mut impl rand::RngCore,
) -> (f64, f64) {
    use rand::Rng;
    if wins.is_empty() {
        return (0.0, 1.0);
    }
    let n = wins.len();
    let mut means = Vec::with_capacity(bootstrap_samples);
    for _ in 0..bootstrap_samples {
        let mut sum = 0u64;
        for _ in 0..n {
            let idx = rng.gen_range(0..n);
            if wins[idx] {
                sum += 1;
            }
        }
        means.push(sum as f64 / n as f64);
    }
    means.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let low_idx = ((bootstrap_samples as f64) * 0.025) as usize;
    let high_idx = (((bootstrap_samples as f64) * 0.975) as usize).min(bootstrap_samples - 1);
    (means[low_idx], means[high_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wilson_interval_contains_point_estimate() {
        let (low, high) = wilson_interval(10_000, 20_000);
        assert!(low < 0.5 && high > 0.5);
    }

    #[test]
    fn wilson_interval_narrows_with_more_samples() {
        let (low_small, high_small) = wilson_interval(500, 1_000);
        let (low_big, high_big) = wilson_interval(10_000, 20_000);
        assert!((high_big - low_big) < (high_small - low_small));
    }

    #[test]
    fn bootstrap_interval_reasonable_for_all_wins() {
        use rand::SeedableRng;
        let wins = vec![true; 200];
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let (low, high) = bootstrap_interval(&wins, 200, &mut rng);
        assert!(low > 0.9 && high <= 1.0);
    }
}
