//! Distribution shape and entropy.
//!
//! # Shape
//! Population moments of a series with mean μ and standard deviation σ:
//! - skewness = E[(X - μ)³] / σ³
//! - excess kurtosis = E[(X - μ)⁴] / σ⁴ - 3
//!
//! Both are undefined for fewer than two samples or a constant series.
//!
//! # Entropy
//! Shannon entropy in bits of the source distribution, p_i = count_i / N:
//! H = -Σ p_i log2(p_i). It is 0 for a single source and log2(k) for k
//! sources with equal counts, and undefined when nothing was observed.

use std::fmt;

use serde::Serialize;

/// Skewness and excess kurtosis of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Shape {
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

/// Two-pass population skewness and excess kurtosis.
pub fn skewness_kurtosis(series: &[f64]) -> Option<Shape> {
    if series.len() < 2 || is_constant(series) {
        return None;
    }

    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;

    let (m2, m3, m4) = series.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), x| {
        let d = x - mean;
        let d2 = d * d;
        (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
    });

    shape_from_central(m2 / n, m3 / n, m4 / n)
}

fn is_constant(series: &[f64]) -> bool {
    series.windows(2).all(|w| w[0] == w[1])
}

fn shape_from_central(m2: f64, m3: f64, m4: f64) -> Option<Shape> {
    if !(m2 > 0.0) {
        return None;
    }

    let shape = Shape {
        skewness: m3 / m2.powf(1.5),
        excess_kurtosis: m4 / (m2 * m2) - 3.0,
    };

    (shape.skewness.is_finite() && shape.excess_kurtosis.is_finite()).then_some(shape)
}

/// Mergeable power sums (count, Σx, Σx², Σx³, Σx⁴) of a series.
///
/// Shards accumulate independently and combine with [`PowerSums::merge`];
/// [`PowerSums::shape`] then yields the same moments as
/// [`skewness_kurtosis`] over the concatenated series, up to rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerSums {
    pub count: u64,
    pub sum: f64,
    pub sum2: f64,
    pub sum3: f64,
    pub sum4: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl FromIterator<f64> for PowerSums {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut sums = Self::default();
        for x in iter {
            sums.push(x);
        }
        sums
    }
}

impl PowerSums {
    pub fn push(&mut self, x: f64) {
        let x2 = x * x;
        self.count += 1;
        self.sum += x;
        self.sum2 += x2;
        self.sum3 += x2 * x;
        self.sum4 += x2 * x2;
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
        self.max = Some(self.max.map_or(x, |m| m.max(x)));
    }

    pub fn merge(&mut self, other: &PowerSums) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum2 += other.sum2;
        self.sum3 += other.sum3;
        self.sum4 += other.sum4;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn shape(&self) -> Option<Shape> {
        if self.count < 2 || self.min == self.max {
            return None;
        }

        let n = self.count as f64;
        let mu = self.sum / n;
        let (e1, e2, e3, e4) = (mu, self.sum2 / n, self.sum3 / n, self.sum4 / n);

        // Central moments from raw moments.
        let m2 = e2 - e1 * e1;
        let m3 = e3 - 3.0 * e1 * e2 + 2.0 * e1.powi(3);
        let m4 = e4 - 4.0 * e1 * e3 + 6.0 * e1 * e1 * e2 - 3.0 * e1.powi(4);

        shape_from_central(m2, m3, m4)
    }
}

/// Shannon entropy (bits) of a distribution given by raw counts.
pub fn shannon_entropy(counts: &[u64]) -> Option<f64> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return None;
    }
    let total = total as f64;

    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();

    // Normalizes the -0.0 produced by a single source.
    Some(h + 0.0)
}

/// Entropy of the source distribution alongside its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntropyReport {
    pub entropy_bits: Option<f64>,
    pub source_count: usize,
    /// log2 of the number of sources, `None` when there are none.
    pub max_entropy_bits: Option<f64>,
}

impl EntropyReport {
    pub fn from_counts(counts: &[u64]) -> Self {
        let source_count = counts.iter().filter(|&&c| c > 0).count();
        Self {
            entropy_bits: shannon_entropy(counts),
            source_count,
            max_entropy_bits: (source_count > 0).then(|| (source_count as f64).log2()),
        }
    }
}

/// Formats an optional statistic, writing `undefined` for `None`.
pub struct Stat(pub Option<f64>);

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "undefined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_series_has_zero_skew() {
        let shape = skewness_kurtosis(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(shape.skewness.abs() < 1e-12);
        // Uniform-like 5 points: m2 = 2, m4 = 6.8 -> 6.8 / 4 - 3 = -1.3
        assert!((shape.excess_kurtosis + 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_right_tail_has_positive_skew() {
        let shape = skewness_kurtosis(&[0.0, 0.0, 0.0, 0.0, 10.0]).unwrap();
        // m2 = 16, m3 = 96 -> 96 / 64 = 1.5
        assert!((shape.skewness - 1.5).abs() < 1e-12);
        let m4 = (4.0 * 16.0 + 8.0f64.powi(4)) / 5.0;
        assert!((shape.excess_kurtosis - (m4 / 256.0 - 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_shape_undefined_cases() {
        assert_eq!(skewness_kurtosis(&[]), None);
        assert_eq!(skewness_kurtosis(&[4.2]), None);
        assert_eq!(skewness_kurtosis(&[0.1, 0.1, 0.1]), None, "zero variance is undefined");
    }

    #[test]
    fn test_power_sums_merge_matches_two_pass() {
        let series = [0.0, 0.01, 0.5, 0.002, 3.0, 0.0, 0.2, 1.1, 0.07];
        let direct = skewness_kurtosis(&series).unwrap();

        let mut merged = series[..4].iter().copied().collect::<PowerSums>();
        merged.merge(&series[4..].iter().copied().collect::<PowerSums>());
        let combined = merged.shape().unwrap();

        assert_eq!(merged.count, series.len() as u64);
        assert!((combined.skewness - direct.skewness).abs() < 1e-9);
        assert!((combined.excess_kurtosis - direct.excess_kurtosis).abs() < 1e-9);
    }

    #[test]
    fn test_power_sums_constant_and_empty() {
        assert_eq!(PowerSums::default().shape(), None);
        assert_eq!(PowerSums::default().mean(), None);
        assert_eq!([2.0, 2.0, 2.0].iter().copied().collect::<PowerSums>().shape(), None);

        let mut left = [2.0].iter().copied().collect::<PowerSums>();
        left.merge(&PowerSums::default());
        assert_eq!(left.mean(), Some(2.0));
    }

    #[test]
    fn test_entropy_equal_counts() {
        let h = shannon_entropy(&[10, 10, 10, 10]).unwrap();
        assert_eq!(h, 2.0, "4 equal sources must give exactly 2 bits");
    }

    #[test]
    fn test_entropy_single_source_is_zero() {
        let h = shannon_entropy(&[42]).unwrap();
        assert_eq!(h, 0.0);
        assert!(h.is_sign_positive());
    }

    #[test]
    fn test_entropy_empty_is_undefined() {
        assert_eq!(shannon_entropy(&[]), None);
        assert_eq!(shannon_entropy(&[0, 0]), None);
    }

    #[test]
    fn test_entropy_relabeling_invariant() {
        let a = shannon_entropy(&[5, 1, 30, 7]).unwrap();
        let b = shannon_entropy(&[30, 7, 5, 1]).unwrap();
        assert!((a - b).abs() < 1e-12);
        assert!(a < 2.0, "unequal counts stay below log2(k)");
    }

    #[test]
    fn test_entropy_report() {
        let report = EntropyReport::from_counts(&[3, 3]);
        assert_eq!(report.entropy_bits, Some(1.0));
        assert_eq!(report.max_entropy_bits, Some(1.0));
        assert_eq!(report.source_count, 2);

        let empty = EntropyReport::from_counts(&[]);
        assert_eq!(empty.entropy_bits, None);
        assert_eq!(empty.max_entropy_bits, None);
    }

    #[test]
    fn test_stat_display() {
        assert_eq!(Stat(Some(1.5)).to_string(), "1.5");
        assert_eq!(Stat(None).to_string(), "undefined");
    }
}
