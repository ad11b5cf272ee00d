//! Descriptive statistics over a windowed price series.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTOGRAM_BINS: usize = 20;
const GAUGE_MIN_HALF_RANGE_PCT: f64 = 5.0;
const GAUGE_RANGE_HEADROOM: f64 = 1.5;
const ZERO_VARIANCE_EPSILON: f64 = 1e-14;

/// Summary of a price window. Every field is zero for an empty window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub count: usize,
    pub last: f64,
    pub previous: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub skew: f64,
}

impl PriceStats {
    pub fn compute(prices: &[f64]) -> Self {
        let Some(&last) = prices.last() else {
            return Self::default();
        };

        let previous = if prices.len() > 1 {
            prices[prices.len() - 2]
        } else {
            last
        };
        let mean = mean(prices);
        let std_dev = sample_std_dev(prices, mean);
        let coefficient_of_variation = if mean != 0.0 {
            std_dev / mean * 100.0
        } else {
            0.0
        };
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            count: prices.len(),
            last,
            previous,
            mean,
            median: median(prices),
            std_dev,
            coefficient_of_variation,
            min,
            max,
            range: max - min,
            skew: sample_skew(prices, mean),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GaugeMode {
    PreviousValue,
    PercentChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaugeReading {
    pub mode: GaugeMode,
    pub value: f64,
    pub reference: f64,
    pub delta: f64,
    pub axis_min: f64,
    pub axis_max: f64,
}

impl GaugeReading {
    pub fn from_stats(stats: &PriceStats, mode: GaugeMode) -> Self {
        match mode {
            GaugeMode::PreviousValue => {
                let (mut axis_min, mut axis_max) = (stats.min, stats.max);
                if axis_min == axis_max {
                    axis_min -= 1.0;
                    axis_max += 1.0;
                }
                Self {
                    mode,
                    value: stats.last,
                    reference: stats.previous,
                    delta: stats.last - stats.previous,
                    axis_min,
                    axis_max,
                }
            }
            GaugeMode::PercentChange => {
                let delta_pct = relative_change_pct(stats.previous, stats.last);
                let half_range =
                    GAUGE_MIN_HALF_RANGE_PCT.max(delta_pct.abs() * GAUGE_RANGE_HEADROOM);
                Self {
                    mode,
                    value: delta_pct,
                    reference: 0.0,
                    delta: delta_pct,
                    axis_min: -half_range,
                    axis_max: half_range,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Successive percentage changes; the first price has no predecessor and
/// contributes nothing. Changes from a zero price are dropped.
pub fn percent_changes(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0] * 100.0)
        .collect()
}

/// Equal-width bins spanning `[min, max]` of the input; the last bin is
/// closed on the right.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|idx| HistogramBin {
            lower: min + width * idx as f64,
            upper: if idx + 1 == bins {
                max
            } else {
                min + width * (idx + 1) as f64
            },
            count: 0,
        })
        .collect();

    for value in values {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }

    out
}

pub fn relative_change_pct(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// ddof = 1; a single observation has no spread.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

// Adjusted Fisher-Pearson G1. Fewer than three points or a flat series gives 0.
fn sample_skew(values: &[f64], mean: f64) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    if m2.abs() < ZERO_VARIANCE_EPSILON {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>();
    let n = n as f64;
    (n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5))
}
