//! Pearson correlation over aligned prepared series.

use thiserror::Error;

use crate::align::align_inner;
use crate::domain::PreparedSeries;

/// Why a pair produced no correlation. The pair is skipped, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlignmentDegenerate {
    #[error("only {0} overlapping points")]
    TooFewPoints(usize),

    #[error("one side has zero variance over the overlap")]
    ZeroVariance,
}

/// Pearson correlation coefficient, clamped to `[-1, 1]`.
///
/// `None` for mismatched lengths, fewer than two points, a constant input,
/// or a non-finite result.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 || is_constant(x) || is_constant(y) {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 {
        return None;
    }
    let r = covariance / denominator;
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|v| *v == values[0])
}

/// Align `main` and `candidate` on shared timestamps and correlate.
pub fn correlate(main: &PreparedSeries, candidate: &PreparedSeries) -> Result<f64, AlignmentDegenerate> {
    let pair = align_inner(main.series(), candidate.series());
    if pair.len() < 2 {
        return Err(AlignmentDegenerate::TooFewPoints(pair.len()));
    }
    pearson(&pair.left, &pair.right).ok_or(AlignmentDegenerate::ZeroVariance)
}
