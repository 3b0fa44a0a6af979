//! Piecewise-linear interpolation of impact curves, optionally in log space.
//!
//! Return-period curves are close to power laws, so they are usually fitted
//! with both axes log10-transformed (`InterpolationOptions::log_log`).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct InterpolationOptions {
    pub log_x: bool,
    pub log_y: bool,
    /// Training points with `x <= x_threshold` are dropped.
    pub x_threshold: Option<f64>,
    /// Training points with `y <= y_threshold` are dropped.
    pub y_threshold: Option<f64>,
    /// Extend the end segments linearly instead of using the fallbacks.
    pub extrapolation: bool,
    /// Returned for queries above the training range when not extrapolating.
    pub y_asymptotic: f64,
}

impl Default for InterpolationOptions {
    fn default() -> Self {
        Self {
            log_x: false,
            log_y: false,
            x_threshold: None,
            y_threshold: None,
            extrapolation: false,
            y_asymptotic: f64::NAN,
        }
    }
}

impl InterpolationOptions {
    /// Log-log fit, no extrapolation, NaN above the curve.
    pub fn log_log() -> Self {
        Self { log_x: true, log_y: true, ..Self::default() }
    }
}

fn log10_checked(v: f64, what: &str) -> Result<f64> {
    if v > 0.0 {
        Ok(v.log10())
    } else {
        Err(Error::Domain(format!("{what} = {v}")))
    }
}

/// Interpolate `y` at each of `x_test` from the curve `(x_train, y_train)`.
///
/// Below the training range the first training `y` is returned; above it
/// `y_asymptotic`, unless `extrapolation` is set. An empty curve yields zeros;
/// a single point yields its `y` at or above its `x` and zero below.
pub fn interpolate(
    x_test: &[f64],
    x_train: &[f64],
    y_train: &[f64],
    options: &InterpolationOptions,
) -> Result<Vec<f64>> {
    if x_train.len() != y_train.len() {
        return Err(Error::InvalidInput(format!(
            "x_train and y_train differ in length ({} vs {})",
            x_train.len(),
            y_train.len()
        )));
    }

    let mut points: Vec<(f64, f64)> = x_train
        .iter()
        .zip(y_train)
        .map(|(&x, &y)| (x, y))
        .filter(|&(x, _)| options.x_threshold.is_none_or(|t| x > t))
        .filter(|&(_, y)| options.y_threshold.is_none_or(|t| y > t))
        .collect();

    if options.extrapolation {
        if points.iter().any(|&(_, y)| y < 0.0) {
            return Err(Error::InvalidInput(
                "extrapolation is not supported for negative training values".to_string(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
    } else if points.windows(2).any(|w| w[0].0 > w[1].0) {
        return Err(Error::InvalidInput(
            "x_train must be sorted in ascending order".to_string(),
        ));
    }
    if points.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(Error::InvalidInput("x_train contains duplicate values".to_string()));
    }

    match points.len() {
        0 => return Ok(vec![0.0; x_test.len()]),
        1 => {
            let (x0, y0) = points[0];
            return Ok(x_test.iter().map(|&x| if x >= x0 { y0 } else { 0.0 }).collect());
        }
        _ => {}
    }

    let tx = |v: f64, what: &str| if options.log_x { log10_checked(v, what) } else { Ok(v) };
    let ty = |v: f64, what: &str| if options.log_y { log10_checked(v, what) } else { Ok(v) };

    let xs = points.iter().map(|&(x, _)| tx(x, "x_train")).collect::<Result<Vec<_>>>()?;
    let ys = points.iter().map(|&(_, y)| ty(y, "y_train")).collect::<Result<Vec<_>>>()?;
    let n = xs.len();

    let line = |i: usize, x: f64| {
        let slope = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]);
        ys[i] + slope * (x - xs[i])
    };

    let mut out = Vec::with_capacity(x_test.len());
    for &q in x_test {
        let x = tx(q, "x_test")?;
        let y = if x < xs[0] {
            if options.extrapolation { line(0, x) } else { ys[0] }
        } else if x > xs[n - 1] {
            if options.extrapolation {
                line(n - 2, x)
            } else {
                out.push(options.y_asymptotic);
                continue;
            }
        } else {
            // First index with xs[i] >= x; clamp so i..i+1 is a valid segment.
            let i = xs.partition_point(|&v| v < x).saturating_sub(1).min(n - 2);
            line(i, x)
        };
        out.push(if options.log_y { 10f64.powf(y) } else { y });
    }

    Ok(out)
}
