use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::impact::{DistributionShape, ImpactDistribution};
use crate::interpolate::{InterpolationOptions, interpolate};

/// One impact value per simulated year, index 0 being the first year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearSet(Vec<f64>);

impl YearSet {
    pub fn new(values: Vec<f64>) -> Self {
        YearSet(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn mean(&self) -> f64 {
        if self.0.is_empty() {
            0.0
        } else {
            self.0.iter().sum::<f64>() / self.0.len() as f64
        }
    }

    /// Clip every value to `[0, cap]`.
    pub fn capped(self, cap: f64) -> Self {
        YearSet(self.0.into_iter().map(|v| v.max(0.0).min(cap)).collect())
    }
}

impl From<Vec<f64>> for YearSet {
    fn from(values: Vec<f64>) -> Self {
        YearSet(values)
    }
}

/// Sample one impact per simulated year from `distribution`.
///
/// Annual event sets draw one event per year weighted by frequency.
/// Return-period curves draw `u ~ U[0,1)` per year and read the loss at
/// return period `1/u` off the log-log curve. Values are clipped to
/// `[0, max observed magnitude]`; no exposure cap is applied here.
pub fn sample_year_set(
    distribution: &ImpactDistribution,
    n_sim_years: usize,
    rng: &mut impl Rng,
) -> Result<YearSet> {
    let raw = match distribution.shape()? {
        DistributionShape::Annual => sample_annual(distribution, n_sim_years, rng)?,
        DistributionShape::ReturnPeriod => sample_return_periods(distribution, n_sim_years, rng)?,
    };

    let max = distribution.max_magnitude();
    let values: Vec<f64> = raw.into_iter().map(|v| v.clamp(0.0, max)).collect();

    // Holds while magnitudes are validated to [0, 1] and draws are clamped to
    // the largest one; a change to either must not leak fractions above 1.
    if distribution.is_fractional()
        && let Some(&worst) = values.iter().find(|&&v| v > 1.0)
    {
        return Err(Error::OutOfRange {
            what: format!("sampled {} fractional impact", distribution.hazard()),
            lo: 0.0,
            hi: 1.0,
            min: 0.0,
            max: worst,
        });
    }

    Ok(YearSet(values))
}

fn sample_annual(
    distribution: &ImpactDistribution,
    n_sim_years: usize,
    rng: &mut impl Rng,
) -> Result<Vec<f64>> {
    let events = distribution.events();
    let index = WeightedIndex::new(events.iter().map(|e| e.frequency)).map_err(|e| {
        Error::InvalidInput(format!("cannot sample events by frequency: {e}"))
    })?;
    Ok((0..n_sim_years).map(|_| events[index.sample(rng)].magnitude).collect())
}

fn sample_return_periods(
    distribution: &ImpactDistribution,
    n_sim_years: usize,
    rng: &mut impl Rng,
) -> Result<Vec<f64>> {
    let mut curve: Vec<(f64, f64)> = distribution
        .events()
        .iter()
        .map(|e| (1.0 / e.frequency, e.magnitude))
        .collect();
    curve.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Zero losses have no logarithm: fit the curve through the positive
    // points only. Return periods below the first positive loss lose nothing.
    let Some(first_loss_rp) = curve.iter().find(|&&(_, m)| m > 0.0).map(|&(rp, _)| rp) else {
        return Ok(vec![0.0; n_sim_years]);
    };
    let leading_zero_losses = curve.iter().any(|&(rp, m)| m <= 0.0 && rp < first_loss_rp);

    let sampled_rps: Vec<f64> = (0..n_sim_years).map(|_| 1.0 / rng.random::<f64>()).collect();
    let rps: Vec<f64> = curve.iter().map(|&(rp, _)| rp).collect();
    let losses: Vec<f64> = curve.iter().map(|&(_, m)| m).collect();
    let options = InterpolationOptions { y_threshold: Some(0.0), ..InterpolationOptions::log_log() };
    let interpolated = interpolate(&sampled_rps, &rps, &losses, &options)?;

    let max = distribution.max_magnitude();
    Ok(sampled_rps
        .iter()
        .zip(interpolated)
        .map(|(&rp, v)| {
            if leading_zero_losses && rp < first_loss_rp {
                0.0
            } else if v.is_nan() {
                // Rarer than the rarest curve point.
                max
            } else {
                v
            }
        })
        .collect())
}

/// Sum year-sets element-wise, then clip each year once to `[0, cap]`.
pub fn combine(year_sets: &[YearSet], cap: f64) -> Result<YearSet> {
    let Some(first) = year_sets.first() else {
        return Err(Error::InvalidInput("no year-sets to combine".to_string()));
    };
    if cap.is_nan() || cap < 0.0 {
        return Err(Error::InvalidInput(format!("exposure cap must be non-negative, got {cap}")));
    }
    let n = first.len();
    if let Some(bad) = year_sets.iter().find(|ys| ys.len() != n) {
        return Err(Error::InvalidInput(format!(
            "year-sets differ in length ({} vs {})",
            n,
            bad.len()
        )));
    }

    let mut total = vec![0.0; n];
    for ys in year_sets {
        for (acc, v) in total.iter_mut().zip(ys.values()) {
            *acc += v;
        }
    }
    Ok(YearSet(total).capped(cap))
}

/// Switch from historical to scenario impacts over the simulated period.
///
/// For year `i` of `N` a uniform roll above `i/N` keeps the historical value,
/// otherwise the scenario value is taken. This is a per-year regime switch,
/// not a numeric blend of the two values.
pub fn blend(historical: &YearSet, scenario: &YearSet, rng: &mut impl Rng) -> Result<YearSet> {
    if historical.len() != scenario.len() {
        return Err(Error::InvalidInput(format!(
            "historical and scenario year-sets differ in length ({} vs {})",
            historical.len(),
            scenario.len()
        )));
    }
    let n = historical.len() as f64;
    let rolls: Vec<f64> = (0..historical.len()).map(|_| rng.random::<f64>()).collect();
    Ok(YearSet(
        historical
            .values()
            .iter()
            .zip(scenario.values())
            .zip(rolls)
            .enumerate()
            .map(|(year, ((&hist, &scen), roll))| if roll > year as f64 / n { hist } else { scen })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::impact::ImpactEvent;
    use crate::types::Hazard;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn flood_curve() -> ImpactDistribution {
        ImpactDistribution::from_return_periods(Hazard::Flood, &[(2.0, 0.1), (10.0, 0.5), (25.0, 0.9)])
            .unwrap()
    }

    /// P(loss >= 0.5) = P(rp >= 10) = 1/10. 1000 draws: ±3σ ≈ ±0.03.
    #[test]
    fn return_period_sampling_matches_curve() {
        let ys = sample_year_set(&flood_curve(), 1000, &mut rng()).unwrap();
        assert_eq!(ys.len(), 1000);
        assert!(ys.values().iter().all(|&v| (0.0..=0.9).contains(&v)));

        let share = ys.values().iter().filter(|&&v| v >= 0.5).count() as f64 / 1000.0;
        assert!((0.07..=0.13).contains(&share), "share of >= 0.5 losses {share:.3} not near 0.1");
    }

    #[test]
    fn same_seed_same_year_set() {
        let a = sample_year_set(&flood_curve(), 50, &mut rng()).unwrap();
        let b = sample_year_set(&flood_curve(), 50, &mut rng()).unwrap();
        assert_eq!(a, b);
        let c = sample_year_set(&flood_curve(), 50, &mut ChaCha20Rng::seed_from_u64(7)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn annual_sampling_draws_observed_magnitudes() {
        let events: Vec<ImpactEvent> = (0..20)
            .map(|i| ImpactEvent { magnitude: i as f64 / 100.0, frequency: 1.0 / 20.0 })
            .collect();
        let dist = ImpactDistribution::new(Hazard::Flood, true, events.clone()).unwrap();
        let ys = sample_year_set(&dist, 200, &mut rng()).unwrap();
        assert_eq!(ys.len(), 200);
        for v in ys.values() {
            assert!(events.iter().any(|e| e.magnitude == *v), "{v} is not an event magnitude");
        }
    }

    #[test]
    fn zero_loss_points_sample_as_no_loss() {
        let dist = ImpactDistribution::from_return_periods(
            Hazard::Flood,
            &[(2.0, 0.0), (10.0, 0.5), (25.0, 0.9)],
        )
        .unwrap();
        let ys = sample_year_set(&dist, 1000, &mut rng()).unwrap();
        let zeros = ys.values().iter().filter(|&&v| v == 0.0).count() as f64 / 1000.0;
        assert!((0.86..=0.94).contains(&zeros), "zero share {zeros:.3} not near 0.9");

        let none = ImpactDistribution::from_return_periods(Hazard::Flood, &[(2.0, 0.0), (10.0, 0.0)])
            .unwrap();
        let ys = sample_year_set(&none, 30, &mut rng()).unwrap();
        assert!(ys.values().iter().all(|&v| v == 0.0));
    }

    /// A zero point inside the curve is dropped from the fit but does not
    /// zero the frequent years below it.
    #[test]
    fn interior_zero_loss_point_keeps_frequent_losses() {
        let dist = ImpactDistribution::from_return_periods(
            Hazard::Flood,
            &[(2.0, 0.1), (10.0, 0.0), (25.0, 0.9)],
        )
        .unwrap();
        let ys = sample_year_set(&dist, 1000, &mut rng()).unwrap();
        assert!(ys.values().iter().all(|&v| v > 0.0), "interior zero point zeroed some years");

        let without = ImpactDistribution::from_return_periods(Hazard::Flood, &[(2.0, 0.1), (25.0, 0.9)])
            .unwrap();
        let expected = sample_year_set(&without, 1000, &mut rng()).unwrap();
        assert_eq!(ys, expected);
    }

    #[test]
    fn fractional_samples_reaching_total_loss_stay_within_one() {
        let dist = ImpactDistribution::from_return_periods(
            Hazard::Flood,
            &[(2.0, 0.2), (10.0, 0.7), (50.0, 1.0)],
        )
        .unwrap();
        let ys = sample_year_set(&dist, 2000, &mut rng()).unwrap();
        assert!(ys.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(ys.values().iter().any(|&v| v == 1.0), "rarest draws should reach the curve maximum");
    }

    #[test]
    fn ambiguous_distribution_is_an_error() {
        let events = vec![ImpactEvent { magnitude: 0.2, frequency: 0.1 }; 4];
        let dist = ImpactDistribution::new(Hazard::Flood, true, events).unwrap();
        assert!(matches!(sample_year_set(&dist, 10, &mut rng()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn combine_sums_then_caps() {
        let a = YearSet::new(vec![0.1, 0.2, 0.9]);
        let b = YearSet::new(vec![0.05, 0.1, 0.3]);
        let c = combine(&[a, b], 1.0).unwrap();
        let expected = [0.15, 0.3, 1.0];
        for (got, want) in c.values().iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn combine_rejects_bad_input() {
        assert!(combine(&[], 1.0).is_err());
        let a = YearSet::new(vec![0.1, 0.2]);
        let b = YearSet::new(vec![0.1]);
        assert!(matches!(combine(&[a.clone(), b], 1.0), Err(Error::InvalidInput(_))));
        assert!(combine(&[a], f64::NAN).is_err());
    }

    #[test]
    fn blend_is_deterministic_per_seed() {
        let hist = YearSet::new((0..40).map(|i| i as f64).collect());
        let scen = YearSet::new((0..40).map(|i| 100.0 + i as f64).collect());
        let a = blend(&hist, &scen, &mut rng()).unwrap();
        let b = blend(&hist, &scen, &mut rng()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.values()[0], 0.0, "first year comes from history");
        for (i, &v) in a.values().iter().enumerate() {
            assert!(v == i as f64 || v == 100.0 + i as f64, "year {i} took {v}");
        }
    }

    /// Index 0 always keeps history; late years are mostly scenario.
    #[test]
    fn blend_shifts_towards_scenario() {
        let n = 1000;
        let hist = YearSet::new(vec![0.0; n]);
        let scen = YearSet::new(vec![1.0; n]);
        let mut rng = rng();
        for _ in 0..20 {
            let out = blend(&hist, &scen, &mut rng).unwrap();
            assert_eq!(out.values()[0], 0.0);
            let early: f64 = out.values()[..100].iter().sum();
            let late: f64 = out.values()[n - 100..].iter().sum();
            assert!(early < 20.0, "early scenario picks {early}");
            assert!(late > 80.0, "late scenario picks {late}");
        }
    }

    #[test]
    fn blend_rejects_length_mismatch() {
        let err = blend(&YearSet::new(vec![0.0; 3]), &YearSet::new(vec![0.0; 4]), &mut rng());
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn combine_stays_within_cap(
            rows in prop::collection::vec(prop::collection::vec(0.0f64..2.0, 12), 1..5),
            cap in 0.0f64..3.0,
        ) {
            let sets: Vec<YearSet> = rows.into_iter().map(YearSet::new).collect();
            let out = combine(&sets, cap).unwrap();
            prop_assert_eq!(out.len(), 12);
            prop_assert!(out.values().iter().all(|&v| (0.0..=cap).contains(&v)));
        }
    }
}
