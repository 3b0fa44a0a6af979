use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Hazard;

/// Distributions with at least this many equal-frequency events are treated
/// as annual event sets; shorter ones as return-period curves.
pub const ANNUAL_MIN_EVENTS: usize = 15;

/// Relative tolerance when deciding whether frequencies are uniform.
const FREQUENCY_RTOL: f64 = 1e-6;

/// One event of an impact distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactEvent {
    /// Loss caused by the event: a fraction of exposed value, or absolute.
    pub magnitude: f64,
    /// Expected occurrences per year.
    pub frequency: f64,
}

/// How a distribution is turned into a year-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionShape {
    /// Annualised event data: draw one event per year, weighted by frequency.
    Annual,
    /// A short return-period curve: sample return periods and interpolate.
    ReturnPeriod,
}

/// Validated event magnitudes and frequencies for one hazard.
///
/// Frequencies and magnitudes are finite and non-negative; fractional
/// distributions additionally keep magnitudes within [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDistribution")]
pub struct ImpactDistribution {
    hazard: Hazard,
    fractional: bool,
    events: Vec<ImpactEvent>,
}

#[derive(Deserialize)]
struct RawDistribution {
    hazard: Hazard,
    fractional: bool,
    events: Vec<ImpactEvent>,
}

impl TryFrom<RawDistribution> for ImpactDistribution {
    type Error = Error;

    fn try_from(raw: RawDistribution) -> Result<Self> {
        ImpactDistribution::new(raw.hazard, raw.fractional, raw.events)
    }
}

impl ImpactDistribution {
    pub fn new(hazard: Hazard, fractional: bool, events: Vec<ImpactEvent>) -> Result<Self> {
        for (i, e) in events.iter().enumerate() {
            if !e.frequency.is_finite() || e.frequency < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "event {i}: frequency must be finite and non-negative, got {}",
                    e.frequency
                )));
            }
            if !e.magnitude.is_finite() || e.magnitude < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "event {i}: magnitude must be finite and non-negative, got {}",
                    e.magnitude
                )));
            }
            if fractional && e.magnitude > 1.0 {
                return Err(Error::OutOfRange {
                    what: format!("{hazard} fractional impact of event {i}"),
                    lo: 0.0,
                    hi: 1.0,
                    min: e.magnitude,
                    max: e.magnitude,
                });
            }
        }
        Ok(Self { hazard, fractional, events })
    }

    /// Build a fractional distribution from `(return period, loss)` pairs.
    pub fn from_return_periods(hazard: Hazard, curve: &[(f64, f64)]) -> Result<Self> {
        let events = curve
            .iter()
            .map(|&(rp, loss)| {
                if rp > 0.0 {
                    Ok(ImpactEvent { magnitude: loss, frequency: 1.0 / rp })
                } else {
                    Err(Error::InvalidInput(format!("return period must be positive, got {rp}")))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(hazard, true, events)
    }

    pub fn hazard(&self) -> Hazard {
        self.hazard
    }

    pub fn is_fractional(&self) -> bool {
        self.fractional
    }

    pub fn events(&self) -> &[ImpactEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_magnitude(&self) -> f64 {
        self.events.iter().map(|e| e.magnitude).fold(0.0, f64::max)
    }

    /// Expected loss per year: Σ magnitude × frequency.
    pub fn average_annual_impact(&self) -> f64 {
        self.events.iter().map(|e| e.magnitude * e.frequency).sum()
    }

    /// Classify the distribution for sampling. Ambiguous shapes are an error.
    pub fn shape(&self) -> Result<DistributionShape> {
        let n = self.events.len();
        if n == 0 {
            return Err(Error::InvalidInput(format!(
                "{} impact distribution has no events",
                self.hazard
            )));
        }

        let reference = self.events[0].frequency;
        let uniform = self
            .events
            .iter()
            .all(|e| (e.frequency - reference).abs() <= FREQUENCY_RTOL * reference.abs());
        if n >= ANNUAL_MIN_EVENTS && uniform {
            return Ok(DistributionShape::Annual);
        }

        let mut freqs: Vec<f64> = self.events.iter().map(|e| e.frequency).collect();
        freqs.sort_by(f64::total_cmp);
        let distinct = freqs.windows(2).all(|w| w[0] != w[1]);
        if n < ANNUAL_MIN_EVENTS && distinct && freqs[0] > 0.0 {
            return Ok(DistributionShape::ReturnPeriod);
        }

        Err(Error::InvalidInput(format!(
            "unrecognised form of {} impact distribution: {n} events, uniform frequencies: {uniform}",
            self.hazard
        )))
    }

    /// Multiply every magnitude by `factor`, clipping fractional losses at 1.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::InvalidInput(format!(
                "scaling factor must be finite and non-negative, got {factor}"
            )));
        }
        let events = self
            .events
            .iter()
            .map(|e| {
                let m = e.magnitude * factor;
                ImpactEvent { magnitude: if self.fractional { m.min(1.0) } else { m }, ..*e }
            })
            .collect();
        Ok(Self { events, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> ImpactDistribution {
        ImpactDistribution::from_return_periods(Hazard::Flood, &[(2.0, 0.1), (10.0, 0.5), (25.0, 0.9)])
            .unwrap()
    }

    fn annual(n: usize) -> ImpactDistribution {
        let events = (0..n)
            .map(|i| ImpactEvent { magnitude: i as f64 / n as f64, frequency: 1.0 / n as f64 })
            .collect();
        ImpactDistribution::new(Hazard::Flood, true, events).unwrap()
    }

    #[test]
    fn short_curve_with_distinct_frequencies_is_return_period() {
        assert_eq!(curve().shape().unwrap(), DistributionShape::ReturnPeriod);
    }

    #[test]
    fn many_uniform_events_are_annual() {
        assert_eq!(annual(40).shape().unwrap(), DistributionShape::Annual);
    }

    #[test]
    fn ambiguous_shapes_are_rejected() {
        // Few events but repeated frequencies.
        assert!(annual(5).shape().is_err());

        // Many events with varied frequencies.
        let events = (1..=20)
            .map(|i| ImpactEvent { magnitude: 0.01, frequency: 1.0 / i as f64 })
            .collect();
        let d = ImpactDistribution::new(Hazard::Heatwave, true, events).unwrap();
        assert!(matches!(d.shape(), Err(Error::InvalidInput(_))));

        let empty = ImpactDistribution::new(Hazard::Flood, true, vec![]).unwrap();
        assert!(empty.shape().is_err());
    }

    #[test]
    fn invalid_events_are_rejected() {
        let neg = ImpactDistribution::new(
            Hazard::Flood,
            false,
            vec![ImpactEvent { magnitude: 1.0, frequency: -0.1 }],
        );
        assert!(matches!(neg, Err(Error::InvalidInput(_))));

        let over = ImpactDistribution::new(
            Hazard::Flood,
            true,
            vec![ImpactEvent { magnitude: 1.2, frequency: 0.1 }],
        );
        assert!(matches!(over, Err(Error::OutOfRange { .. })));

        // Absolute losses may exceed one.
        assert!(ImpactDistribution::new(
            Hazard::Flood,
            false,
            vec![ImpactEvent { magnitude: 1.2e6, frequency: 0.1 }],
        )
        .is_ok());
    }

    #[test]
    fn average_annual_impact_is_frequency_weighted() {
        let aai = curve().average_annual_impact();
        let expected = 0.1 / 2.0 + 0.5 / 10.0 + 0.9 / 25.0;
        assert!((aai - expected).abs() < 1e-12);
        assert!((curve().max_magnitude() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn scaling_clips_fractional_losses() {
        let scaled = curve().scaled(2.0).unwrap();
        let mags: Vec<f64> = scaled.events().iter().map(|e| e.magnitude).collect();
        assert_eq!(mags, vec![0.2, 1.0, 1.0]);
        assert!(curve().scaled(-1.0).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{"hazard":"flood","fractional":true,"events":[{"magnitude":1.5,"frequency":0.1}]}"#;
        assert!(serde_json::from_str::<ImpactDistribution>(json).is_err());

        let json = serde_json::to_string(&curve()).unwrap();
        let back: ImpactDistribution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, curve());
    }
}
