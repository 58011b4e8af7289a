//! Regional ML attenuation model
//!
//! Predicts the recorded amplitude of an event of local magnitude `M` at
//! hypocentral distance `r`:
//!
//! `log10(A) = M + intercept - exponent_coeff * log10(r) - linear_coeff * r`

use serde::{Deserialize, Serialize};

use crate::error::{CapabilityError, Result};

/// Coefficients of the amplitude-distance relation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttenuationModel {
    /// Intercept term (logA0)
    #[serde(alias = "logA0", alias = "log_a0")]
    pub intercept: f64,
    /// Geometric spreading coefficient applied to log10(r) (gamma)
    #[serde(alias = "gamma")]
    pub exponent_coeff: f64,
    /// Anelastic attenuation per km (kappa)
    #[serde(alias = "kappa")]
    pub linear_coeff: f64,
}

impl AttenuationModel {
    /// Create a new attenuation model
    pub fn new(intercept: f64, exponent_coeff: f64, linear_coeff: f64) -> Self {
        Self {
            intercept,
            exponent_coeff,
            linear_coeff,
        }
    }

    /// Predicted log10 amplitude for magnitude `ml` at `r_km`
    pub fn log_amp(&self, ml: f64, r_km: f64) -> f64 {
        debug_assert!(r_km > 0.0, "attenuation is undefined at r = {r_km}");
        ml + self.intercept - self.exponent_coeff * r_km.log10() - self.linear_coeff * r_km
    }

    /// Predicted amplitude for magnitude `ml` at `r_km`
    ///
    /// `r_km` must be strictly positive. The threshold solver rejects
    /// degenerate distances before they reach this function.
    pub fn ml_to_amp(&self, ml: f64, r_km: f64) -> f64 {
        10f64.powf(self.log_amp(ml, r_km))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.intercept.is_finite()
            && self.exponent_coeff.is_finite()
            && self.linear_coeff.is_finite())
        {
            return Err(CapabilityError::invalid(
                "attenuation coefficients must be finite",
            ));
        }
        Ok(())
    }
}

impl Default for AttenuationModel {
    fn default() -> Self {
        Self::new(-1.3, 1.0, 0.003)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_matches_closed_form() {
        let model = AttenuationModel::default();
        let amp = model.ml_to_amp(2.0, 10.0);
        let expected = 10f64.powf(2.0 - 1.3 - 1.0 - 0.03);
        assert!((amp - expected).abs() < 1e-12);
    }

    #[test]
    fn amplitude_increases_with_magnitude() {
        let model = AttenuationModel::default();
        let mut prev = model.ml_to_amp(-1.0, 25.0);
        for step in 1..=80 {
            let amp = model.ml_to_amp(-1.0 + step as f64 * 0.1, 25.0);
            assert!(amp > prev);
            prev = amp;
        }
    }

    #[test]
    fn amplitude_decreases_with_distance() {
        let model = AttenuationModel::default();
        let mut prev = model.ml_to_amp(3.0, 0.5);
        for step in 1..=100 {
            let amp = model.ml_to_amp(3.0, 0.5 + step as f64 * 5.0);
            assert!(amp < prev);
            prev = amp;
        }
    }

    #[test]
    fn rejects_non_finite_coefficients() {
        let model = AttenuationModel::new(f64::NAN, 1.0, 0.003);
        assert!(model.validate().is_err());
    }
}
