//! Triangular voltage sweeps for cyclic voltammetry.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};

/// Largest number of set-points a single plan may hold.
pub const MAX_SWEEP_POINTS: usize = 1_000_000;

/// Ordered set-points for a cyclic sweep.
///
/// One cycle rises from the initial voltage to the final voltage and falls
/// back, visiting the peak once. Cycles are concatenated and a single sample
/// at the initial voltage closes the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    initial_voltage: f64,
    final_voltage: f64,
    step: f64,
    cycles: usize,
    points: Vec<f64>,
}

impl SweepPlan {
    /// Build the plan.
    ///
    /// The ascending leg is `initial + k * step` for every point strictly
    /// below `final_voltage`, followed by `final_voltage` itself, so the peak
    /// is hit exactly even when the range is not a multiple of the step.
    ///
    /// # Errors
    /// Non-finite inputs, a step that is not positive, a final voltage below
    /// the initial voltage, or a plan longer than [`MAX_SWEEP_POINTS`].
    ///
    /// # Example
    /// ```
    /// use smu_daq::experiment::SweepPlan;
    ///
    /// let plan = SweepPlan::generate(0.0, 1.0, 0.5, 1).unwrap();
    /// assert_eq!(plan.points(), &[0.0, 0.5, 1.0, 0.5, 0.0]);
    /// ```
    pub fn generate(
        initial_voltage: f64,
        final_voltage: f64,
        step: f64,
        cycles: usize,
    ) -> Result<Self, SweepError> {
        for (name, value) in [
            ("initial_voltage", initial_voltage),
            ("final_voltage", final_voltage),
            ("scan_rate", step),
        ] {
            if !value.is_finite() {
                return Err(SweepError::NotFinite { name, value });
            }
        }
        if step <= 0.0 {
            return Err(SweepError::NonPositiveStep(step));
        }
        if final_voltage < initial_voltage {
            return Err(SweepError::DescendingRange {
                initial_voltage,
                final_voltage,
            });
        }

        let too_many = SweepError::TooManyPoints {
            limit: MAX_SWEEP_POINTS,
        };
        let steps = ((final_voltage - initial_voltage) / step).ceil();
        if steps > MAX_SWEEP_POINTS as f64 {
            return Err(too_many);
        }
        let mut ascending: Vec<f64> = (0..steps as usize)
            .map(|k| initial_voltage + k as f64 * step)
            .filter(|v| *v < final_voltage)
            .collect();
        ascending.push(final_voltage);

        // rising leg without the peak, then the falling leg from the peak
        let mut cycle: Vec<f64> = ascending[..ascending.len() - 1].to_vec();
        cycle.extend(ascending[1..].iter().rev());

        let total = cycle
            .len()
            .checked_mul(cycles)
            .and_then(|n| n.checked_add(1))
            .filter(|n| *n <= MAX_SWEEP_POINTS)
            .ok_or(too_many)?;

        let mut points = Vec::with_capacity(total);
        if !cycle.is_empty() {
            for _ in 0..cycles {
                points.extend_from_slice(&cycle);
            }
        }
        points.push(initial_voltage);

        Ok(Self {
            initial_voltage,
            final_voltage,
            step,
            cycles,
            points,
        })
    }

    /// Set-points in the order they are sourced.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Number of set-points, including the closing sample.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a generated plan.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over the set-points.
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.points.iter()
    }

    /// Start and end voltage of every cycle.
    pub fn initial_voltage(&self) -> f64 {
        self.initial_voltage
    }

    /// Peak voltage of every cycle.
    pub fn final_voltage(&self) -> f64 {
        self.final_voltage
    }

    /// Spacing between consecutive set-points.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of up-and-down cycles.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Largest set-point magnitude in the plan.
    pub fn peak_magnitude(&self) -> f64 {
        self.points.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// Consume the plan and keep only its set-points.
    pub fn into_points(self) -> Vec<f64> {
        self.points
    }
}

impl<'a> IntoIterator for &'a SweepPlan {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cycle_shape() {
        let plan = SweepPlan::generate(0.0, 4.0, 0.1, 1).unwrap();
        let points = plan.points();

        assert_eq!(points.len(), 81);
        assert_eq!(points[0], 0.0);
        assert_eq!(points[40], 4.0);
        assert_eq!(points.iter().filter(|v| **v == 4.0).count(), 1);
        assert_eq!(points[80], 0.0);
        // falling leg mirrors the rising leg
        for k in 1..40 {
            assert_eq!(points[40 - k], points[40 + k]);
        }
        assert!((points[79] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_final_not_multiple_of_step() {
        let plan = SweepPlan::generate(0.0, 1.0, 0.3, 1).unwrap();
        let expected = [0.0, 0.3, 0.6, 0.9, 1.0, 0.9, 0.6, 0.3, 0.0];
        assert_eq!(plan.len(), expected.len());
        for (got, want) in plan.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn test_cycles_concatenate() {
        let plan = SweepPlan::generate(0.0, 1.0, 0.5, 3).unwrap();
        assert_eq!(
            plan.points(),
            &[0.0, 0.5, 1.0, 0.5, 0.0, 0.5, 1.0, 0.5, 0.0, 0.5, 1.0, 0.5, 0.0]
        );
    }

    #[test]
    fn test_degenerate_plans() {
        assert_eq!(SweepPlan::generate(1.5, 2.0, 0.5, 0).unwrap().points(), &[1.5]);
        assert_eq!(SweepPlan::generate(2.0, 2.0, 0.5, 4).unwrap().points(), &[2.0]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            SweepPlan::generate(0.0, 4.0, 0.0, 1),
            Err(SweepError::NonPositiveStep(_))
        ));
        assert!(matches!(
            SweepPlan::generate(4.0, 0.0, 0.1, 1),
            Err(SweepError::DescendingRange { .. })
        ));
        assert!(matches!(
            SweepPlan::generate(0.0, f64::INFINITY, 0.1, 1),
            Err(SweepError::NotFinite {
                name: "final_voltage",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_plans_are_rejected() {
        let too_many = Err(SweepError::TooManyPoints {
            limit: MAX_SWEEP_POINTS,
        });
        assert_eq!(SweepPlan::generate(0.0, 4.0, 0.1, usize::MAX), too_many);
        assert_eq!(SweepPlan::generate(0.0, 4.0, 1e-300, 1), too_many);
        assert_eq!(SweepPlan::generate(0.0, 4.0, 1e-6, 1), too_many);
        // a flat plan stays one point however many cycles are asked for
        assert_eq!(
            SweepPlan::generate(1.0, 1.0, 0.1, usize::MAX).unwrap().points(),
            &[1.0]
        );
    }

    #[test]
    fn test_peak_magnitude() {
        let plan = SweepPlan::generate(-1.0, 0.5, 0.5, 1).unwrap();
        assert_eq!(plan.peak_magnitude(), 1.0);
    }
}
