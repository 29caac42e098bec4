//! Tessellation tolerances.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::error::{KernelError, Result};

/// Lower bound for the effective tolerance, as a fraction of the linear deflection.
const MIN_TOLERANCE_RATIO: f64 = 0.01;

/// Linear and angular deflection limits for tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deflection {
    /// Maximum distance between the surface and its triangulation (mm).
    pub linear: f64,
    /// Maximum angle between adjacent facet normals (radians).
    pub angular: f64,
}

impl Default for Deflection {
    fn default() -> Self {
        Self {
            linear: 0.001,
            angular: 0.05,
        }
    }
}

impl Deflection {
    /// Create deflection limits.
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// Validate the limits. Must pass before any kernel call.
    pub fn validate(&self) -> Result<()> {
        if !self.linear.is_finite() || self.linear <= 0.0 {
            return Err(KernelError::InvalidDeflection(format!(
                "linear deflection must be a positive number, got {}",
                self.linear
            )));
        }
        if !self.angular.is_finite() || self.angular <= 0.0 || self.angular > PI {
            return Err(KernelError::InvalidDeflection(format!(
                "angular deflection must be in (0, pi] radians, got {}",
                self.angular
            )));
        }
        Ok(())
    }

    /// Angular deflection in degrees, for display.
    pub fn angular_degrees(&self) -> f64 {
        self.angular.to_degrees()
    }

    /// Chordal tolerance handed to the tessellator for a solid with `bounds`.
    ///
    /// truck only takes a distance tolerance, so the angular limit becomes
    /// the sagitta of an arc spanning `angular` on a circle of radius half
    /// the bounding-box diagonal. The smaller of that and `linear` wins,
    /// floored at a fraction of `linear` so degenerate boxes cannot drive
    /// the tolerance to zero. Non-decreasing in both parameters.
    ///
    /// The radius is a whole-solid stand-in for per-face curvature, so on
    /// large parts the angular limit stops binding: at the defaults it only
    /// tightens solids whose diagonal is under about 6.4 mm.
    pub fn chordal_tolerance(&self, bounds: &Aabb) -> f64 {
        let radius = bounds.diagonal() / 2.0;
        let sagitta = radius * (1.0 - (self.angular / 2.0).cos());
        let tol = if sagitta.is_finite() && sagitta > 0.0 {
            self.linear.min(sagitta)
        } else {
            self.linear
        };
        tol.max(self.linear * MIN_TOLERANCE_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box(size: f64) -> Aabb {
        Aabb::new([0.0, 0.0, 0.0], [size, size, size])
    }

    #[test]
    fn test_defaults() {
        let d = Deflection::default();
        assert_eq!(d.linear, 0.001);
        assert_eq!(d.angular, 0.05);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive() {
        for (linear, angular) in [
            (0.0, 0.05),
            (-0.1, 0.05),
            (0.001, 0.0),
            (0.001, -1.0),
            (f64::NAN, 0.05),
            (0.001, f64::INFINITY),
            (0.001, 4.0),
        ] {
            let d = Deflection::new(linear, angular);
            assert!(
                matches!(d.validate(), Err(KernelError::InvalidDeflection(_))),
                "accepted linear={linear} angular={angular}"
            );
        }
    }

    #[test]
    fn test_linear_wins_on_small_parts() {
        // 1 mm cube: sagitta for 0.5 rad is ~0.027 mm, linear 0.001 is tighter.
        let d = Deflection::new(0.001, 0.5);
        assert_relative_eq!(d.chordal_tolerance(&unit_box(1.0)), 0.001);
    }

    #[test]
    fn test_angular_wins_on_coarse_linear() {
        let d = Deflection::new(1.0, 0.05);
        let bounds = unit_box(100.0);
        let radius = bounds.diagonal() / 2.0;
        let expected = radius * (1.0 - (0.025f64).cos());
        assert_relative_eq!(d.chordal_tolerance(&bounds), expected, epsilon = 1e-12);
        assert!(expected < 1.0);
    }

    #[test]
    fn test_default_angular_binds_only_below_crossover() {
        let d = Deflection::default();
        let crossover = 2.0 * d.linear / (1.0 - (d.angular / 2.0).cos());
        assert!((crossover - 6.4).abs() < 0.01, "{crossover}");

        // 3 mm cube, diagonal ~5.2 mm: angular is tighter.
        assert!(d.chordal_tolerance(&unit_box(3.0)) < d.linear);
        // 4 mm cube, diagonal ~6.9 mm: linear decides.
        assert_relative_eq!(d.chordal_tolerance(&unit_box(4.0)), d.linear);
    }

    #[test]
    fn test_degenerate_bounds_fall_back_to_floor() {
        let d = Deflection::new(0.5, 0.05);
        let point = Aabb::new([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        assert_relative_eq!(d.chordal_tolerance(&point), 0.5);
        let tiny = Aabb::new([0.0, 0.0, 0.0], [1e-9, 0.0, 0.0]);
        assert_relative_eq!(d.chordal_tolerance(&tiny), 0.5 * MIN_TOLERANCE_RATIO);
    }

    #[test]
    fn test_monotone_in_both_parameters() {
        let bounds = unit_box(40.0);
        let linears = [1.0, 0.5, 0.1, 0.01, 0.001];
        let angulars = [1.0, 0.5, 0.1, 0.05, 0.01];
        for w in linears.windows(2) {
            for &a in &angulars {
                let coarse = Deflection::new(w[0], a).chordal_tolerance(&bounds);
                let fine = Deflection::new(w[1], a).chordal_tolerance(&bounds);
                assert!(fine <= coarse);
            }
        }
        for w in angulars.windows(2) {
            for &l in &linears {
                let coarse = Deflection::new(l, w[0]).chordal_tolerance(&bounds);
                let fine = Deflection::new(l, w[1]).chordal_tolerance(&bounds);
                assert!(fine <= coarse);
            }
        }
    }
}
