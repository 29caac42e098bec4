//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};

/// An axis-aligned bounding box in model units (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a box from two corners (components are sorted).
    pub fn new(a: [f64; 3], b: [f64; 3]) -> Self {
        Self {
            min: Point3::new(a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])),
            max: Point3::new(a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])),
        }
    }

    /// Smallest box containing all points, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = [f64; 3]>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first, first);
        for p in iter {
            bounds.expand(p);
        }
        Some(bounds)
    }

    /// Grow the box to contain `p`.
    pub fn expand(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.expand(other.min.into());
        out.expand(other.max.into());
        out
    }

    /// Centre point.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Extent along each axis.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Length of the space diagonal.
    pub fn diagonal(&self) -> f64 {
        self.size().norm()
    }
}
