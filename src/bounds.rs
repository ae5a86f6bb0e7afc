//! World-space bounding volumes

use cgmath::{InnerSpace, Point3, Vector3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Inverted box; extending it with any point yields that point
    pub const EMPTY: Aabb = Aabb {
        min: Point3 { x: f32::MAX, y: f32::MAX, z: f32::MAX },
        max: Point3 { x: f32::MIN, y: f32::MIN, z: f32::MIN },
    };

    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: Point3<f32>, half_extent: Vector3<f32>) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    pub fn half_extent(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Smallest sphere enclosing the box
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center(),
            radius: self.half_extent().magnitude(),
        }
    }

    /// Packed as two vec4 for GPU upload (w unused)
    pub fn to_gpu(&self) -> [[f32; 4]; 2] {
        [
            [self.min.x, self.min.y, self.min.z, 0.0],
            [self.max.x, self.max.y, self.max.z, 0.0],
        ]
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Point3::new(0.0, 0.0, 0.0),
            radius: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_empty_is_identity() {
        let b = Aabb::new(Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 3.0, 4.0));
        assert!(Aabb::EMPTY.is_empty());
        assert_eq!(Aabb::EMPTY.union(&b), b);
    }

    #[test]
    fn test_intersects_and_contains() {
        let a = Aabb::from_center_extent(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center_extent(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center_extent(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_point(Point3::new(0.5, -0.5, 1.0)));
        assert!(!a.contains_point(Point3::new(0.5, -0.5, 1.5)));
    }
}
