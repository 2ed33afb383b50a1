//! Math types for Sonarch

pub use glam::{Affine3A, Quat, Vec3};

/// Position and orientation of an audio object or listener.
///
/// Requests copy the transformation by value, so a request never refers to a
/// matrix owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transformation {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Builds a transformation from an entity world matrix. Scale is discarded.
    pub fn from_affine(matrix: &Affine3A) -> Self {
        let (_scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self { position, rotation }
    }

    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_rotation_translation(self.rotation, self.position)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}
