//! Physics ray results used for obstruction and occlusion.
//!
//! The host's physics system casts rays between an audio object and the
//! listener and sends the results back with
//! [`ObjectRequest::ProcessPhysicsRay`](crate::request::ObjectRequest::ProcessPhysicsRay).
//! Ray 0 is the direct line of sight and drives obstruction; the remaining
//! rays sample the surroundings and drive occlusion.

use crate::math::Vec3;

/// Result of a ray intersection test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from ray origin to hit point (in meters)
    pub distance: f32,

    /// Index into the host's acoustic material table
    pub material_index: u8,

    /// Surface normal at the hit point (normalized)
    pub normal: Vec3,
}

impl RayHit {
    pub fn new(distance: f32, material_index: u8, normal: Vec3) -> Self {
        Self {
            distance,
            material_index,
            normal,
        }
    }
}

/// One ray cast on behalf of an audio object.
#[derive(Debug, Clone, PartialEq)]
pub struct RayInfo {
    /// Ray slot; 0 is the direct path to the listener
    pub ray_index: usize,
    pub origin: Vec3,
    pub direction: Vec3,
    pub length: f32,
    /// All surfaces crossed by the ray, closest first
    pub hits: Vec<RayHit>,
}

impl RayInfo {
    pub fn new(ray_index: usize, origin: Vec3, direction: Vec3, length: f32) -> Self {
        Self {
            ray_index,
            origin,
            direction,
            length,
            hits: Vec::new(),
        }
    }

    pub fn with_hits(mut self, hits: Vec<RayHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.hits.iter().any(|hit| hit.distance <= self.length)
    }

    /// Fraction of the ray that lies before the first blocking hit.
    pub fn free_fraction(&self) -> f32 {
        if self.length <= 0.0 {
            return 1.0;
        }
        self.hits
            .iter()
            .map(|hit| hit.distance)
            .filter(|distance| *distance <= self.length)
            .fold(self.length, f32::min)
            / self.length
    }
}

/// Obstruction and occlusion values handed to the implementation, both in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObstructionOcclusion {
    pub obstruction: f32,
    pub occlusion: f32,
}

/// Per-object accumulator of the latest result of every ray slot.
#[derive(Debug, Clone, Default)]
pub struct RayResults {
    blocked: Vec<Option<bool>>,
}

impl RayResults {
    pub fn record(&mut self, ray: &RayInfo) {
        if self.blocked.len() <= ray.ray_index {
            self.blocked.resize(ray.ray_index + 1, None);
        }
        self.blocked[ray.ray_index] = Some(ray.is_blocked());
    }

    pub fn values(&self) -> ObstructionOcclusion {
        let obstruction = match self.blocked.first() {
            Some(Some(true)) => 1.0,
            _ => 0.0,
        };

        let (blocked, total) = self
            .blocked
            .iter()
            .skip(1)
            .flatten()
            .fold((0usize, 0usize), |(blocked, total), is_blocked| {
                (blocked + usize::from(*is_blocked), total + 1)
            });

        let occlusion = if total == 0 {
            0.0
        } else {
            blocked as f32 / total as f32
        };

        ObstructionOcclusion {
            obstruction,
            occlusion,
        }
    }

    pub fn clear(&mut self) {
        self.blocked.clear();
    }
}
