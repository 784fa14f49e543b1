//! Streaming importance
//!
//! Each streamable asset gets an importance score from the camera state:
//! bigger and closer means more important, and assets that were requested
//! with a full update pending get a large bonus so forced refreshes jump
//! the queue.

use crate::core::types::Vec3;

/// Importance bonus for assets needing a forced full update
const FULL_UPDATE_BONUS: f32 = 100.0;

/// Viewer state feeding importance computation
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub position: Vec3,
    pub direction: Vec3,
    /// Global multiplier, raised for fast-moving cameras
    pub importance_factor: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::X,
            importance_factor: 1.0,
        }
    }
}

/// Importance of an asset with bounding `radius` centered at `center`
pub fn compute_importance(camera: &CameraState, center: Vec3, radius: f32, full_update: bool) -> f32 {
    let distance = (center - camera.position).length();
    let mut importance = camera.importance_factor * radius / (distance + 1.0);
    if full_update {
        importance += FULL_UPDATE_BONUS;
    }
    importance
}

/// Sort keys descending by importance with a stable total order
pub fn cmp_importance_desc(a: f32, b: f32) -> std::cmp::Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closer_is_more_important() {
        let camera = CameraState::default();
        let near = compute_importance(&camera, Vec3::new(10.0, 0.0, 0.0), 5.0, false);
        let far = compute_importance(&camera, Vec3::new(1000.0, 0.0, 0.0), 5.0, false);
        assert!(near > far);
    }

    #[test]
    fn test_bigger_is_more_important() {
        let camera = CameraState::default();
        let big = compute_importance(&camera, Vec3::new(100.0, 0.0, 0.0), 50.0, false);
        let small = compute_importance(&camera, Vec3::new(100.0, 0.0, 0.0), 2.0, false);
        assert!(big > small);
    }

    #[test]
    fn test_full_update_jumps_queue() {
        let camera = CameraState::default();
        let forced_far = compute_importance(&camera, Vec3::new(5000.0, 0.0, 0.0), 1.0, true);
        let near = compute_importance(&camera, Vec3::new(2.0, 0.0, 0.0), 10.0, false);
        assert!(forced_far > near);
    }

    #[test]
    fn test_descending_sort() {
        let mut values = vec![0.5f32, 2.0, 0.1, 1.0];
        values.sort_by(|a, b| cmp_importance_desc(*a, *b));
        assert_eq!(values, vec![2.0, 1.0, 0.5, 0.1]);
    }
}
