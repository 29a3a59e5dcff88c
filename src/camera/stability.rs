//! Camera pose stability heuristic - pure functions

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Transform};

/// Whether a newly delivered view matrix is consistent enough with the
/// previous frame's to trust its pose for projection.
///
/// A sample point just in front of the camera is carried from the new view
/// space back through the old view's inverse; if the device barely moved,
/// the result stays aligned with the original point. `minimum_cosine` is the
/// acceptance threshold on the angle between the two (a calibration
/// constant, near 1.0). A non-invertible previous view (first frame) is
/// never stable.
pub fn view_is_stable(
    previous_view: &Matrix4<f32>,
    view: &Matrix4<f32>,
    minimum_cosine: f32,
) -> bool {
    let sample = Point3::new(0.0f32, 0.0, -0.1);
    let Some(old_world_from_view) = previous_view.invert() else {
        return false;
    };
    let transformed = (old_world_from_view * view).transform_point(sample);
    let cosine = transformed
        .to_vec()
        .normalize()
        .dot(sample.to_vec().normalize());
    cosine > minimum_cosine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::camera::MINIMUM_STABLE_COSINE;
    use cgmath::{Deg, Vector3};

    #[test]
    fn identical_views_are_stable() {
        let view = Matrix4::look_at_rh(
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        assert!(view_is_stable(&view, &view, MINIMUM_STABLE_COSINE));
    }

    #[test]
    fn rotated_view_is_unstable() {
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        let rotated = view * Matrix4::from_angle_y(Deg(5.0));
        assert!(!view_is_stable(&view, &rotated, MINIMUM_STABLE_COSINE));
    }

    #[test]
    fn tiny_drift_stays_stable() {
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        let drifted = view * Matrix4::from_angle_y(Deg(0.001));
        assert!(view_is_stable(&view, &drifted, MINIMUM_STABLE_COSINE));
    }

    #[test]
    fn degenerate_previous_view_is_unstable() {
        let zero = Matrix4::from_scale(0.0);
        let view = Matrix4::from_scale(1.0);
        assert!(!view_is_stable(&zero, &view, MINIMUM_STABLE_COSINE));
    }
}
