use nalgebra::{Point3, Rotation3, Unit, Vector3};

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle_degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_degrees.to_radians())
}

/// Dihedral angle a-b-c-d in degrees, in `(-180, 180]`.
///
/// Returns `None` when three of the points are collinear and the angle is undefined.
pub fn dihedral_angle(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Option<f64> {
    let b0 = a - b;
    let b1 = c - b;
    let b2 = d - c;

    let b1_norm = b1.norm();
    if b1_norm < 1e-9 {
        return None;
    }
    let b1u = b1 / b1_norm;

    let v = b0 - b1u * b0.dot(&b1u);
    let w = b2 - b1u * b2.dot(&b1u);
    if v.norm() < 1e-9 || w.norm() < 1e-9 {
        return None;
    }

    let x = v.dot(&w);
    let y = b1u.cross(&v).dot(&w);
    Some(y.atan2(x).to_degrees())
}

/// Rotates `points` in place about the axis running from `axis_start` to `axis_end`.
///
/// A positive angle increases the dihedral measured across that axis.
pub fn rotate_about_bond(
    points: &mut [Point3<f64>],
    axis_start: &Point3<f64>,
    axis_end: &Point3<f64>,
    angle_degrees: f64,
) {
    let axis = axis_end - axis_start;
    if axis.norm() < 1e-9 {
        return;
    }
    let rotation = rotation_from_axis_angle(&axis, angle_degrees);
    for p in points.iter_mut() {
        *p = axis_start + rotation * (*p - axis_start);
    }
}

/// Wraps an angle in degrees into `(-180, 180]`.
pub fn wrap_angle(angle_degrees: f64) -> f64 {
    let mut a = angle_degrees % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}
