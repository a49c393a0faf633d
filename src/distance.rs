//! Great-circle distance over an ordered trace.
//!
//! Pure and deterministic. NaN coordinates propagate to a NaN total so
//! corrupt input stays visible instead of collapsing to zero.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Haversine distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Total distance accumulated pairwise over `points`, in the order supplied
/// (normally timestamp order). Fewer than two points is zero.
pub fn total_distance_km(points: &[GeoPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = p(35.6812, 139.7671);
        let b = p(34.7024, 135.4959);

        assert_eq!(haversine_km(a, b), haversine_km(b, a));
    }

    #[test]
    fn identical_points_are_zero() {
        let a = p(35.6812, 139.7671);
        assert_eq!(haversine_km(a, a), 0.0);
        assert_eq!(total_distance_km(&[a, a, a]), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_km(p(35.0, 139.0), p(36.0, 139.0));
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn short_traces_are_zero() {
        assert_eq!(total_distance_km(&[]), 0.0);
        assert_eq!(total_distance_km(&[p(35.0, 139.0)]), 0.0);
    }

    #[test]
    fn path_distance_is_at_least_direct_distance() {
        let a = p(35.0, 139.0);
        let mid = p(35.3, 139.2);
        let b = p(35.6, 139.1);

        let path = total_distance_km(&[a, mid, b]);
        let direct = haversine_km(a, b);

        assert!(path >= direct);
        // The dogleg through `mid` is strictly longer than the straight line.
        assert!(path > direct + 1.0);
    }

    #[test]
    fn nan_coordinate_poisons_the_total() {
        let points = [p(35.0, 139.0), p(f64::NAN, 139.1), p(35.2, 139.2)];
        assert!(total_distance_km(&points).is_nan());
    }
}
