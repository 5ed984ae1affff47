use crate::parser::sanitize;
use crate::types::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Offline `(lat, lon) -> city` lookup.
pub trait ReverseGeocoder: Send + Sync {
    fn nearest_city(&self, latitude: f64, longitude: f64) -> Option<City>;

    /// Sanitized "city, country" for a photo position, if any.
    fn locate(&self, latitude: Option<f64>, longitude: Option<f64>) -> Option<String> {
        let (latitude, longitude) = (latitude?, longitude?);
        // exports use 0/0 for "no fix"
        if latitude == 0.0 && longitude == 0.0 {
            return None;
        }
        let city = self.nearest_city(latitude, longitude)?;
        Some(sanitize(&format!("{}, {}", city.city, city.country)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    pub city: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Never finds anything; used when no city table is configured.
pub struct NullGeocoder;

impl ReverseGeocoder for NullGeocoder {
    fn nearest_city(&self, _latitude: f64, _longitude: f64) -> Option<City> {
        None
    }
}

/// Nearest-city lookup over a table of populated places, indexed by a k-d tree
/// over unit-sphere coordinates.
pub struct CityTableGeocoder {
    cities: Vec<City>,
    tree: KdTree,
}

impl CityTableGeocoder {
    pub fn new(cities: Vec<City>) -> Self {
        let tree = KdTree::build(&cities);
        Self { cities, tree }
    }

    /// Load a JSON array of `{city, country, latitude, longitude}` records.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cities: Vec<City> = serde_json::from_str(&content)?;
        info!("Loaded {} cities from {}", cities.len(), path.display());
        Ok(Self::new(cities))
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

impl ReverseGeocoder for CityTableGeocoder {
    fn nearest_city(&self, latitude: f64, longitude: f64) -> Option<City> {
        let idx = self.tree.nearest(unit_vector(latitude, longitude))?;
        self.cities.get(idx).cloned()
    }
}

type Point = [f64; 3];

// Chord length on the unit sphere grows with great-circle distance, so the
// nearest point in 3D is the nearest city on the globe.
fn unit_vector(latitude: f64, longitude: f64) -> Point {
    let (phi, lambda) = (latitude.to_radians(), longitude.to_radians());
    [phi.cos() * lambda.cos(), phi.cos() * lambda.sin(), phi.sin()]
}

fn distance2(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Implicit k-d tree: every slice stores its splitting node in the middle,
/// the lower half on the left and the upper half on the right.
struct KdTree {
    nodes: Vec<(Point, usize)>,
}

impl KdTree {
    fn build(cities: &[City]) -> Self {
        let mut nodes: Vec<(Point, usize)> = cities
            .iter()
            .enumerate()
            .filter(|(_, c)| c.latitude.is_finite() && c.longitude.is_finite())
            .map(|(idx, c)| (unit_vector(c.latitude, c.longitude), idx))
            .collect();
        Self::split(&mut nodes, 0);
        Self { nodes }
    }

    fn split(nodes: &mut [(Point, usize)], depth: usize) {
        if nodes.len() <= 1 {
            return;
        }
        let axis = depth % 3;
        let mid = nodes.len() / 2;
        nodes.select_nth_unstable_by(mid, |a, b| a.0[axis].total_cmp(&b.0[axis]));
        let (lower, upper) = nodes.split_at_mut(mid);
        Self::split(lower, depth + 1);
        Self::split(&mut upper[1..], depth + 1);
    }

    fn nearest(&self, target: Point) -> Option<usize> {
        let mut best = None;
        Self::search(&self.nodes, 0, &target, &mut best);
        best.map(|(_, idx)| idx)
    }

    fn search(nodes: &[(Point, usize)], depth: usize, target: &Point, best: &mut Option<(f64, usize)>) {
        if nodes.is_empty() {
            return;
        }
        let mid = nodes.len() / 2;
        let (point, idx) = &nodes[mid];
        let d = distance2(point, target);
        if best.is_none_or(|(b, _)| d < b) {
            *best = Some((d, *idx));
        }

        let axis = depth % 3;
        let diff = target[axis] - point[axis];
        let (near, far) = if diff < 0.0 {
            (&nodes[..mid], &nodes[mid + 1..])
        } else {
            (&nodes[mid + 1..], &nodes[..mid])
        };
        Self::search(near, depth + 1, target, best);
        if best.is_none_or(|(b, _)| diff * diff < b) {
            Self::search(far, depth + 1, target, best);
        }
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
