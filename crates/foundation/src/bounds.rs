use serde::{Deserialize, Serialize};

/// A geographic coordinate in engine order: longitude first.
///
/// Serialized as a `[lng, lat]` pair, which is what the rendering engine and
/// GeoJSON both expect.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(v: LngLat) -> Self {
        [v.lng, v.lat]
    }
}

/// Axis-aligned lon/lat box: `[south-west, north-east]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl LngLatBounds {
    pub const fn new(sw: LngLat, ne: LngLat) -> Self {
        Self { sw, ne }
    }

    /// Degenerate box covering a single point.
    pub fn from_point(p: LngLat) -> Self {
        Self { sw: p, ne: p }
    }

    /// Smallest box covering every coordinate, or `None` for an empty list.
    pub fn from_coords(coords: &[LngLat]) -> Option<Self> {
        let (first, rest) = coords.split_first()?;
        let mut bounds = Self::from_point(*first);
        for p in rest {
            bounds.extend(*p);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.sw.lng = self.sw.lng.min(p.lng);
        self.sw.lat = self.sw.lat.min(p.lat);
        self.ne.lng = self.ne.lng.max(p.lng);
        self.ne.lat = self.ne.lat.max(p.lat);
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.sw.lng && p.lng <= self.ne.lng && p.lat >= self.sw.lat && p.lat <= self.ne.lat
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.sw.lng + self.ne.lng) * 0.5,
            (self.sw.lat + self.ne.lat) * 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{LngLat, LngLatBounds};

    #[test]
    fn from_coords_covers_every_point() {
        let pts = [
            LngLat::new(-74.0, 40.7),
            LngLat::new(2.35, 48.85),
            LngLat::new(139.7, 35.7),
        ];
        let b = LngLatBounds::from_coords(&pts).expect("non-empty");
        assert_eq!(b.sw, LngLat::new(-74.0, 35.7));
        assert_eq!(b.ne, LngLat::new(139.7, 48.85));
        assert!(pts.iter().all(|p| b.contains(*p)));
    }

    #[test]
    fn from_coords_empty_is_none() {
        assert!(LngLatBounds::from_coords(&[]).is_none());
    }

    #[test]
    fn lng_lat_serializes_as_pair() {
        let json = serde_json::to_string(&LngLat::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
        let back: LngLat = serde_json::from_str("[10.0, 20.0]").unwrap();
        assert_eq!(back, LngLat::new(10.0, 20.0));
    }
}
