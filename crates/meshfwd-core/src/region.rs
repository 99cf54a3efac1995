//! Radio regions: which frequency plan the radio must use where it is.
//!
//! Resolution is a coarse bounding-box lookup. Smaller territories come first
//! so they win over the broad continental boxes that overlap them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    NorthAmerica,
    Europe,
    SouthAfrica,
    Australia,
    NewZealand,
    Singapore,
    Taiwan,
    Japan,
    SouthKorea,
    HongKong,
}

/// (region, lat_min, lat_max, lon_min, lon_max)
const BOUNDS: &[(Region, f64, f64, f64, f64)] = &[
    (Region::Singapore, 1.1, 1.5, 103.6, 104.1),
    (Region::HongKong, 22.1, 22.6, 113.8, 114.5),
    (Region::Taiwan, 21.8, 25.4, 119.9, 122.1),
    (Region::SouthKorea, 33.0, 38.7, 124.5, 130.0),
    (Region::Japan, 24.0, 45.6, 122.9, 146.0),
    (Region::NewZealand, -47.5, -34.0, 166.0, 179.0),
    (Region::Australia, -44.0, -10.0, 112.0, 154.0),
    (Region::SouthAfrica, -35.0, -22.0, 16.0, 33.0),
    (Region::Europe, 34.0, 72.0, -25.0, 45.0),
    (Region::NorthAmerica, 7.0, 84.0, -170.0, -50.0),
];

impl Region {
    /// Used when the location matches no known region.
    pub const DEFAULT: Region = Region::NorthAmerica;

    /// The region containing a point, if any.
    pub fn for_location(latitude: f64, longitude: f64) -> Option<Region> {
        BOUNDS
            .iter()
            .find(|(_, lat_min, lat_max, lon_min, lon_max)| {
                (*lat_min..=*lat_max).contains(&latitude)
                    && (*lon_min..=*lon_max).contains(&longitude)
            })
            .map(|(region, ..)| *region)
    }

    /// Resolve with both fallbacks: a missing location uses `fallback`, an
    /// unknown place uses [`Region::DEFAULT`].
    pub fn resolve(location: Option<(f64, f64)>, fallback: (f64, f64)) -> Region {
        let (latitude, longitude) = location.unwrap_or(fallback);
        Self::for_location(latitude, longitude).unwrap_or(Self::DEFAULT)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Region::NorthAmerica => "north_america",
            Region::Europe => "europe",
            Region::SouthAfrica => "south_africa",
            Region::Australia => "australia",
            Region::NewZealand => "new_zealand",
            Region::Singapore => "singapore",
            Region::Taiwan => "taiwan",
            Region::Japan => "japan",
            Region::SouthKorea => "south_korea",
            Region::HongKong => "hong_kong",
        };
        f.write_str(name)
    }
}
