//! Location gate applied before any video processing.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Axis-aligned latitude/longitude box, bounds inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingRegion {
    pub const WORLD: BoundingRegion = BoundingRegion {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    pub fn validate(&self) -> Result<()> {
        let corners = [
            GeoPoint {
                lat: self.min_lat,
                lon: self.min_lon,
            },
            GeoPoint {
                lat: self.max_lat,
                lon: self.max_lon,
            },
        ];
        if corners.iter().any(|c| !c.is_valid()) {
            return Err(anyhow!("allowed GPS region has out-of-range bounds"));
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(anyhow!("allowed GPS region has inverted bounds"));
        }
        Ok(())
    }
}

impl Default for BoundingRegion {
    fn default() -> Self {
        Self::WORLD
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsRejection {
    /// Supplied coordinates are not finite numbers.
    #[serde(rename = "invalid_gps_format")]
    InvalidFormat,
    #[serde(rename = "no_gps_found_in_video")]
    NoGpsFound,
    #[serde(rename = "bad_gps_format_in_metadata")]
    BadFormatInMetadata,
    OutsideAllowedArea,
}

impl GpsRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            GpsRejection::InvalidFormat => "invalid_gps_format",
            GpsRejection::NoGpsFound => "no_gps_found_in_video",
            GpsRejection::BadFormatInMetadata => "bad_gps_format_in_metadata",
            GpsRejection::OutsideAllowedArea => "outside_allowed_area",
        }
    }
}

impl fmt::Display for GpsRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First signed decimal latitude/longitude pair of an ISO 6709 string such
/// as `+48.8577+002.2950+035.000/`.
pub fn parse_iso6709(text: &str) -> Option<GeoPoint> {
    static ISO6709_RE: OnceLock<Regex> = OnceLock::new();
    let re = ISO6709_RE
        .get_or_init(|| Regex::new(r"([+-]\d+\.\d+)([+-]\d+\.\d+)").expect("ISO 6709 pattern compiles"));
    let caps = re.captures(text)?;
    let lat = caps.get(1)?.as_str().parse().ok()?;
    let lon = caps.get(2)?.as_str().parse().ok()?;
    Some(GeoPoint { lat, lon })
}

/// Resolve the capture location: supplied coordinates win over the
/// embedded geotag. The result must lie inside `region`; a point off the
/// globe from either source is reported as outside it.
pub fn validate_gps(
    supplied: Option<GeoPoint>,
    geotag: Option<&str>,
    region: &BoundingRegion,
) -> std::result::Result<GeoPoint, GpsRejection> {
    let point = match (supplied, geotag) {
        (Some(point), _) => {
            if !(point.lat.is_finite() && point.lon.is_finite()) {
                return Err(GpsRejection::InvalidFormat);
            }
            point
        }
        (None, None) => return Err(GpsRejection::NoGpsFound),
        (None, Some(tag)) => parse_iso6709(tag).ok_or(GpsRejection::BadFormatInMetadata)?,
    };
    if !point.is_valid() || !region.contains(point) {
        return Err(GpsRejection::OutsideAllowedArea);
    }
    Ok(point)
}
