//! Shape filtering and distance computation over coordinate pairs indexed
//! by [`crate::entry::IndexEntry::add_spatial`].

use serde::{Deserialize, Serialize};

use crate::entry::{spatial_lat_field, spatial_lng_field};
use crate::index::holder::StoredDoc;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpatialShape {
    Circle {
        lat: f64,
        lng: f64,
        radius_km: f64,
    },
    Rectangle {
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialStrategy {
    /// Approximate containment via the shape's bounding box.
    BoundingBox,
    /// Exact distance check against circles.
    Exact,
}

/// Shape filter attached to a query; a hit must satisfy both the text
/// query and the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialIndexQuery {
    pub field: String,
    pub shape: SpatialShape,
    pub strategy: SpatialStrategy,
}

impl SpatialIndexQuery {
    pub fn within_radius(field: &str, lat: f64, lng: f64, radius_km: f64) -> Self {
        Self {
            field: field.to_string(),
            shape: SpatialShape::Circle {
                lat,
                lng,
                radius_km,
            },
            strategy: SpatialStrategy::Exact,
        }
    }

    /// Coordinates of a stored hit, if the document carried the spatial field.
    pub fn coordinates_of(&self, stored: &StoredDoc) -> Option<(f64, f64)> {
        let lat_name = spatial_lat_field(&self.field);
        let lng_name = spatial_lng_field(&self.field);
        let mut lat = None;
        let mut lng = None;
        for (name, value) in stored {
            if *name == lat_name {
                lat = value.as_f64();
            } else if *name == lng_name {
                lng = value.as_f64();
            }
        }
        Some((lat?, lng?))
    }

    pub fn matches(&self, stored: &StoredDoc) -> bool {
        let Some((lat, lng)) = self.coordinates_of(stored) else {
            return false;
        };
        match (&self.shape, self.strategy) {
            (
                SpatialShape::Circle {
                    lat: center_lat,
                    lng: center_lng,
                    radius_km,
                },
                SpatialStrategy::Exact,
            ) => haversine_km(lat, lng, *center_lat, *center_lng) <= *radius_km,
            (
                SpatialShape::Circle {
                    lat: center_lat,
                    lng: center_lng,
                    radius_km,
                },
                SpatialStrategy::BoundingBox,
            ) => {
                let lat_delta = radius_km / 111.0;
                let lng_delta = radius_km / (111.0 * center_lat.to_radians().cos().abs().max(1e-6));
                (lat - center_lat).abs() <= lat_delta && (lng - center_lng).abs() <= lng_delta
            }
            (
                SpatialShape::Rectangle {
                    min_lat,
                    max_lat,
                    min_lng,
                    max_lng,
                },
                _,
            ) => lat >= *min_lat && lat <= *max_lat && lng >= *min_lng && lng <= *max_lng,
        }
    }

    /// Distance from the shape's reference point, for `__distance` sorting.
    pub fn distance_km(&self, stored: &StoredDoc) -> Option<f64> {
        let (lat, lng) = self.coordinates_of(stored)?;
        let (ref_lat, ref_lng) = match self.shape {
            SpatialShape::Circle { lat, lng, .. } => (lat, lng),
            SpatialShape::Rectangle {
                min_lat,
                max_lat,
                min_lng,
                max_lng,
            } => ((min_lat + max_lat) / 2.0, (min_lng + max_lng) / 2.0),
        };
        Some(haversine_km(lat, lng, ref_lat, ref_lng))
    }
}

pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
