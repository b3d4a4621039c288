// src/models/communemodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Commune {
    pub id: i32,
    pub nom: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Commune {
    /// Map-ready coordinates, present only when both halves are known.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CommuneQueryParams {
    pub region: Option<String>,
    pub search: Option<String>,
    pub has_coordinates: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_require_both_halves() {
        let now = Utc::now();
        let mut commune = Commune {
            id: 1,
            nom: "Bafoussam I".to_string(),
            region: "Ouest".to_string(),
            latitude: Some(5.475),
            longitude: Some(10.421),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(commune.coordinates(), Some(Coordinates { lat: 5.475, lng: 10.421 }));

        commune.longitude = None;
        assert_eq!(commune.coordinates(), None);
    }
}
