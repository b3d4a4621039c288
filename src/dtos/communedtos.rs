use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::communemodel::{Commune, Coordinates};

fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ValidationError> {
    if latitude.map_or(false, |lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(ValidationError::new("latitude_out_of_range"));
    }
    if longitude.map_or(false, |lng| !(-180.0..=180.0).contains(&lng)) {
        return Err(ValidationError::new("longitude_out_of_range"));
    }
    Ok(())
}

fn validate_create_coordinates(dto: &CreateCommuneDto) -> Result<(), ValidationError> {
    check_coordinates(dto.latitude, dto.longitude)
}

fn validate_update_coordinates(dto: &UpdateCommuneDto) -> Result<(), ValidationError> {
    check_coordinates(dto.latitude, dto.longitude)
}

/// Commune as returned everywhere, with map-ready coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommuneView {
    pub id: i32,
    pub nom: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub coordinates: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Commune> for CommuneView {
    fn from(commune: &Commune) -> Self {
        CommuneView {
            id: commune.id,
            nom: commune.nom.clone(),
            region: commune.region.clone(),
            latitude: commune.latitude,
            longitude: commune.longitude,
            coordinates: commune.coordinates(),
            created_at: commune.created_at,
            updated_at: commune.updated_at,
        }
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
#[validate(schema(function = "validate_create_coordinates"))]
pub struct CreateCommuneDto {
    #[validate(length(min = 1, max = 100, message = "Nom is required"))]
    pub nom: String,

    #[validate(length(min = 1, max = 100, message = "Region is required"))]
    pub region: String,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
#[validate(schema(function = "validate_update_coordinates"))]
pub struct UpdateCommuneDto {
    #[validate(length(min = 1, max = 100))]
    pub nom: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub region: Option<String>,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_carries_coordinates() {
        let now = Utc::now();
        let commune = Commune {
            id: 3,
            nom: "Mandjou".to_string(),
            region: "Est".to_string(),
            latitude: Some(4.6),
            longitude: Some(13.733),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(CommuneView::from(&commune)).unwrap();
        assert_eq!(json["coordinates"]["lat"], 4.6);
        assert_eq!(json["coordinates"]["lng"], 13.733);
    }

    #[test]
    fn test_out_of_range_coordinates_are_rejected() {
        let dto = CreateCommuneDto {
            nom: "Foumbot".to_string(),
            region: "Ouest".to_string(),
            latitude: Some(95.0),
            longitude: Some(10.6),
        };
        assert!(dto.validate().is_err());
    }
}
