use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::photomodel::Photo;

pub fn photo_image_url(photo_id: Uuid) -> String {
    format!("/api/photos/{}/image", photo_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoDto {
    pub id: Uuid,
    pub image: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date_uploaded: DateTime<Utc>,
}

impl From<&Photo> for PhotoDto {
    fn from(photo: &Photo) -> Self {
        PhotoDto {
            id: photo.id,
            image: photo_image_url(photo.id),
            latitude: photo.latitude,
            longitude: photo.longitude,
            date_uploaded: photo.date_uploaded,
        }
    }
}

/// Checks the coordinates sent alongside an upload.
pub fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.abs() <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_dto_exposes_url_not_store_key() {
        let photo = Photo {
            id: Uuid::new_v4(),
            image: "signalements/photos/abc_x.jpg".to_string(),
            latitude: 5.47,
            longitude: 10.42,
            date_uploaded: Utc::now(),
        };
        let dto = PhotoDto::from(&photo);
        assert_eq!(dto.image, photo_image_url(photo.id));
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate(" 5.475 ", 90.0), Some(5.475));
        assert_eq!(parse_coordinate("-91", 90.0), None);
        assert_eq!(parse_coordinate("abc", 180.0), None);
        assert_eq!(parse_coordinate("NaN", 180.0), None);
    }
}
