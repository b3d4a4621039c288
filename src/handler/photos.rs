use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::photodb::PhotoExt,
    dtos::photodtos::{parse_coordinate, PhotoDto},
    error::HttpError,
    middleware::auth,
    service::storage::PHOTOS_FOLDER,
    AppState,
};

const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

pub fn photos_handler() -> Router {
    Router::new()
        .route(
            "/upload-photo",
            post(upload_photo)
                .layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES))
                .layer(middleware::from_fn(auth)),
        )
        .route("/locations", get(get_locations))
        .route("/:id/image", get(get_photo_image))
}

#[derive(Debug, Default)]
struct PhotoUpload {
    image: Option<(String, Vec<u8>)>,
    latitude: Option<String>,
    longitude: Option<String>,
}

impl PhotoUpload {
    fn into_parts(self) -> Result<(String, Vec<u8>, f64, f64), HttpError> {
        let (filename, bytes) = self
            .image
            .filter(|(_, bytes)| !bytes.is_empty())
            .ok_or_else(|| HttpError::bad_request("Image is required"))?;

        let latitude = self
            .latitude
            .as_deref()
            .and_then(|raw| parse_coordinate(raw, 90.0))
            .ok_or_else(|| HttpError::bad_request("Latitude must be between -90 and 90"))?;
        let longitude = self
            .longitude
            .as_deref()
            .and_then(|raw| parse_coordinate(raw, 180.0))
            .ok_or_else(|| HttpError::bad_request("Longitude must be between -180 and 180"))?;

        if mime_guess::from_path(&filename)
            .first()
            .map_or(true, |mime| mime.type_() != mime_guess::mime::IMAGE)
        {
            return Err(HttpError::bad_request("Only image files are accepted"));
        }

        Ok((filename, bytes, latitude, longitude))
    }
}

pub async fn upload_photo(
    Extension(app_state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let mut upload = PhotoUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(e.to_string()))?
    {
        match field.name() {
            Some("image") => {
                let filename = field.file_name().unwrap_or("photo.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| HttpError::bad_request(e.to_string()))?;
                upload.image = Some((filename, bytes.to_vec()));
            }
            Some("latitude") => {
                upload.latitude = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| HttpError::bad_request(e.to_string()))?,
                );
            }
            Some("longitude") => {
                upload.longitude = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| HttpError::bad_request(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (filename, bytes, latitude, longitude) = upload.into_parts()?;

    let reference = app_state
        .file_store
        .save(PHOTOS_FOLDER, &filename, &bytes)
        .await?;

    let photo = match app_state
        .db_client
        .save_photo(reference.clone(), latitude, longitude)
        .await
    {
        Ok(photo) => photo,
        Err(e) => {
            if let Err(cleanup) = app_state.file_store.delete(&reference).await {
                tracing::warn!("Could not discard orphaned photo {}: {}", reference, cleanup);
            }
            return Err(HttpError::server_error(e.to_string()));
        }
    };

    tracing::info!("Photo {} stored at ({}, {})", photo.id, latitude, longitude);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": PhotoDto::from(&photo),
        })),
    ))
}

pub async fn get_locations(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let photos = app_state
        .db_client
        .get_photos()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let photos: Vec<PhotoDto> = photos.iter().map(PhotoDto::from).collect();

    Ok(Json(json!({
        "status": "success",
        "results": photos.len(),
        "data": photos,
    })))
}

pub async fn get_photo_image(
    Path(photo_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let photo = app_state
        .db_client
        .get_photo(photo_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Photo not found"))?;

    let bytes = app_state.file_store.read(&photo.image).await?;
    let content_type = mime_guess::from_path(&photo.image).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .map_err(|e| HttpError::server_error(e.to_string()))?,
    );

    Ok((headers, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, lat: &str, lng: &str) -> PhotoUpload {
        PhotoUpload {
            image: Some((filename.to_string(), vec![0xff, 0xd8, 0xff])),
            latitude: Some(lat.to_string()),
            longitude: Some(lng.to_string()),
        }
    }

    #[test]
    fn test_complete_upload_is_accepted() {
        let (filename, bytes, lat, lng) = upload("depot.jpg", "5.47", "10.42")
            .into_parts()
            .unwrap();
        assert_eq!(filename, "depot.jpg");
        assert_eq!(bytes.len(), 3);
        assert_eq!((lat, lng), (5.47, 10.42));
    }

    #[test]
    fn test_upload_rejections() {
        assert!(upload("depot.jpg", "95", "10").into_parts().is_err());
        assert!(upload("depot.jpg", "5", "abc").into_parts().is_err());
        assert!(upload("notes.pdf", "5", "10").into_parts().is_err());
        assert!(PhotoUpload::default().into_parts().is_err());
    }
}
