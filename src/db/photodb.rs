// db/photodb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::photomodel::Photo;

#[async_trait]
pub trait PhotoExt {
    async fn save_photo(
        &self,
        image: String,
        latitude: f64,
        longitude: f64,
    ) -> Result<Photo, sqlx::Error>;

    async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>, sqlx::Error>;

    async fn get_photos(&self) -> Result<Vec<Photo>, sqlx::Error>;

    async fn photo_exists(&self, photo_id: Uuid) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl PhotoExt for DBClient {
    async fn save_photo(
        &self,
        image: String,
        latitude: f64,
        longitude: f64,
    ) -> Result<Photo, sqlx::Error> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (image, latitude, longitude)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(image)
        .bind(latitude)
        .bind(longitude)
        .fetch_one(&self.pool)
        .await?;

        Ok(photo)
    }

    async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>, sqlx::Error> {
        let photo = sqlx::query_as::<_, Photo>(r#"SELECT * FROM photos WHERE id = $1"#)
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(photo)
    }

    async fn get_photos(&self) -> Result<Vec<Photo>, sqlx::Error> {
        let photos =
            sqlx::query_as::<_, Photo>(r#"SELECT * FROM photos ORDER BY date_uploaded DESC"#)
                .fetch_all(&self.pool)
                .await?;

        Ok(photos)
    }

    async fn photo_exists(&self, photo_id: Uuid) -> Result<bool, sqlx::Error> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM photos WHERE id = $1)"#)
                .bind(photo_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }
}
