// db/communedb.rs
use async_trait::async_trait;

use super::{db::DBClient, listing::CommuneQuery};
use crate::models::communemodel::Commune;

#[async_trait]
pub trait CommuneExt {
    async fn get_communes(&self, query: &CommuneQuery) -> Result<Vec<Commune>, sqlx::Error>;

    async fn get_commune(&self, commune_id: i32) -> Result<Option<Commune>, sqlx::Error>;

    async fn get_regions(&self) -> Result<Vec<String>, sqlx::Error>;

    async fn create_commune(
        &self,
        nom: String,
        region: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Commune, sqlx::Error>;

    async fn update_commune(
        &self,
        commune_id: i32,
        nom: Option<String>,
        region: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Option<Commune>, sqlx::Error>;

    /// Removes the commune together with its projects, in one transaction.
    /// Returns the file references those projects held, or `None` when the
    /// commune does not exist.
    async fn delete_commune(&self, commune_id: i32) -> Result<Option<Vec<String>>, sqlx::Error>;
}

#[async_trait]
impl CommuneExt for DBClient {
    async fn get_communes(&self, query: &CommuneQuery) -> Result<Vec<Commune>, sqlx::Error> {
        let mut builder = query.build();
        let communes = builder
            .build_query_as::<Commune>()
            .fetch_all(&self.pool)
            .await?;

        Ok(communes)
    }

    async fn get_commune(&self, commune_id: i32) -> Result<Option<Commune>, sqlx::Error> {
        let commune = sqlx::query_as::<_, Commune>(r#"SELECT * FROM communes WHERE id = $1"#)
            .bind(commune_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(commune)
    }

    async fn get_regions(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as(r#"SELECT DISTINCT region FROM communes ORDER BY region"#)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(region,)| region).collect())
    }

    async fn create_commune(
        &self,
        nom: String,
        region: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Commune, sqlx::Error> {
        let commune = sqlx::query_as::<_, Commune>(
            r#"
            INSERT INTO communes (nom, region, latitude, longitude)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(nom)
        .bind(region)
        .bind(latitude)
        .bind(longitude)
        .fetch_one(&self.pool)
        .await?;

        Ok(commune)
    }

    async fn update_commune(
        &self,
        commune_id: i32,
        nom: Option<String>,
        region: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Option<Commune>, sqlx::Error> {
        let commune = sqlx::query_as::<_, Commune>(
            r#"
            UPDATE communes
            SET nom = COALESCE($2, nom),
                region = COALESCE($3, region),
                latitude = COALESCE($4, latitude),
                longitude = COALESCE($5, longitude),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(commune_id)
        .bind(nom)
        .bind(region)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        Ok(commune)
    }

    async fn delete_commune(&self, commune_id: i32) -> Result<Option<Vec<String>>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let files: Vec<(Option<String>,)> =
            sqlx::query_as(r#"DELETE FROM projects WHERE commune_id = $1 RETURNING file"#)
                .bind(commune_id)
                .fetch_all(&mut *tx)
                .await?;

        let result = sqlx::query(r#"DELETE FROM communes WHERE id = $1"#)
            .bind(commune_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(files.into_iter().filter_map(|(file,)| file).collect()))
    }
}
