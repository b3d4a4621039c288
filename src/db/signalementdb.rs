// db/signalementdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{
    db::DBClient,
    listing::{self, SignalementQuery, SIGNALEMENT_SELECT},
};
use crate::{
    models::signalementmodel::{
        Signalement, SignalementStatus, SignalementType, SignalementWithUser,
    },
    service::policy::CommuneScope,
};

#[derive(Debug, Clone)]
pub struct NewSignalement {
    pub objet: String,
    pub description: String,
    pub localisation: String,
    pub type_signalement: SignalementType,
    pub utilisateur_id: Uuid,
    pub photo_id: Option<Uuid>,
    pub commune_id: Option<i32>,
}

#[async_trait]
pub trait SignalementExt {
    async fn create_signalement(&self, new: NewSignalement) -> Result<Signalement, sqlx::Error>;

    async fn get_signalement(
        &self,
        signalement_id: Uuid,
    ) -> Result<Option<SignalementWithUser>, sqlx::Error>;

    async fn get_signalements(
        &self,
        query: &SignalementQuery,
    ) -> Result<Vec<SignalementWithUser>, sqlx::Error>;

    /// Locks the row, lets `apply` check and mutate it, then writes it back,
    /// all in one transaction. `Ok(None)` when the report does not exist.
    async fn update_signalement_with<F, E>(
        &self,
        signalement_id: Uuid,
        apply: F,
    ) -> Result<Option<Signalement>, E>
    where
        F: FnOnce(&mut Signalement) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send;

    async fn delete_signalement(&self, signalement_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn get_signalement_counts(
        &self,
        scope: CommuneScope,
    ) -> Result<Vec<(SignalementStatus, SignalementType, i64)>, sqlx::Error>;

    async fn get_signalement_counts_by_commune(&self) -> Result<Vec<(String, i64)>, sqlx::Error>;
}

#[async_trait]
impl SignalementExt for DBClient {
    async fn create_signalement(&self, new: NewSignalement) -> Result<Signalement, sqlx::Error> {
        let signalement = sqlx::query_as::<_, Signalement>(
            r#"
            INSERT INTO signalements (
                objet, description, localisation, type_signalement,
                utilisateur_id, photo_id, commune_id, statut
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.objet)
        .bind(new.description)
        .bind(new.localisation)
        .bind(new.type_signalement)
        .bind(new.utilisateur_id)
        .bind(new.photo_id)
        .bind(new.commune_id)
        .bind(SignalementStatus::Pending)
        .fetch_one(&self.pool)
        .await?;

        Ok(signalement)
    }

    async fn get_signalement(
        &self,
        signalement_id: Uuid,
    ) -> Result<Option<SignalementWithUser>, sqlx::Error> {
        let signalement = sqlx::query_as::<_, SignalementWithUser>(&format!(
            "{} WHERE s.id = $1",
            SIGNALEMENT_SELECT
        ))
        .bind(signalement_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(signalement)
    }

    async fn get_signalements(
        &self,
        query: &SignalementQuery,
    ) -> Result<Vec<SignalementWithUser>, sqlx::Error> {
        let mut builder = query.build();
        let signalements = builder
            .build_query_as::<SignalementWithUser>()
            .fetch_all(&self.pool)
            .await?;

        Ok(signalements)
    }

    async fn update_signalement_with<F, E>(
        &self,
        signalement_id: Uuid,
        apply: F,
    ) -> Result<Option<Signalement>, E>
    where
        F: FnOnce(&mut Signalement) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Signalement>(
            r#"SELECT * FROM signalements WHERE id = $1 FOR UPDATE"#,
        )
        .bind(signalement_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut signalement) = current else {
            return Ok(None);
        };

        apply(&mut signalement)?;

        let updated = sqlx::query_as::<_, Signalement>(
            r#"
            UPDATE signalements
            SET objet = $2,
                description = $3,
                localisation = $4,
                type_signalement = $5,
                photo_id = $6,
                statut = $7,
                date_resolution = $8,
                commune_id = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(signalement.id)
        .bind(signalement.objet)
        .bind(signalement.description)
        .bind(signalement.localisation)
        .bind(signalement.type_signalement)
        .bind(signalement.photo_id)
        .bind(signalement.statut)
        .bind(signalement.date_resolution)
        .bind(signalement.commune_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_signalement(&self, signalement_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM signalements WHERE id = $1"#)
            .bind(signalement_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_signalement_counts(
        &self,
        scope: CommuneScope,
    ) -> Result<Vec<(SignalementStatus, SignalementType, i64)>, sqlx::Error> {
        let mut builder = listing::signalement_counts(scope);
        let rows = builder
            .build_query_as::<(SignalementStatus, SignalementType, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn get_signalement_counts_by_commune(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT COALESCE(c.nom, 'Sans commune') AS commune, COUNT(*)
            FROM signalements s
            LEFT JOIN communes c ON c.id = s.commune_id
            GROUP BY COALESCE(c.nom, 'Sans commune')
            ORDER BY commune
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
