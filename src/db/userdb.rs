// db/userdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::usermodel::{User, UserRole};

/// Everything needed to persist a freshly registered, still unverified user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: String,
    pub role: UserRole,
    pub commune_id: Option<i32>,
    pub password_hash: String,
    pub verification_code: String,
    pub code_expiration: DateTime<Utc>,
}

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error>;

    /// Locks the account row, lets `apply` check and mutate its verification
    /// state, then writes it back in the same transaction. `Ok(None)` when the
    /// account does not exist.
    async fn update_user_with<F, E>(&self, user_id: Uuid, apply: F) -> Result<Option<User>, E>
    where
        F: FnOnce(&mut User) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send;

    async fn reissue_verification_code(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Creates the bootstrap administrator unless the email is already taken.
    /// Returns whether a row was inserted.
    async fn ensure_admin(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE email = $1"#)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        }

        Ok(user)
    }

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                email, nom, prenom, telephone, role, commune_id, password,
                is_active, is_verified, verification_code, code_expiration
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, FALSE, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new_user.email)
        .bind(new_user.nom)
        .bind(new_user.prenom)
        .bind(new_user.telephone)
        .bind(new_user.role)
        .bind(new_user.commune_id)
        .bind(new_user.password_hash)
        .bind(new_user.verification_code)
        .bind(new_user.code_expiration)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user_with<F, E>(&self, user_id: Uuid, apply: F) -> Result<Option<User>, E>
    where
        F: FnOnce(&mut User) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(mut user) = current else {
            return Ok(None);
        };

        apply(&mut user)?;

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_active = $2,
                is_verified = $3,
                verification_code = $4,
                code_expiration = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.verification_code)
        .bind(user.code_expiration)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn reissue_verification_code(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<User>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET verification_code = $2,
                code_expiration = $3,
                updated_at = NOW()
            WHERE id = $1 AND is_verified = FALSE
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn ensure_admin(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO users (
                email, nom, prenom, role, password,
                is_active, is_staff, is_verified
            )
            VALUES ($1, 'Administrateur', '', $2, $3, TRUE, TRUE, TRUE)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(UserRole::Administrator)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }
}
