use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[serde(alias = "Citoyens", alias = "citoyen", alias = "Citoyen")]
    Citizen,
    #[serde(alias = "ONG", alias = "ong")]
    Ngo,
    #[serde(alias = "Entreprise", alias = "entreprise")]
    Enterprise,
    #[serde(alias = "CTD")]
    Ctd,
    #[serde(alias = "Administrateur", alias = "admin")]
    Administrator,
}

impl UserRole {
    /// Roles a visitor may pick for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, UserRole::Administrator)
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Citizen
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: String,
    pub role: UserRole,
    pub commune_id: Option<i32>,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_verified: bool,

    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    #[serde(skip_serializing)]
    pub code_expiration: Option<DateTime<Utc>>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code has expired")]
    Expired,
}

impl User {
    /// Staff accounts are administrators whatever role they registered with.
    pub fn effective_role(&self) -> UserRole {
        if self.is_staff {
            UserRole::Administrator
        } else {
            self.role
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.nom, self.prenom)
    }

    /// Checks a submitted code against the pending one. A code equal to the
    /// stored one but past its expiration is reported as expired; the record
    /// itself is left untouched.
    pub fn check_verification_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let stored = self
            .verification_code
            .as_deref()
            .ok_or(VerificationError::InvalidCode)?;

        if stored.len() != code.len() || !bool::from(stored.as_bytes().ct_eq(code.as_bytes())) {
            return Err(VerificationError::InvalidCode);
        }

        match self.code_expiration {
            Some(expires_at) if now <= expires_at => Ok(()),
            _ => Err(VerificationError::Expired),
        }
    }

    /// Consumes the pending code: the account becomes active and verified and
    /// the code and its expiration are cleared.
    pub fn verify(&mut self, code: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        self.check_verification_code(code, now)?;
        self.is_active = true;
        self.is_verified = true;
        self.verification_code = None;
        self.code_expiration = None;
        Ok(())
    }
}

/// Lower-cases and trims an address so lookups and the unique index agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
pub(crate) fn sample_user(role: UserRole, commune_id: Option<i32>) -> User {
    let now = Utc::now();
    User {
        id: uuid::Uuid::new_v4(),
        email: "a@x.com".to_string(),
        nom: "Nana".to_string(),
        prenom: "Ulrich".to_string(),
        telephone: "690000000".to_string(),
        role,
        commune_id,
        password: String::new(),
        is_active: true,
        is_staff: false,
        is_verified: true,
        verification_code: None,
        code_expiration: None,
        created_at: now,
        updated_at: now,
    }
}
