// src/models/photomodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Photo {
    pub id: Uuid,
    /// File-store reference, never a filesystem path.
    pub image: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date_uploaded: DateTime<Utc>,
}
