// src/models/projectmodel.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::usermodel::UserRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Planned,
    InProgress,
    Completed,
    Suspended,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Planned
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "accountability_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountabilityStatus {
    Pending,
    Answered,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub commune_id: i32,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<BigDecimal>,
    pub avancement: i32,
    pub file: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project joined with its commune, creator and child counts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectWithRelations {
    #[sqlx(flatten)]
    pub project: Project,
    pub commune_nom: String,
    pub commune_region: String,
    pub commune_latitude: Option<f64>,
    pub commune_longitude: Option<f64>,
    pub commune_created_at: DateTime<Utc>,
    pub commune_updated_at: DateTime<Utc>,
    pub creator_email: Option<String>,
    pub creator_nom: Option<String>,
    pub creator_prenom: Option<String>,
    pub creator_telephone: Option<String>,
    pub creator_role: Option<UserRole>,
    pub comments_count: i64,
    pub accountability_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_email: String,
    pub author_nom: String,
    pub author_prenom: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Accountability {
    pub id: Uuid,
    pub project_id: Uuid,
    pub citizen_id: Uuid,
    pub question: String,
    pub response: Option<String>,
    pub status: AccountabilityStatus,
    pub responded_by: Option<Uuid>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountabilityWithRelations {
    #[sqlx(flatten)]
    pub accountability: Accountability,
    pub project_title: String,
    pub project_commune_id: i32,
    pub citizen_email: String,
    pub citizen_nom: String,
    pub citizen_prenom: String,
    pub responder_email: Option<String>,
    pub responder_nom: Option<String>,
    pub responder_prenom: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountabilityError {
    #[error("Response text cannot be empty")]
    EmptyResponse,

    #[error("Only answered requests can be closed")]
    NotAnswered,
}

impl Accountability {
    /// Records (or edits) the official response. The first response moves the
    /// request to `ANSWERED` and stamps `responded_at`; later edits keep the
    /// original timestamp and never reopen a closed request.
    pub fn record_response(
        &mut self,
        response: String,
        responder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AccountabilityError> {
        if response.trim().is_empty() {
            return Err(AccountabilityError::EmptyResponse);
        }

        self.response = Some(response);
        self.responded_by = Some(responder);
        if self.responded_at.is_none() {
            self.responded_at = Some(now);
        }
        if self.status == AccountabilityStatus::Pending {
            self.status = AccountabilityStatus::Answered;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), AccountabilityError> {
        match self.status {
            AccountabilityStatus::Pending => Err(AccountabilityError::NotAnswered),
            AccountabilityStatus::Answered | AccountabilityStatus::Closed => {
                self.status = AccountabilityStatus::Closed;
                Ok(())
            }
        }
    }
}

/// Partial update of a project. `None` leaves a field untouched; for the
/// optional columns `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub commune_id: Option<i32>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub budget: Option<Option<BigDecimal>>,
    pub avancement: Option<i32>,
}

impl ProjectChanges {
    pub fn touches_commune(&self) -> bool {
        self.commune_id.is_some()
    }
}

impl Project {
    pub fn apply_changes(&mut self, changes: ProjectChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(commune_id) = changes.commune_id {
            self.commune_id = commune_id;
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(start_date) = changes.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = changes.end_date {
            self.end_date = end_date;
        }
        if let Some(budget) = changes.budget {
            self.budget = budget;
        }
        if let Some(avancement) = changes.avancement {
            self.avancement = avancement;
        }
    }

    /// An end date, when both are set, never precedes the start date.
    pub fn dates_consistent(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_project(commune_id: i32) -> Project {
    let now = Utc::now();
    Project {
        id: Uuid::new_v4(),
        title: "Forage".to_string(),
        description: "Eau potable".to_string(),
        commune_id,
        status: ProjectStatus::Planned,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
        end_date: NaiveDate::from_ymd_opt(2025, 6, 1),
        budget: Some(BigDecimal::from(1000)),
        avancement: 0,
        file: None,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// `response`, `responded_at` and a non-pending status go together.
    fn consistent(request: &Accountability) -> bool {
        let answered = request.status != AccountabilityStatus::Pending;
        request.response.is_some() == request.responded_at.is_some()
            && request.response.is_some() == answered
    }

    fn pending_request() -> Accountability {
        let now = Utc::now();
        Accountability {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            citizen_id: Uuid::new_v4(),
            question: "Où en est le chantier ?".to_string(),
            response: None,
            status: AccountabilityStatus::Pending,
            responded_by: None,
            responded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_first_response_answers_and_stamps() {
        let mut request = pending_request();
        assert!(consistent(&request));

        let now = Utc::now();
        let ctd = Uuid::new_v4();
        request.record_response("Travaux à 60 %".to_string(), ctd, now).unwrap();

        assert_eq!(request.status, AccountabilityStatus::Answered);
        assert_eq!(request.responded_at, Some(now));
        assert_eq!(request.responded_by, Some(ctd));
        assert!(consistent(&request));
    }

    #[test]
    fn test_second_response_keeps_first_timestamp() {
        let mut request = pending_request();
        let first = Utc::now();
        request.record_response("Première".to_string(), Uuid::new_v4(), first).unwrap();
        request
            .record_response("Corrigée".to_string(), Uuid::new_v4(), first + Duration::hours(5))
            .unwrap();

        assert_eq!(request.responded_at, Some(first));
        assert_eq!(request.response.as_deref(), Some("Corrigée"));
        assert!(consistent(&request));
    }

    #[test]
    fn test_empty_response_is_rejected() {
        let mut request = pending_request();
        assert_eq!(
            request.record_response("   ".to_string(), Uuid::new_v4(), Utc::now()),
            Err(AccountabilityError::EmptyResponse)
        );
        assert_eq!(request.status, AccountabilityStatus::Pending);
    }

    #[test]
    fn test_close_requires_an_answer() {
        let mut request = pending_request();
        assert_eq!(request.close(), Err(AccountabilityError::NotAnswered));

        request.record_response("Réponse".to_string(), Uuid::new_v4(), Utc::now()).unwrap();
        request.close().unwrap();
        assert_eq!(request.status, AccountabilityStatus::Closed);

        request.record_response("Précision".to_string(), Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(request.status, AccountabilityStatus::Closed);
        assert!(consistent(&request));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&ProjectStatus::InProgress).unwrap(), "\"IN_PROGRESS\"");
        assert_eq!(serde_json::to_string(&AccountabilityStatus::Answered).unwrap(), "\"ANSWERED\"");
    }

    #[test]
    fn test_changes_merge_and_clear_optional_columns() {
        let mut project = sample_project(1);
        project.apply_changes(ProjectChanges {
            title: Some("Forage bis".to_string()),
            end_date: Some(None),
            budget: Some(None),
            ..ProjectChanges::default()
        });
        assert_eq!(project.title, "Forage bis");
        assert_eq!(project.end_date, None);
        assert_eq!(project.budget, None);
        assert_eq!(project.start_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert!(project.dates_consistent());
    }

    #[test]
    fn test_merged_dates_must_stay_ordered() {
        let mut project = sample_project(1);
        assert!(project.dates_consistent());
        project.apply_changes(ProjectChanges {
            start_date: Some(NaiveDate::from_ymd_opt(2025, 9, 1)),
            ..ProjectChanges::default()
        });
        assert!(!project.dates_consistent());
    }
}
