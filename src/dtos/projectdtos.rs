use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::communedtos::CommuneView;
use crate::{
    db::listing::{AccountabilityFilters, ProjectFilters},
    models::{
        communemodel::Commune,
        projectmodel::{
            AccountabilityStatus, AccountabilityWithRelations, CommentWithAuthor, ProjectChanges,
            ProjectStatus, ProjectWithRelations,
        },
        usermodel::UserRole,
    },
};

pub fn project_download_url(project_id: Uuid) -> String {
    format!("/api/projects/{}/download", project_id)
}

/// Placeholder avatar keyed on the first letter of the prenom, nom or email.
pub fn avatar_url(prenom: &str, nom: &str, email: &str) -> String {
    let initial = [prenom, nom, email]
        .iter()
        .find_map(|part| part.trim().chars().next())
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "U".to_string());
    format!("https://placehold.co/32x32/cccccc/ffffff?text={}", initial)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserBasicView {
    pub id: Uuid,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonView {
    pub id: Uuid,
    pub email: String,
    pub nom: String,
    pub prenom: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorView {
    pub id: Uuid,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Uuid,
    pub project: Uuid,
    pub author: AuthorView,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CommentWithAuthor> for CommentView {
    fn from(row: &CommentWithAuthor) -> Self {
        CommentView {
            id: row.comment.id,
            project: row.comment.project_id,
            author: AuthorView {
                id: row.comment.author_id,
                email: row.author_email.clone(),
                nom: row.author_nom.clone(),
                prenom: row.author_prenom.clone(),
                avatar: avatar_url(&row.author_prenom, &row.author_nom, &row.author_email),
            },
            text: row.comment.text.clone(),
            created_at: row.comment.created_at,
            updated_at: row.comment.updated_at,
        }
    }
}

/// Project as listed: nested commune and creator plus child counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub commune: CommuneView,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<BigDecimal>,
    pub avancement: i32,
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserBasicView>,
    pub accountability_count: i64,
    pub comments_count: i64,
}

impl From<&ProjectWithRelations> for ProjectView {
    fn from(row: &ProjectWithRelations) -> Self {
        let project = &row.project;
        let commune = Commune {
            id: project.commune_id,
            nom: row.commune_nom.clone(),
            region: row.commune_region.clone(),
            latitude: row.commune_latitude,
            longitude: row.commune_longitude,
            created_at: row.commune_created_at,
            updated_at: row.commune_updated_at,
        };

        let created_by = match (project.created_by, &row.creator_email, row.creator_role) {
            (Some(id), Some(email), Some(role)) => Some(UserBasicView {
                id,
                email: email.clone(),
                nom: row.creator_nom.clone().unwrap_or_default(),
                prenom: row.creator_prenom.clone().unwrap_or_default(),
                telephone: row.creator_telephone.clone().unwrap_or_default(),
                role,
            }),
            _ => None,
        };

        ProjectView {
            id: project.id,
            title: project.title.clone(),
            description: project.description.clone(),
            status: project.status,
            commune: CommuneView::from(&commune),
            start_date: project.start_date,
            end_date: project.end_date,
            budget: project.budget.clone(),
            avancement: project.avancement,
            file: project.file.as_ref().map(|_| project_download_url(project.id)),
            created_at: project.created_at,
            created_by,
            accountability_count: row.accountability_count,
            comments_count: row.comments_count,
        }
    }
}

/// Fields only the detail endpoint adds on top of [`ProjectView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetailExtension {
    pub updated_at: DateTime<Utc>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetailView {
    #[serde(flatten)]
    pub project: ProjectView,
    #[serde(flatten)]
    pub detail: ProjectDetailExtension,
}

impl ProjectDetailView {
    pub fn assemble(row: &ProjectWithRelations, comments: &[CommentWithAuthor]) -> Self {
        ProjectDetailView {
            project: ProjectView::from(row),
            detail: ProjectDetailExtension {
                updated_at: row.project.updated_at,
                comments: comments.iter().map(CommentView::from).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountabilityProjectView {
    pub id: Uuid,
    pub title: String,
    pub commune: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountabilityView {
    pub id: Uuid,
    pub project: AccountabilityProjectView,
    pub citizen: PersonView,
    pub question: String,
    pub response: Option<String>,
    pub status: AccountabilityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responded_by: Option<PersonView>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<&AccountabilityWithRelations> for AccountabilityView {
    fn from(row: &AccountabilityWithRelations) -> Self {
        let a = &row.accountability;
        let responded_by = match (a.responded_by, &row.responder_email) {
            (Some(id), Some(email)) => Some(PersonView {
                id,
                email: email.clone(),
                nom: row.responder_nom.clone().unwrap_or_default(),
                prenom: row.responder_prenom.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        AccountabilityView {
            id: a.id,
            project: AccountabilityProjectView {
                id: a.project_id,
                title: row.project_title.clone(),
                commune: row.project_commune_id,
            },
            citizen: PersonView {
                id: a.citizen_id,
                email: row.citizen_email.clone(),
                nom: row.citizen_nom.clone(),
                prenom: row.citizen_prenom.clone(),
            },
            question: a.question.clone(),
            response: a.response.clone(),
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
            responded_by,
            responded_at: a.responded_at,
        }
    }
}

fn check_project_fields(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    budget: Option<&BigDecimal>,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            return Err(ValidationError::new("end_date_before_start_date"));
        }
    }
    if budget.map_or(false, |b| b < &BigDecimal::zero()) {
        return Err(ValidationError::new("negative_budget"));
    }
    Ok(())
}

fn validate_create_project(dto: &CreateProjectDto) -> Result<(), ValidationError> {
    check_project_fields(dto.start_date, dto.end_date, dto.budget.as_ref())
}

fn validate_update_project(dto: &UpdateProjectDto) -> Result<(), ValidationError> {
    check_project_fields(
        dto.start_date.flatten(),
        dto.end_date.flatten(),
        dto.budget.as_ref().and_then(Option::as_ref),
    )
}

/// Tells an absent field (`None`) from an explicit `null` (`Some(None)`).
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
#[validate(schema(function = "validate_create_project"))]
pub struct CreateProjectDto {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    /// Only read for administrators; a CTD always creates in their commune.
    pub commune: Option<i32>,

    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<BigDecimal>,

    #[validate(range(min = 0, max = 100, message = "Avancement must be between 0 and 100"))]
    pub avancement: Option<i32>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
#[validate(schema(function = "validate_update_project"))]
pub struct UpdateProjectDto {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(min = 1))]
    pub description: Option<String>,

    pub commune: Option<i32>,
    pub status: Option<ProjectStatus>,

    #[serde(default, deserialize_with = "explicit_null")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub budget: Option<Option<BigDecimal>>,

    #[validate(range(min = 0, max = 100, message = "Avancement must be between 0 and 100"))]
    pub avancement: Option<i32>,
}

impl UpdateProjectDto {
    pub fn changes(&self) -> ProjectChanges {
        ProjectChanges {
            title: self.title.as_ref().map(|t| t.trim().to_string()),
            description: self.description.clone(),
            commune_id: self.commune,
            status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
            budget: self.budget.clone(),
            avancement: self.avancement,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectQueryParams {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
    pub commune: Option<i32>,
}

impl ProjectQueryParams {
    pub fn filters(&self) -> ProjectFilters {
        ProjectFilters {
            status: self.status,
            search: self.search.clone(),
            commune_id: self.commune,
        }
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CommentDto {
    #[validate(length(min = 1, max = 5000, message = "Comment text is required"))]
    pub text: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountabilityDto {
    pub project: Uuid,

    #[validate(length(min = 1, message = "Question is required"))]
    pub question: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RespondAccountabilityDto {
    #[validate(length(min = 1, message = "Response is required"))]
    pub response: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountabilityQueryParams {
    pub project: Option<Uuid>,
    pub status: Option<AccountabilityStatus>,
}

impl AccountabilityQueryParams {
    pub fn filters(&self) -> AccountabilityFilters {
        AccountabilityFilters {
            project_id: self.project,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::projectmodel::{Comment, Project};
    use std::str::FromStr;

    fn project_row(with_creator: bool) -> ProjectWithRelations {
        let now = Utc::now();
        let creator = Uuid::new_v4();
        ProjectWithRelations {
            project: Project {
                id: Uuid::new_v4(),
                title: "Forage".to_string(),
                description: "Forage d'eau potable".to_string(),
                commune_id: 1,
                status: ProjectStatus::InProgress,
                start_date: None,
                end_date: None,
                budget: Some(BigDecimal::from_str("1500000.00").unwrap()),
                avancement: 40,
                file: Some("projects/files/x_plan.pdf".to_string()),
                created_by: Some(creator),
                created_at: now,
                updated_at: now,
            },
            commune_nom: "Bafoussam I".to_string(),
            commune_region: "Ouest".to_string(),
            commune_latitude: Some(5.475),
            commune_longitude: Some(10.421),
            commune_created_at: now,
            commune_updated_at: now,
            creator_email: with_creator.then(|| "ctd@x.com".to_string()),
            creator_nom: with_creator.then(|| "Fotso".to_string()),
            creator_prenom: with_creator.then(|| "Paul".to_string()),
            creator_telephone: with_creator.then(|| "677000000".to_string()),
            creator_role: with_creator.then_some(UserRole::Ctd),
            comments_count: 2,
            accountability_count: 1,
        }
    }

    #[test]
    fn test_avatar_initial_fallbacks() {
        assert_eq!(
            avatar_url("paul", "Fotso", "p@x.com"),
            "https://placehold.co/32x32/cccccc/ffffff?text=P"
        );
        assert_eq!(
            avatar_url("", "fotso", "p@x.com"),
            "https://placehold.co/32x32/cccccc/ffffff?text=F"
        );
        assert_eq!(avatar_url("", "", ""), "https://placehold.co/32x32/cccccc/ffffff?text=U");
    }

    #[test]
    fn test_project_view_nests_commune_and_creator() {
        let row = project_row(true);
        let json = serde_json::to_value(ProjectView::from(&row)).unwrap();
        assert_eq!(json["commune"]["nom"], "Bafoussam I");
        assert_eq!(json["commune"]["coordinates"]["lat"], 5.475);
        assert_eq!(json["created_by"]["role"], "ctd");
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["comments_count"], 2);
        assert_eq!(
            json["file"],
            serde_json::Value::String(project_download_url(row.project.id))
        );
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_deleted_creator_serializes_as_null() {
        let json = serde_json::to_value(ProjectView::from(&project_row(false))).unwrap();
        assert!(json["created_by"].is_null());
    }

    #[test]
    fn test_detail_view_composes_base_and_extension() {
        let row = project_row(true);
        let now = Utc::now();
        let comment = CommentWithAuthor {
            comment: Comment {
                id: Uuid::new_v4(),
                project_id: row.project.id,
                author_id: Uuid::new_v4(),
                text: "Bravo".to_string(),
                created_at: now,
                updated_at: now,
            },
            author_email: "a@x.com".to_string(),
            author_nom: "Nana".to_string(),
            author_prenom: "Ulrich".to_string(),
        };

        let json = serde_json::to_value(ProjectDetailView::assemble(&row, &[comment])).unwrap();
        assert_eq!(json["title"], "Forage");
        assert!(json.get("updated_at").is_some());
        assert_eq!(
            json["comments"][0]["author"]["avatar"],
            "https://placehold.co/32x32/cccccc/ffffff?text=U"
        );
        assert_eq!(json["comments"][0]["text"], "Bravo");
    }

    #[test]
    fn test_project_payload_validation() {
        let mut dto = CreateProjectDto {
            title: "Forage".to_string(),
            description: "Eau".to_string(),
            commune: None,
            status: None,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            budget: Some(BigDecimal::from(1000)),
            avancement: Some(50),
        };
        assert!(dto.validate().is_ok());

        dto.avancement = Some(101);
        assert!(dto.validate().is_err());

        dto.avancement = Some(100);
        dto.end_date = NaiveDate::from_ymd_opt(2024, 12, 31);
        assert!(dto.validate().is_err());

        dto.end_date = None;
        dto.budget = Some(BigDecimal::from(-5));
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_update_tells_missing_from_null() {
        let dto: UpdateProjectDto = serde_json::from_value(serde_json::json!({
            "title": "  Forage  ",
            "end_date": null,
            "budget": "2500.00"
        }))
        .unwrap();
        assert!(dto.validate().is_ok());

        let changes = dto.changes();
        assert_eq!(changes.title.as_deref(), Some("Forage"));
        assert_eq!(changes.start_date, None);
        assert_eq!(changes.end_date, Some(None));
        assert_eq!(changes.budget, Some(Some(BigDecimal::from(2500))));
        assert!(!changes.touches_commune());
    }
}
