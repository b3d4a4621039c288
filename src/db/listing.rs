// db/listing.rs
//! Listing specifications. Each one is resolved from the caller's scope and
//! the request filters, then rendered into a `QueryBuilder`, so the filtering
//! can be checked without a database.
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    models::{
        projectmodel::{AccountabilityStatus, ProjectStatus},
        signalementmodel::{SignalementStatus, SignalementType},
    },
    service::policy::{
        self, AccountabilityScope, Actor, CommuneScope, PolicyError, SignalementScope,
    },
};

pub const SIGNALEMENT_SELECT: &str = r#"
    SELECT s.*,
        (u.nom || ' ' || u.prenom) AS utilisateur_nom,
        u.email AS utilisateur_email
    FROM signalements s
    JOIN users u ON u.id = s.utilisateur_id
"#;

pub const PROJECT_SELECT: &str = r#"
    SELECT p.*,
        c.nom AS commune_nom,
        c.region AS commune_region,
        c.latitude AS commune_latitude,
        c.longitude AS commune_longitude,
        c.created_at AS commune_created_at,
        c.updated_at AS commune_updated_at,
        u.email AS creator_email,
        u.nom AS creator_nom,
        u.prenom AS creator_prenom,
        u.telephone AS creator_telephone,
        u.role AS creator_role,
        (SELECT COUNT(*) FROM comments cm WHERE cm.project_id = p.id) AS comments_count,
        (SELECT COUNT(*) FROM accountability a WHERE a.project_id = p.id) AS accountability_count
    FROM projects p
    JOIN communes c ON c.id = p.commune_id
    LEFT JOIN users u ON u.id = p.created_by
"#;

pub const ACCOUNTABILITY_SELECT: &str = r#"
    SELECT a.*,
        p.title AS project_title,
        p.commune_id AS project_commune_id,
        cu.email AS citizen_email,
        cu.nom AS citizen_nom,
        cu.prenom AS citizen_prenom,
        ru.email AS responder_email,
        ru.nom AS responder_nom,
        ru.prenom AS responder_prenom
    FROM accountability a
    JOIN projects p ON p.id = a.project_id
    JOIN users cu ON cu.id = a.citizen_id
    LEFT JOIN users ru ON ru.id = a.responded_by
"#;

fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Debug, Clone, Default)]
pub struct SignalementFilters {
    pub statut: Option<SignalementStatus>,
    pub type_signalement: Option<SignalementType>,
    pub utilisateur_id: Option<Uuid>,
    pub commune_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SignalementQuery {
    scope: SignalementScope,
    filters: SignalementFilters,
}

impl SignalementQuery {
    /// Resolves the role filter first; submitter and commune filters are
    /// silently dropped for callers who may not use them.
    pub fn for_actor(
        actor: Option<&Actor>,
        mut filters: SignalementFilters,
    ) -> Result<Self, PolicyError> {
        let scope = policy::signalement_scope(actor)?;
        if !policy::may_use_privileged_filters(actor) {
            filters.utilisateur_id = None;
            filters.commune_id = None;
        }
        Ok(SignalementQuery { scope, filters })
    }

    /// The caller's own reports, whatever their status.
    pub fn owned_by(owner: Uuid, mut filters: SignalementFilters) -> Self {
        filters.utilisateur_id = Some(owner);
        filters.commune_id = None;
        SignalementQuery {
            scope: SignalementScope::All,
            filters,
        }
    }

    /// Narrows an already scoped listing to one commune.
    pub fn within_commune(mut self, commune_id: i32) -> Self {
        self.filters.commune_id = Some(commune_id);
        self
    }

    pub fn scope(&self) -> SignalementScope {
        self.scope
    }

    fn push_conditions(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        builder.push(" WHERE TRUE");

        match self.scope {
            SignalementScope::All => {}
            SignalementScope::CommuneOrOwner {
                commune_id,
                owner_id,
            } => {
                builder.push(" AND (s.commune_id = ");
                builder.push_bind(commune_id);
                builder.push(" OR s.utilisateur_id = ");
                builder.push_bind(owner_id);
                builder.push(")");
            }
            SignalementScope::PublicOrOwner(owner_id) => {
                builder.push(" AND (s.statut = ");
                builder.push_bind(SignalementStatus::InProgress);
                builder.push(" OR s.utilisateur_id = ");
                builder.push_bind(owner_id);
                builder.push(")");
            }
            SignalementScope::Public => {
                builder.push(" AND s.statut = ");
                builder.push_bind(SignalementStatus::InProgress);
            }
        }

        if let Some(statut) = self.filters.statut {
            builder.push(" AND s.statut = ");
            builder.push_bind(statut);
        }
        if let Some(kind) = self.filters.type_signalement {
            builder.push(" AND s.type_signalement = ");
            builder.push_bind(kind);
        }
        if let Some(utilisateur_id) = self.filters.utilisateur_id {
            builder.push(" AND s.utilisateur_id = ");
            builder.push_bind(utilisateur_id);
        }
        if let Some(commune_id) = self.filters.commune_id {
            builder.push(" AND s.commune_id = ");
            builder.push_bind(commune_id);
        }
    }

    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(SIGNALEMENT_SELECT);
        self.push_conditions(&mut builder);
        builder.push(" ORDER BY s.date_signalement DESC");
        builder
    }
}

/// Grouped `(statut, type, count)` rows for the statistics endpoint.
pub fn signalement_counts(scope: CommuneScope) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT s.statut, s.type_signalement, COUNT(*) FROM signalements s WHERE TRUE",
    );
    if let CommuneScope::Commune(commune_id) = scope {
        builder.push(" AND s.commune_id = ");
        builder.push_bind(commune_id);
    }
    builder.push(" GROUP BY s.statut, s.type_signalement");
    builder
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilters {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
    pub commune_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ProjectQuery {
    scope: CommuneScope,
    filters: ProjectFilters,
}

impl ProjectQuery {
    pub fn for_actor(actor: &Actor, mut filters: ProjectFilters) -> Result<Self, PolicyError> {
        let scope = policy::project_scope(actor)?;
        if scope != CommuneScope::All {
            filters.commune_id = None;
        }
        Ok(ProjectQuery { scope, filters })
    }

    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(PROJECT_SELECT);
        builder.push(" WHERE TRUE");

        if let CommuneScope::Commune(commune_id) = self.scope {
            builder.push(" AND p.commune_id = ");
            builder.push_bind(commune_id);
        }
        if let Some(commune_id) = self.filters.commune_id {
            builder.push(" AND p.commune_id = ");
            builder.push_bind(commune_id);
        }
        if let Some(status) = self.filters.status {
            builder.push(" AND p.status = ");
            builder.push_bind(status);
        }
        if let Some(search) = self.filters.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(search);
            builder.push(" AND (p.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR p.description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY p.created_at DESC");
        builder
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountabilityFilters {
    pub project_id: Option<Uuid>,
    pub status: Option<AccountabilityStatus>,
}

#[derive(Debug, Clone)]
pub struct AccountabilityQuery {
    scope: AccountabilityScope,
    filters: AccountabilityFilters,
}

impl AccountabilityQuery {
    pub fn for_actor(actor: &Actor, filters: AccountabilityFilters) -> Result<Self, PolicyError> {
        Ok(AccountabilityQuery {
            scope: policy::accountability_scope(actor)?,
            filters,
        })
    }

    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(ACCOUNTABILITY_SELECT);
        builder.push(" WHERE TRUE");

        match self.scope {
            AccountabilityScope::All => {}
            AccountabilityScope::Commune(commune_id) => {
                builder.push(" AND p.commune_id = ");
                builder.push_bind(commune_id);
            }
            AccountabilityScope::Citizen(citizen_id) => {
                builder.push(" AND a.citizen_id = ");
                builder.push_bind(citizen_id);
            }
        }
        if let Some(project_id) = self.filters.project_id {
            builder.push(" AND a.project_id = ");
            builder.push_bind(project_id);
        }
        if let Some(status) = self.filters.status {
            builder.push(" AND a.status = ");
            builder.push_bind(status);
        }

        builder.push(" ORDER BY a.created_at DESC");
        builder
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommuneQuery {
    pub restricted_to: Option<i32>,
    pub region: Option<String>,
    pub search: Option<String>,
    pub has_coordinates: Option<bool>,
}

impl CommuneQuery {
    pub fn build(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT * FROM communes WHERE TRUE");

        if let Some(commune_id) = self.restricted_to {
            builder.push(" AND id = ");
            builder.push_bind(commune_id);
        }
        if let Some(region) = self.region.as_deref().filter(|r| !r.trim().is_empty()) {
            builder.push(" AND region ILIKE ");
            builder.push_bind(region.trim().to_string());
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(search);
            builder.push(" AND (nom ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR region ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        match self.has_coordinates {
            Some(true) => {
                builder.push(" AND latitude IS NOT NULL AND longitude IS NOT NULL");
            }
            Some(false) => {
                builder.push(" AND (latitude IS NULL OR longitude IS NULL)");
            }
            None => {}
        }

        builder.push(" ORDER BY nom");
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::UserRole;

    fn actor(role: UserRole, commune_id: Option<i32>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            commune_id,
        }
    }

    #[test]
    fn test_anonymous_listing_is_public_only() {
        let query = SignalementQuery::for_actor(None, SignalementFilters::default()).unwrap();
        let builder = query.build();
        let sql = builder.sql();
        assert!(sql.contains("AND s.statut = $1"));
        assert!(!sql.contains("utilisateur_id ="));
        assert!(sql.ends_with("ORDER BY s.date_signalement DESC"));
    }

    #[test]
    fn test_citizen_sees_public_or_own_and_loses_privileged_filters() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let filters = SignalementFilters {
            statut: Some(SignalementStatus::Pending),
            utilisateur_id: Some(Uuid::new_v4()),
            commune_id: Some(3),
            ..Default::default()
        };
        let query = SignalementQuery::for_actor(Some(&citizen), filters).unwrap();
        assert_eq!(query.scope(), SignalementScope::PublicOrOwner(citizen.id));

        let builder = query.build();
        let sql = builder.sql();
        assert!(sql.contains("(s.statut = $1 OR s.utilisateur_id = $2)"));
        assert!(sql.contains("AND s.statut = $3"));
        assert!(!sql.contains("s.commune_id ="));
    }

    #[test]
    fn test_ctd_listing_is_commune_scoped_with_filters_kept() {
        let ctd = actor(UserRole::Ctd, Some(2));
        let filters = SignalementFilters {
            type_signalement: Some(SignalementType::Climate),
            commune_id: Some(2),
            ..Default::default()
        };
        let builder = SignalementQuery::for_actor(Some(&ctd), filters).unwrap().build();
        let sql = builder.sql();
        assert!(sql.contains("(s.commune_id = $1 OR s.utilisateur_id = $2)"));
        assert!(sql.contains("AND s.type_signalement = $3"));
        assert!(sql.contains("AND s.commune_id = $4"));
    }

    #[test]
    fn test_ctd_without_commune_cannot_list() {
        let ctd = actor(UserRole::Ctd, None);
        assert_eq!(
            SignalementQuery::for_actor(Some(&ctd), SignalementFilters::default()).err(),
            Some(PolicyError::NoCommune)
        );
    }

    #[test]
    fn test_admin_listing_has_no_role_filter() {
        let admin = actor(UserRole::Administrator, None);
        let builder = SignalementQuery::for_actor(Some(&admin), SignalementFilters::default())
            .unwrap()
            .within_commune(4)
            .build();
        let sql = builder.sql();
        assert!(sql.contains("WHERE TRUE AND s.commune_id = $1"));
    }

    #[test]
    fn test_own_reports_query_filters_by_owner_only() {
        let owner = Uuid::new_v4();
        let builder = SignalementQuery::owned_by(owner, SignalementFilters::default()).build();
        let sql = builder.sql();
        assert!(sql.contains("WHERE TRUE AND s.utilisateur_id = $1"));
        assert!(!sql.contains("s.statut ="));
    }

    #[test]
    fn test_stats_scope() {
        let global = signalement_counts(CommuneScope::All);
        assert!(!global.sql().contains("commune_id"));
        let local = signalement_counts(CommuneScope::Commune(1));
        assert!(local.sql().contains("AND s.commune_id = $1 GROUP BY"));
    }

    #[test]
    fn test_project_listing_ignores_commune_filter_for_non_admins() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let filters = ProjectFilters {
            commune_id: Some(9),
            search: Some("pont".to_string()),
            ..Default::default()
        };
        let builder = ProjectQuery::for_actor(&citizen, filters).unwrap().build();
        let sql = builder.sql();
        assert!(sql.contains("AND p.commune_id = $1"));
        assert!(!sql.contains("$4"));
        assert!(sql.contains("p.title ILIKE $2 OR p.description ILIKE $3"));

        assert_eq!(
            ProjectQuery::for_actor(&actor(UserRole::Citizen, None), ProjectFilters::default())
                .err(),
            Some(PolicyError::NoCommune)
        );
    }

    #[test]
    fn test_admin_project_listing_honours_commune_filter() {
        let admin = actor(UserRole::Administrator, None);
        let filters = ProjectFilters {
            commune_id: Some(3),
            status: Some(ProjectStatus::Completed),
            ..Default::default()
        };
        let builder = ProjectQuery::for_actor(&admin, filters).unwrap().build();
        let sql = builder.sql();
        assert!(sql.contains("WHERE TRUE AND p.commune_id = $1 AND p.status = $2"));
    }

    #[test]
    fn test_accountability_listing_scopes() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let builder = AccountabilityQuery::for_actor(&citizen, AccountabilityFilters::default())
            .unwrap()
            .build();
        assert!(builder.sql().contains("AND a.citizen_id = $1"));

        let ctd = actor(UserRole::Ctd, Some(1));
        let builder = AccountabilityQuery::for_actor(
            &ctd,
            AccountabilityFilters {
                status: Some(AccountabilityStatus::Pending),
                ..Default::default()
            },
        )
        .unwrap()
        .build();
        assert!(builder.sql().contains("AND p.commune_id = $1 AND a.status = $2"));
    }

    #[test]
    fn test_commune_query_filters() {
        let query = CommuneQuery {
            restricted_to: Some(1),
            search: Some("baf".to_string()),
            has_coordinates: Some(true),
            ..Default::default()
        };
        let builder = query.build();
        let sql = builder.sql();
        assert!(sql.contains("AND id = $1"));
        assert!(sql.contains("(nom ILIKE $2 OR region ILIKE $3)"));
        assert!(sql.contains("latitude IS NOT NULL AND longitude IS NOT NULL"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
