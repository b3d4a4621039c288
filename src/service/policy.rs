//! Role and commune scoped access rules shared by every handler.
//!
//! Everything here is pure: callers resolve the actor and the resource's
//! ownership/commune/visibility, then ask for a decision or a listing scope.
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::{User, UserRole},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
    pub commune_id: Option<i32>,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Actor {
            id: user.id,
            role: user.effective_role(),
            commune_id: user.commune_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Administrator
    }

    pub fn is_ctd(&self) -> bool {
        self.role == UserRole::Ctd
    }

    fn shares_commune(&self, commune_id: Option<i32>) -> bool {
        matches!((self.commune_id, commune_id), (Some(mine), Some(theirs)) if mine == theirs)
    }

    /// The actor's commune, or the explicit "no commune" refusal.
    pub fn require_commune(&self) -> Result<i32, PolicyError> {
        self.commune_id.ok_or(PolicyError::NoCommune)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    /// Editing the descriptive fields of a report or a comment's text.
    Edit,
    ChangeStatus,
    Delete,
    /// Project create/update/delete and file attachment.
    Manage,
    Respond,
}

impl Action {
    fn is_commune_scoped(&self) -> bool {
        !matches!(self, Action::Delete)
    }
}

/// What the policy needs to know about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceScope {
    pub owner_id: Option<Uuid>,
    pub commune_id: Option<i32>,
    pub public: bool,
}

impl ResourceScope {
    fn is_owned_by(&self, actor: &Actor) -> bool {
        self.owner_id == Some(actor.id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("no commune assigned")]
    NoCommune,

    #[error("forbidden")]
    Forbidden,
}

impl From<PolicyError> for HttpError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::Unauthenticated => {
                HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string())
            }
            PolicyError::NoCommune => {
                HttpError::forbidden(ErrorMessage::NoCommuneAssigned.to_string())
            }
            PolicyError::Forbidden => {
                HttpError::forbidden(ErrorMessage::PermissionDenied.to_string())
            }
        }
    }
}

pub fn can_access(actor: Option<&Actor>, action: Action, resource: &ResourceScope) -> bool {
    let Some(actor) = actor else {
        return action == Action::Read && resource.public;
    };

    if action == Action::Read && resource.is_owned_by(actor) {
        return true;
    }

    // Responding is the commune official's job, staff included or not.
    if action == Action::Respond {
        return actor.is_ctd() && actor.shares_commune(resource.commune_id);
    }

    if actor.is_admin() {
        return true;
    }

    let same_commune = actor.shares_commune(resource.commune_id);
    match action {
        Action::Read => {
            if actor.is_ctd() {
                same_commune
            } else {
                resource.public
            }
        }
        Action::Create => resource.commune_id.is_none() || same_commune,
        Action::Edit => resource.is_owned_by(actor) || (actor.is_ctd() && same_commune),
        Action::ChangeStatus | Action::Manage => actor.is_ctd() && same_commune,
        Action::Delete => resource.is_owned_by(actor),
        Action::Respond => false,
    }
}

/// Same decision as [`can_access`], with the reason for a refusal.
pub fn authorize(
    actor: Option<&Actor>,
    action: Action,
    resource: &ResourceScope,
) -> Result<(), PolicyError> {
    if can_access(actor, action, resource) {
        return Ok(());
    }

    let Some(actor) = actor else {
        return Err(PolicyError::Unauthenticated);
    };

    if !actor.is_admin()
        && actor.commune_id.is_none()
        && resource.commune_id.is_some()
        && action.is_commune_scoped()
    {
        return Err(PolicyError::NoCommune);
    }

    Err(PolicyError::Forbidden)
}

/// Which incident reports a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalementScope {
    All,
    CommuneOrOwner { commune_id: i32, owner_id: Uuid },
    PublicOrOwner(Uuid),
    Public,
}

pub fn signalement_scope(actor: Option<&Actor>) -> Result<SignalementScope, PolicyError> {
    let Some(actor) = actor else {
        return Ok(SignalementScope::Public);
    };

    match actor.role {
        UserRole::Administrator => Ok(SignalementScope::All),
        UserRole::Ctd => Ok(SignalementScope::CommuneOrOwner {
            commune_id: actor.require_commune()?,
            owner_id: actor.id,
        }),
        UserRole::Citizen | UserRole::Ngo | UserRole::Enterprise => {
            Ok(SignalementScope::PublicOrOwner(actor.id))
        }
    }
}

/// Filtering by submitter or by commune is reserved to privileged roles.
pub fn may_use_privileged_filters(actor: Option<&Actor>) -> bool {
    actor.map_or(false, |a| a.is_admin() || a.is_ctd())
}

/// Aggregation scope shared by statistics and the admin-wide views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommuneScope {
    All,
    Commune(i32),
}

pub fn statistics_scope(actor: Option<&Actor>) -> Result<CommuneScope, PolicyError> {
    let actor = actor.ok_or(PolicyError::Unauthenticated)?;
    match actor.role {
        UserRole::Administrator => Ok(CommuneScope::All),
        UserRole::Ctd => Ok(CommuneScope::Commune(actor.require_commune()?)),
        _ => Err(PolicyError::Forbidden),
    }
}

/// Projects are commune-private: everyone but an administrator sees only
/// their own commune, and a caller without one is refused outright.
pub fn project_scope(actor: &Actor) -> Result<CommuneScope, PolicyError> {
    if actor.is_admin() {
        Ok(CommuneScope::All)
    } else {
        Ok(CommuneScope::Commune(actor.require_commune()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountabilityScope {
    All,
    Commune(i32),
    Citizen(Uuid),
}

pub fn accountability_scope(actor: &Actor) -> Result<AccountabilityScope, PolicyError> {
    match actor.role {
        UserRole::Administrator => Ok(AccountabilityScope::All),
        UserRole::Ctd => Ok(AccountabilityScope::Commune(actor.require_commune()?)),
        _ => Ok(AccountabilityScope::Citizen(actor.id)),
    }
}

/// Comment threads outside the caller's commune read as empty rather than
/// failing; writes there are refused by [`authorize`].
pub fn comments_visible(actor: &Actor, project_commune: i32) -> bool {
    actor.is_admin() || actor.commune_id == Some(project_commune)
}

/// A CTD only ever sees their own commune in the registry.
pub fn commune_listing_restriction(actor: &Actor) -> Option<i32> {
    if actor.is_ctd() {
        actor.commune_id
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: UserRole, commune_id: Option<i32>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            commune_id,
        }
    }

    fn report(owner: Uuid, commune_id: i32, public: bool) -> ResourceScope {
        ResourceScope {
            owner_id: Some(owner),
            commune_id: Some(commune_id),
            public,
        }
    }

    #[test]
    fn test_ctd_is_confined_to_own_commune() {
        let ctd = actor(UserRole::Ctd, Some(1));
        let local = report(Uuid::new_v4(), 1, false);
        let foreign = report(Uuid::new_v4(), 3, true);

        assert!(can_access(Some(&ctd), Action::Read, &local));
        assert!(can_access(Some(&ctd), Action::ChangeStatus, &local));
        assert!(!can_access(Some(&ctd), Action::Read, &foreign));
        assert_eq!(
            authorize(Some(&ctd), Action::ChangeStatus, &foreign),
            Err(PolicyError::Forbidden)
        );
    }

    #[test]
    fn test_owner_always_reads_own_report() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let mine = report(citizen.id, 4, false);
        assert!(can_access(Some(&citizen), Action::Read, &mine));

        let ctd = actor(UserRole::Ctd, Some(1));
        let ctd_own_elsewhere = report(ctd.id, 3, false);
        assert!(can_access(Some(&ctd), Action::Read, &ctd_own_elsewhere));
    }

    #[test]
    fn test_citizen_reads_only_public_reports_of_others() {
        let citizen = actor(UserRole::Citizen, Some(1));
        assert!(can_access(Some(&citizen), Action::Read, &report(Uuid::new_v4(), 1, true)));
        assert!(!can_access(Some(&citizen), Action::Read, &report(Uuid::new_v4(), 1, false)));
        assert!(can_access(None, Action::Read, &report(Uuid::new_v4(), 2, true)));
        assert_eq!(
            authorize(None, Action::Read, &report(Uuid::new_v4(), 2, false)),
            Err(PolicyError::Unauthenticated)
        );
    }

    #[test]
    fn test_citizen_cannot_change_status_even_on_own_report() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let mine = report(citizen.id, 1, false);
        assert!(can_access(Some(&citizen), Action::Edit, &mine));
        assert!(can_access(Some(&citizen), Action::Delete, &mine));
        assert!(!can_access(Some(&citizen), Action::ChangeStatus, &mine));
    }

    #[test]
    fn test_admin_is_unrestricted_but_does_not_respond() {
        let admin = actor(UserRole::Administrator, None);
        let resource = report(Uuid::new_v4(), 5, false);
        for action in [
            Action::Read,
            Action::Edit,
            Action::ChangeStatus,
            Action::Delete,
            Action::Manage,
        ] {
            assert!(can_access(Some(&admin), action, &resource));
        }
        assert!(!can_access(Some(&admin), Action::Respond, &resource));
    }

    #[test]
    fn test_commune_scoped_writes_need_matching_commune() {
        let citizen = actor(UserRole::Citizen, Some(1));
        let project_here = ResourceScope { owner_id: None, commune_id: Some(1), public: false };
        let project_there = ResourceScope { owner_id: None, commune_id: Some(2), public: false };
        assert!(can_access(Some(&citizen), Action::Create, &project_here));
        assert_eq!(
            authorize(Some(&citizen), Action::Create, &project_there),
            Err(PolicyError::Forbidden)
        );

        let homeless = actor(UserRole::Citizen, None);
        assert_eq!(
            authorize(Some(&homeless), Action::Create, &project_here),
            Err(PolicyError::NoCommune)
        );
        let unscoped = ResourceScope::default();
        assert!(can_access(Some(&homeless), Action::Create, &unscoped));
    }

    #[test]
    fn test_project_management_is_ctd_of_the_commune() {
        let project = ResourceScope { owner_id: None, commune_id: Some(1), public: false };
        assert!(can_access(Some(&actor(UserRole::Ctd, Some(1))), Action::Manage, &project));
        assert!(!can_access(Some(&actor(UserRole::Ctd, Some(3))), Action::Manage, &project));
        assert!(!can_access(Some(&actor(UserRole::Ngo, Some(1))), Action::Manage, &project));
        assert!(can_access(Some(&actor(UserRole::Ctd, Some(1))), Action::Respond, &project));
        assert!(!can_access(Some(&actor(UserRole::Ctd, Some(3))), Action::Respond, &project));
    }

    #[test]
    fn test_listing_scopes_by_role() {
        assert_eq!(signalement_scope(None), Ok(SignalementScope::Public));

        let admin = actor(UserRole::Administrator, None);
        assert_eq!(signalement_scope(Some(&admin)), Ok(SignalementScope::All));

        let ctd = actor(UserRole::Ctd, Some(2));
        assert_eq!(
            signalement_scope(Some(&ctd)),
            Ok(SignalementScope::CommuneOrOwner { commune_id: 2, owner_id: ctd.id })
        );
        assert_eq!(
            signalement_scope(Some(&actor(UserRole::Ctd, None))),
            Err(PolicyError::NoCommune)
        );

        let enterprise = actor(UserRole::Enterprise, Some(2));
        assert_eq!(
            signalement_scope(Some(&enterprise)),
            Ok(SignalementScope::PublicOrOwner(enterprise.id))
        );
        assert!(!may_use_privileged_filters(Some(&enterprise)));
        assert!(may_use_privileged_filters(Some(&ctd)));
    }

    #[test]
    fn test_statistics_are_forbidden_to_citizens() {
        assert_eq!(
            statistics_scope(Some(&actor(UserRole::Citizen, Some(1)))),
            Err(PolicyError::Forbidden)
        );
        assert_eq!(
            statistics_scope(Some(&actor(UserRole::Ctd, Some(1)))),
            Ok(CommuneScope::Commune(1))
        );
        assert_eq!(
            statistics_scope(Some(&actor(UserRole::Administrator, None))),
            Ok(CommuneScope::All)
        );
        assert_eq!(statistics_scope(None), Err(PolicyError::Unauthenticated));
    }

    #[test]
    fn test_project_and_accountability_scopes() {
        assert_eq!(
            project_scope(&actor(UserRole::Citizen, None)),
            Err(PolicyError::NoCommune)
        );
        assert_eq!(
            project_scope(&actor(UserRole::Citizen, Some(4))),
            Ok(CommuneScope::Commune(4))
        );

        let citizen = actor(UserRole::Citizen, Some(4));
        assert_eq!(
            accountability_scope(&citizen),
            Ok(AccountabilityScope::Citizen(citizen.id))
        );
        assert_eq!(
            accountability_scope(&actor(UserRole::Ctd, Some(4))),
            Ok(AccountabilityScope::Commune(4))
        );
    }

    #[test]
    fn test_comment_threads_soft_deny_outsiders() {
        assert!(comments_visible(&actor(UserRole::Citizen, Some(1)), 1));
        assert!(!comments_visible(&actor(UserRole::Citizen, Some(2)), 1));
        assert!(!comments_visible(&actor(UserRole::Citizen, None), 1));
        assert!(comments_visible(&actor(UserRole::Administrator, None), 1));
    }

    #[test]
    fn test_policy_errors_map_to_http_statuses() {
        use axum::http::StatusCode;
        assert_eq!(HttpError::from(PolicyError::Unauthenticated).status, StatusCode::UNAUTHORIZED);
        assert_eq!(HttpError::from(PolicyError::NoCommune).status, StatusCode::FORBIDDEN);
        assert_eq!(HttpError::from(PolicyError::Forbidden).status, StatusCode::FORBIDDEN);
    }
}
