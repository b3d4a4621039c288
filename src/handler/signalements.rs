use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        listing::SignalementQuery,
        photodb::PhotoExt,
        signalementdb::{NewSignalement, SignalementExt},
    },
    dtos::signalementdtos::{
        CreateSignalementDto, SignalementChoicesDto, SignalementDto, SignalementQueryParams,
        UpdateSignalementDto, UpdateStatutDto,
    },
    error::HttpError,
    middleware::{auth, optional_auth, role_check, JWTAuthMiddeware},
    models::{
        signalementmodel::{Signalement, SignalementStats},
        usermodel::UserRole,
    },
    service::policy::{self, Action, Actor, CommuneScope, PolicyError, ResourceScope},
    AppState,
};

pub fn signalements_handler() -> Router {
    let public_routes = Router::new()
        .route("/liste", get(list_signalements))
        .route("/detail/:id", get(get_signalement))
        .route("/choices", get(get_choices))
        .layer(middleware::from_fn(optional_auth));

    let protected_routes = Router::new()
        .route("/create", post(create_signalement))
        .route("/mes-signalements", get(my_signalements))
        .route("/update/:id", put(update_signalement))
        .route(
            "/update-statut/:id",
            patch(update_statut).layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![UserRole::Ctd, UserRole::Administrator])
            })),
        )
        .route("/delete/:id", delete(delete_signalement))
        .route("/statistiques", get(get_statistics))
        .layer(middleware::from_fn(auth));

    Router::new().merge(public_routes).merge(protected_routes)
}

fn scope_of(signalement: &Signalement) -> ResourceScope {
    ResourceScope {
        owner_id: Some(signalement.utilisateur_id),
        commune_id: signalement.commune_id,
        public: signalement.statut.is_public(),
    }
}

/// Applies a field-level edit after checking who may touch which fields.
/// Submitters keep to the descriptive fields of a report still open; a CTD
/// of the report's commune may also move its status; only an administrator
/// may reassign its commune.
fn apply_update(
    actor: &Actor,
    signalement: &mut Signalement,
    changes: &UpdateSignalementDto,
    now: DateTime<Utc>,
) -> Result<(), HttpError> {
    let scope = scope_of(signalement);
    let privileged = policy::can_access(Some(actor), Action::ChangeStatus, &scope);

    if privileged {
        if changes.touches_commune() && !actor.is_admin() {
            return Err(PolicyError::Forbidden.into());
        }
    } else {
        policy::authorize(Some(actor), Action::Edit, &scope)?;
        if changes.touches_status() || changes.touches_commune() {
            return Err(PolicyError::Forbidden.into());
        }
        if !signalement.statut.is_open_for_owner_edits() {
            return Err(HttpError::forbidden(
                "This report can no longer be edited",
            ));
        }
    }

    signalement.apply_descriptive(changes.descriptive());
    signalement.apply_privileged(changes.privileged(), now);
    Ok(())
}

async fn ensure_photo_exists(
    app_state: &AppState,
    photo_id: Option<Uuid>,
) -> Result<(), HttpError> {
    let Some(photo_id) = photo_id else {
        return Ok(());
    };

    let exists = app_state
        .db_client
        .photo_exists(photo_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if exists {
        Ok(())
    } else {
        Err(HttpError::bad_request("Referenced photo does not exist"))
    }
}

async fn fetch_dto(
    app_state: &AppState,
    signalement_id: Uuid,
) -> Result<SignalementDto, HttpError> {
    let row = app_state
        .db_client
        .get_signalement(signalement_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?;

    Ok(SignalementDto::from_row(&row))
}

pub async fn create_signalement(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateSignalementDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    if body.commune.is_some() {
        policy::authorize(
            Some(&actor),
            Action::Create,
            &ResourceScope {
                commune_id: body.commune,
                ..ResourceScope::default()
            },
        )?;
    }

    ensure_photo_exists(&app_state, body.photo_id).await?;

    let signalement = app_state
        .db_client
        .create_signalement(NewSignalement {
            objet: body.objet.trim().to_string(),
            description: body.description,
            localisation: body.localisation.trim().to_string(),
            type_signalement: body.type_signalement,
            utilisateur_id: actor.id,
            photo_id: body.photo_id,
            commune_id: body.commune.or(actor.commune_id),
        })
        .await?;

    tracing::info!(
        "Signalement {} created by {} in commune {:?}",
        signalement.id,
        actor.id,
        signalement.commune_id
    );

    let dto = fetch_dto(&app_state, signalement.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": dto,
        })),
    ))
}

pub async fn list_signalements(
    Query(params): Query<SignalementQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    user: Option<Extension<JWTAuthMiddeware>>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.map(|Extension(u)| u.actor());
    let query = SignalementQuery::for_actor(actor.as_ref(), params.filters())?;

    let signalements = app_state
        .db_client
        .get_signalements(&query)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "results": signalements.len(),
        "data": SignalementDto::from_rows(&signalements),
    })))
}

pub async fn get_signalement(
    Path(signalement_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    user: Option<Extension<JWTAuthMiddeware>>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.map(|Extension(u)| u.actor());

    let row = app_state
        .db_client
        .get_signalement(signalement_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?;

    policy::authorize(actor.as_ref(), Action::Read, &scope_of(&row.signalement))?;

    Ok(Json(json!({
        "status": "success",
        "data": SignalementDto::from_row(&row),
    })))
}

pub async fn my_signalements(
    Query(params): Query<SignalementQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let query = SignalementQuery::owned_by(user.user.id, params.filters());

    let signalements = app_state
        .db_client
        .get_signalements(&query)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "results": signalements.len(),
        "data": SignalementDto::from_rows(&signalements),
    })))
}

pub async fn update_signalement(
    Path(signalement_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<UpdateSignalementDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let now = Utc::now();

    // Refuse callers before telling them anything about the photo; the
    // locked update below repeats the check against the committed row.
    let mut current = app_state
        .db_client
        .get_signalement(signalement_id)
        .await?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?
        .signalement;
    apply_update(&actor, &mut current, &body, now)?;

    ensure_photo_exists(&app_state, body.photo_id).await?;

    app_state
        .db_client
        .update_signalement_with(signalement_id, |signalement| {
            apply_update(&actor, signalement, &body, now)
        })
        .await?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?;

    let dto = fetch_dto(&app_state, signalement_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": dto,
    })))
}

pub async fn update_statut(
    Path(signalement_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<UpdateStatutDto>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    let now = Utc::now();

    let updated = app_state
        .db_client
        .update_signalement_with(signalement_id, |signalement| {
            policy::authorize(Some(&actor), Action::ChangeStatus, &scope_of(signalement))?;
            signalement.apply_privileged(body.privileged(), now);
            Ok::<(), HttpError>(())
        })
        .await?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?;

    tracing::info!(
        "Signalement {} moved to {} by {}",
        updated.id,
        updated.statut.code(),
        actor.id
    );

    let dto = fetch_dto(&app_state, signalement_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": dto,
    })))
}

pub async fn delete_signalement(
    Path(signalement_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = app_state
        .db_client
        .get_signalement(signalement_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Signalement not found"))?;

    let actor = user.actor();
    policy::authorize(Some(&actor), Action::Delete, &scope_of(&row.signalement))?;

    let deleted = app_state
        .db_client
        .delete_signalement(signalement_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !deleted {
        return Err(HttpError::not_found("Signalement not found"));
    }

    tracing::info!("Signalement {} deleted by {}", signalement_id, actor.id);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_choices() -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "data": SignalementChoicesDto::all(),
    }))
}

pub async fn get_statistics(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    let scope = policy::statistics_scope(Some(&actor))?;

    let counts = app_state
        .db_client
        .get_signalement_counts(scope)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let mut stats = SignalementStats::from_counts(&counts);

    if scope == CommuneScope::All {
        let by_commune = app_state
            .db_client
            .get_signalement_counts_by_commune()
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
        stats.par_commune = Some(by_commune.into_iter().collect::<BTreeMap<_, _>>());
    }

    Ok(Json(json!({
        "status": "success",
        "data": stats,
    })))
}
