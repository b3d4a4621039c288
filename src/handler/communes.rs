use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use validator::Validate;

use crate::{
    db::{
        communedb::CommuneExt,
        listing::{CommuneQuery, SignalementQuery},
        signalementdb::SignalementExt,
    },
    dtos::{
        communedtos::{CommuneView, CreateCommuneDto, UpdateCommuneDto},
        signalementdtos::{SignalementDto, SignalementQueryParams},
    },
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware},
    models::{communemodel::CommuneQueryParams, usermodel::UserRole},
    service::{
        policy::{self, Actor, PolicyError, SignalementScope},
        storage::discard_files,
    },
    AppState,
};

pub fn communes_handler() -> Router {
    let admin_only = || {
        middleware::from_fn(|req, next| role_check(req, next, vec![UserRole::Administrator]))
    };

    Router::new()
        .route(
            "/",
            get(get_communes).merge(post(create_commune).layer(admin_only())),
        )
        .route("/me", get(get_my_commune))
        .route("/regions", get(get_regions))
        .route(
            "/:id",
            get(get_commune).merge(
                put(update_commune)
                    .delete(delete_commune)
                    .layer(admin_only()),
            ),
        )
        .route("/:id/signalements", get(get_commune_signalements))
}

pub async fn get_communes(
    Query(params): Query<CommuneQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    if actor.is_ctd() {
        actor.require_commune()?;
    }

    let query = CommuneQuery {
        restricted_to: policy::commune_listing_restriction(&actor),
        region: params.region,
        search: params.search,
        has_coordinates: params.has_coordinates,
    };

    let communes = app_state
        .db_client
        .get_communes(&query)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let communes: Vec<CommuneView> = communes.iter().map(CommuneView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "results": communes.len(),
        "data": communes,
    })))
}

pub async fn get_my_commune(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let commune_id = user.actor().require_commune()?;

    let commune = app_state
        .db_client
        .get_commune(commune_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Commune not found"))?;

    Ok(Json(json!({
        "status": "success",
        "data": CommuneView::from(&commune),
    })))
}

pub async fn get_regions(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let regions = app_state
        .db_client
        .get_regions()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": regions,
    })))
}

pub async fn get_commune(
    Path(commune_id): Path<i32>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let commune = app_state
        .db_client
        .get_commune(commune_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Commune not found"))?;

    let actor = user.actor();
    if let Some(own) = policy::commune_listing_restriction(&actor) {
        if own != commune.id {
            return Err(PolicyError::Forbidden.into());
        }
    }

    Ok(Json(json!({
        "status": "success",
        "data": CommuneView::from(&commune),
    })))
}

pub async fn create_commune(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateCommuneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let commune = app_state
        .db_client
        .create_commune(
            body.nom.trim().to_string(),
            body.region.trim().to_string(),
            body.latitude,
            body.longitude,
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    tracing::info!("Commune {} ({}) created", commune.id, commune.nom);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": CommuneView::from(&commune),
        })),
    ))
}

pub async fn update_commune(
    Path(commune_id): Path<i32>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<UpdateCommuneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let commune = app_state
        .db_client
        .update_commune(
            commune_id,
            body.nom.map(|n| n.trim().to_string()),
            body.region.map(|r| r.trim().to_string()),
            body.latitude,
            body.longitude,
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Commune not found"))?;

    Ok(Json(json!({
        "status": "success",
        "data": CommuneView::from(&commune),
    })))
}

pub async fn delete_commune(
    Path(commune_id): Path<i32>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let files = app_state
        .db_client
        .delete_commune(commune_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Commune not found"))?;

    let left = discard_files(app_state.file_store.as_ref(), &files).await;
    if left > 0 {
        tracing::warn!("Commune {} deleted, {} project files remain in storage", commune_id, left);
    }

    tracing::info!("Commune {} deleted", commune_id);

    Ok(StatusCode::NO_CONTENT)
}

/// A CTD asking for another commune's reports is refused; everyone else gets
/// their usual listing narrowed to the commune.
fn commune_signalements_query(
    actor: &Actor,
    commune_id: i32,
    params: &SignalementQueryParams,
) -> Result<SignalementQuery, PolicyError> {
    let query = SignalementQuery::for_actor(Some(actor), params.filters())?;
    if let SignalementScope::CommuneOrOwner { commune_id: own, .. } = query.scope() {
        if own != commune_id {
            return Err(PolicyError::Forbidden);
        }
    }
    Ok(query.within_commune(commune_id))
}

pub async fn get_commune_signalements(
    Path(commune_id): Path<i32>,
    Query(params): Query<SignalementQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let query = commune_signalements_query(&user.actor(), commune_id, &params)?;

    let exists = app_state
        .db_client
        .get_commune(commune_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .is_some();
    if !exists {
        return Err(HttpError::not_found("Commune not found"));
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn actor(role: UserRole, commune_id: Option<i32>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            commune_id,
        }
    }

    #[test]
    fn test_ctd_cannot_list_another_communes_reports() {
        let params = SignalementQueryParams::default();
        let ctd = actor(UserRole::Ctd, Some(1));
        assert!(commune_signalements_query(&ctd, 1, &params).is_ok());
        assert_eq!(
            commune_signalements_query(&ctd, 3, &params).unwrap_err(),
            PolicyError::Forbidden
        );
    }

    #[test]
    fn test_citizen_and_admin_listing_is_narrowed_to_commune() {
        let params = SignalementQueryParams::default();
        let citizen = actor(UserRole::Citizen, Some(1));
        let sql = commune_signalements_query(&citizen, 3, &params)
            .unwrap()
            .build()
            .sql()
            .to_string();
        assert!(sql.contains("s.commune_id = "));

        let admin = actor(UserRole::Administrator, None);
        assert!(commune_signalements_query(&admin, 3, &params).is_ok());
    }
}
