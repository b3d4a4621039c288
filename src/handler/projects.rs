use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        listing::{AccountabilityQuery, ProjectQuery},
        projectdb::{NewProject, ProjectExt},
    },
    dtos::projectdtos::{
        AccountabilityQueryParams, AccountabilityView, CommentDto, CommentView,
        CreateAccountabilityDto, CreateProjectDto, ProjectDetailView, ProjectQueryParams,
        ProjectView, RespondAccountabilityDto, UpdateProjectDto,
    },
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware},
    models::{
        projectmodel::{
            AccountabilityError, AccountabilityWithRelations, Project, ProjectChanges,
            ProjectWithRelations,
        },
        usermodel::UserRole,
    },
    service::{
        policy::{self, Action, Actor, CommuneScope, PolicyError, ResourceScope},
        storage::{display_name, PROJECT_FILES_FOLDER},
    },
    AppState,
};

const MAX_PROJECT_FILE_BYTES: usize = 20 * 1024 * 1024;

pub fn projects_handler() -> Router {
    Router::new()
        .route(
            "/",
            get(list_projects).merge(post(create_project).layer(middleware::from_fn(
                |req, next| role_check(req, next, vec![UserRole::Ctd, UserRole::Administrator]),
            ))),
        )
        .route("/accountability", get(list_accountability))
        .route("/accountability/create", post(create_accountability))
        .route("/accountability/:id", get(get_accountability))
        .route("/accountability/:id/respond", post(respond_accountability))
        .route("/accountability/:id/close", post(close_accountability))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/:id/file",
            post(upload_project_file).layer(DefaultBodyLimit::max(MAX_PROJECT_FILE_BYTES)),
        )
        .route("/:id/download", get(download_project_file))
        .route("/:id/comments", get(list_comments).post(create_comment))
        .route(
            "/:id/comments/:comment_id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
}

/// Projects are read by the members of their commune and by administrators.
fn ensure_project_visible(actor: &Actor, project_commune: i32) -> Result<(), PolicyError> {
    match policy::project_scope(actor)? {
        CommuneScope::All => Ok(()),
        CommuneScope::Commune(own) if own == project_commune => Ok(()),
        CommuneScope::Commune(_) => Err(PolicyError::Forbidden),
    }
}

fn manage_scope(project_commune: i32) -> ResourceScope {
    ResourceScope {
        commune_id: Some(project_commune),
        ..ResourceScope::default()
    }
}

/// A CTD always files projects under their own commune; an administrator
/// has to say which one.
fn commune_for_new_project(actor: &Actor, requested: Option<i32>) -> Result<i32, HttpError> {
    if actor.is_admin() {
        return requested.ok_or_else(|| HttpError::bad_request("Commune is required"));
    }
    Ok(actor.require_commune()?)
}

fn accountability_error(error: AccountabilityError) -> HttpError {
    HttpError::bad_request(error.to_string())
}

async fn fetch_project(
    app_state: &AppState,
    project_id: Uuid,
) -> Result<ProjectWithRelations, HttpError> {
    app_state
        .db_client
        .get_project(project_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Project not found"))
}

async fn fetch_accountability(
    app_state: &AppState,
    accountability_id: Uuid,
) -> Result<AccountabilityWithRelations, HttpError> {
    app_state
        .db_client
        .get_accountability(accountability_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Accountability request not found"))
}

pub async fn list_projects(
    Query(params): Query<ProjectQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let query = ProjectQuery::for_actor(&user.actor(), params.filters())?;

    let projects = app_state
        .db_client
        .get_projects(&query)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let projects: Vec<ProjectView> = projects.iter().map(ProjectView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "results": projects.len(),
        "data": projects,
    })))
}

pub async fn create_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateProjectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let commune_id = commune_for_new_project(&actor, body.commune)?;
    policy::authorize(Some(&actor), Action::Manage, &manage_scope(commune_id))?;

    let project = app_state
        .db_client
        .create_project(NewProject {
            title: body.title.trim().to_string(),
            description: body.description,
            commune_id,
            status: body.status.unwrap_or_default(),
            start_date: body.start_date,
            end_date: body.end_date,
            budget: body.budget,
            avancement: body.avancement.unwrap_or(0),
            created_by: actor.id,
        })
        .await?;

    tracing::info!("Project {} created in commune {} by {}", project.id, commune_id, actor.id);

    let row = fetch_project(&app_state, project.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": ProjectView::from(&row),
        })),
    ))
}

pub async fn get_project(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = fetch_project(&app_state, project_id).await?;
    ensure_project_visible(&user.actor(), row.project.commune_id)?;

    let comments = app_state
        .db_client
        .get_comments(project_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": ProjectDetailView::assemble(&row, &comments),
    })))
}

/// Checks the caller against the locked row, then merges the changes. Only
/// an administrator moves a project to another commune.
fn apply_project_update(
    actor: &Actor,
    project: &mut Project,
    changes: ProjectChanges,
) -> Result<(), HttpError> {
    policy::authorize(Some(actor), Action::Manage, &manage_scope(project.commune_id))?;

    if changes.touches_commune() && !actor.is_admin() {
        return Err(PolicyError::Forbidden.into());
    }

    project.apply_changes(changes);

    if !project.dates_consistent() {
        return Err(HttpError::bad_request("End date cannot be before start date"));
    }
    Ok(())
}

pub async fn update_project(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<UpdateProjectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let changes = body.changes();

    app_state
        .db_client
        .update_project_with(project_id, |project| {
            apply_project_update(&actor, project, changes)
        })
        .await?
        .ok_or_else(|| HttpError::not_found("Project not found"))?;

    let row = fetch_project(&app_state, project_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": ProjectView::from(&row),
    })))
}

pub async fn delete_project(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    let current = fetch_project(&app_state, project_id).await?;
    policy::authorize(Some(&actor), Action::Manage, &manage_scope(current.project.commune_id))?;

    let deleted = app_state
        .db_client
        .delete_project(project_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Project not found"))?;

    if let Some(file) = deleted.file.as_deref() {
        if let Err(e) = app_state.file_store.delete(file).await {
            tracing::warn!("Project {} deleted but its file {} remains: {}", project_id, file, e);
        }
    }

    tracing::info!("Project {} deleted by {}", project_id, actor.id);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_project_file(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    let current = fetch_project(&app_state, project_id).await?;
    policy::authorize(Some(&actor), Action::Manage, &manage_scope(current.project.commune_id))?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("file").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| HttpError::bad_request(e.to_string()))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| HttpError::bad_request("File is required"))?;
    if bytes.is_empty() {
        return Err(HttpError::bad_request("File is empty"));
    }

    let reference = app_state
        .file_store
        .save(PROJECT_FILES_FOLDER, &filename, &bytes)
        .await?;

    let previous = match app_state
        .db_client
        .replace_project_file(project_id, reference.clone())
        .await
    {
        Ok(Some(previous)) => previous,
        outcome => {
            if let Err(e) = app_state.file_store.delete(&reference).await {
                tracing::warn!("Could not discard orphaned upload {}: {}", reference, e);
            }
            return match outcome {
                Err(e) => Err(HttpError::server_error(e.to_string())),
                _ => Err(HttpError::not_found("Project not found")),
            };
        }
    };

    if let Some(previous) = previous.filter(|p| p != &reference) {
        if let Err(e) = app_state.file_store.delete(&previous).await {
            tracing::warn!("Replaced file {} could not be removed: {}", previous, e);
        }
    }

    tracing::info!("File {} attached to project {}", reference, project_id);

    let row = fetch_project(&app_state, project_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": ProjectView::from(&row),
    })))
}

pub async fn download_project_file(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = fetch_project(&app_state, project_id).await?;
    ensure_project_visible(&user.actor(), row.project.commune_id)?;

    let reference = row
        .project
        .file
        .ok_or_else(|| HttpError::not_found("No file attached to this project"))?;

    let bytes = app_state.file_store.read(&reference).await?;

    let content_type = mime_guess::from_path(&reference).first_or_octet_stream();
    let disposition = format!("attachment; filename=\"{}\"", display_name(&reference));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .map_err(|e| HttpError::server_error(e.to_string()))?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|e| HttpError::server_error(e.to_string()))?,
    );

    Ok((headers, bytes))
}

pub async fn list_comments(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = fetch_project(&app_state, project_id).await?;

    let comments = if policy::comments_visible(&user.actor(), row.project.commune_id) {
        app_state
            .db_client
            .get_comments(project_id)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?
    } else {
        Vec::new()
    };

    let comments: Vec<CommentView> = comments.iter().map(CommentView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "results": comments.len(),
        "data": comments,
    })))
}

pub async fn create_comment(
    Path(project_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let row = fetch_project(&app_state, project_id).await?;
    policy::authorize(Some(&actor), Action::Create, &manage_scope(row.project.commune_id))?;

    let comment = app_state
        .db_client
        .create_comment(project_id, actor.id, body.text.trim().to_string())
        .await?;

    let comment = app_state
        .db_client
        .get_comment(project_id, comment.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": CommentView::from(&comment),
        })),
    ))
}

pub async fn get_comment(
    Path((project_id, comment_id)): Path<(Uuid, Uuid)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = fetch_project(&app_state, project_id).await?;
    if !policy::comments_visible(&user.actor(), row.project.commune_id) {
        return Err(PolicyError::Forbidden.into());
    }

    let comment = app_state
        .db_client
        .get_comment(project_id, comment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    Ok(Json(json!({
        "status": "success",
        "data": CommentView::from(&comment),
    })))
}

pub async fn update_comment(
    Path((project_id, comment_id)): Path<(Uuid, Uuid)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let existing = app_state
        .db_client
        .get_comment(project_id, comment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    // Only the author rewrites their words, administrators included.
    if existing.comment.author_id != user.user.id {
        return Err(PolicyError::Forbidden.into());
    }

    app_state
        .db_client
        .update_comment(comment_id, body.text.trim().to_string())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    let comment = app_state
        .db_client
        .get_comment(project_id, comment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    Ok(Json(json!({
        "status": "success",
        "data": CommentView::from(&comment),
    })))
}

pub async fn delete_comment(
    Path((project_id, comment_id)): Path<(Uuid, Uuid)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let existing = app_state
        .db_client
        .get_comment(project_id, comment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Comment not found"))?;

    policy::authorize(
        Some(&user.actor()),
        Action::Delete,
        &ResourceScope {
            owner_id: Some(existing.comment.author_id),
            ..ResourceScope::default()
        },
    )?;

    let deleted = app_state
        .db_client
        .delete_comment(comment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !deleted {
        return Err(HttpError::not_found("Comment not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_accountability(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateAccountabilityDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let project = fetch_project(&app_state, body.project).await?;
    policy::authorize(Some(&actor), Action::Create, &manage_scope(project.project.commune_id))?;

    let request = app_state
        .db_client
        .create_accountability(body.project, actor.id, body.question.trim().to_string())
        .await?;

    tracing::info!(
        "Accountability request {} opened on project {} by {}",
        request.id,
        body.project,
        actor.id
    );

    let row = fetch_accountability(&app_state, request.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": AccountabilityView::from(&row),
        })),
    ))
}

pub async fn list_accountability(
    Query(params): Query<AccountabilityQueryParams>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let query = AccountabilityQuery::for_actor(&user.actor(), params.filters())?;

    let requests = app_state
        .db_client
        .get_accountabilities(&query)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let requests: Vec<AccountabilityView> = requests.iter().map(AccountabilityView::from).collect();

    Ok(Json(json!({
        "status": "success",
        "results": requests.len(),
        "data": requests,
    })))
}

fn accountability_scope_of(citizen_id: Uuid, project_commune: i32) -> ResourceScope {
    ResourceScope {
        owner_id: Some(citizen_id),
        commune_id: Some(project_commune),
        public: false,
    }
}

pub async fn get_accountability(
    Path(accountability_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let row = fetch_accountability(&app_state, accountability_id).await?;

    policy::authorize(
        Some(&user.actor()),
        Action::Read,
        &accountability_scope_of(row.accountability.citizen_id, row.project_commune_id),
    )?;

    Ok(Json(json!({
        "status": "success",
        "data": AccountabilityView::from(&row),
    })))
}

pub async fn respond_accountability(
    Path(accountability_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<RespondAccountabilityDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let actor = user.actor();
    let row = fetch_accountability(&app_state, accountability_id).await?;
    policy::authorize(
        Some(&actor),
        Action::Respond,
        &accountability_scope_of(row.accountability.citizen_id, row.project_commune_id),
    )?;

    let now = Utc::now();
    let response = body.response.trim().to_string();
    app_state
        .db_client
        .update_accountability_with(accountability_id, |request| {
            request
                .record_response(response, actor.id, now)
                .map_err(accountability_error)
        })
        .await?
        .ok_or_else(|| HttpError::not_found("Accountability request not found"))?;

    tracing::info!("Accountability request {} answered by {}", accountability_id, actor.id);

    let row = fetch_accountability(&app_state, accountability_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": AccountabilityView::from(&row),
    })))
}

pub async fn close_accountability(
    Path(accountability_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = user.actor();
    let row = fetch_accountability(&app_state, accountability_id).await?;

    if row.accountability.citizen_id != actor.id {
        policy::authorize(
            Some(&actor),
            Action::Respond,
            &accountability_scope_of(row.accountability.citizen_id, row.project_commune_id),
        )?;
    }

    app_state
        .db_client
        .update_accountability_with(accountability_id, |request| {
            request.close().map_err(accountability_error)
        })
        .await?
        .ok_or_else(|| HttpError::not_found("Accountability request not found"))?;

    let row = fetch_accountability(&app_state, accountability_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": AccountabilityView::from(&row),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::projectmodel::sample_project;

    fn actor(role: UserRole, commune_id: Option<i32>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            commune_id,
        }
    }

    #[test]
    fn test_projects_are_commune_private() {
        assert!(ensure_project_visible(&actor(UserRole::Citizen, Some(1)), 1).is_ok());
        assert_eq!(
            ensure_project_visible(&actor(UserRole::Ctd, Some(3)), 1),
            Err(PolicyError::Forbidden)
        );
        assert_eq!(
            ensure_project_visible(&actor(UserRole::Citizen, None), 1),
            Err(PolicyError::NoCommune)
        );
        assert!(ensure_project_visible(&actor(UserRole::Administrator, None), 1).is_ok());
    }

    #[test]
    fn test_ctd_of_other_commune_cannot_manage_project() {
        let bafoussam = actor(UserRole::Ctd, Some(1));
        let mandjou = actor(UserRole::Ctd, Some(3));
        assert!(policy::authorize(Some(&bafoussam), Action::Manage, &manage_scope(1)).is_ok());
        assert_eq!(
            policy::authorize(Some(&mandjou), Action::Manage, &manage_scope(1)),
            Err(PolicyError::Forbidden)
        );
        assert_eq!(
            policy::authorize(
                Some(&actor(UserRole::Citizen, Some(1))),
                Action::Manage,
                &manage_scope(1)
            ),
            Err(PolicyError::Forbidden)
        );
    }

    #[test]
    fn test_new_project_commune() {
        let ctd = actor(UserRole::Ctd, Some(2));
        assert_eq!(commune_for_new_project(&ctd, Some(5)).unwrap(), 2);
        assert!(commune_for_new_project(&actor(UserRole::Ctd, None), None).is_err());

        let admin = actor(UserRole::Administrator, None);
        assert_eq!(commune_for_new_project(&admin, Some(5)).unwrap(), 5);
        assert_eq!(
            commune_for_new_project(&admin, None).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_project_update_checks_the_locked_row() {
        let ctd = actor(UserRole::Ctd, Some(1));
        let mut project = sample_project(1);
        let rename = ProjectChanges {
            title: Some("Forage bis".to_string()),
            ..ProjectChanges::default()
        };
        apply_project_update(&ctd, &mut project, rename.clone()).unwrap();
        assert_eq!(project.title, "Forage bis");

        // Moved to another commune before this writer got the lock.
        let mut moved = sample_project(3);
        let err = apply_project_update(&ctd, &mut moved, rename).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(moved.title, "Forage");
    }

    #[test]
    fn test_project_update_commune_and_dates() {
        let ctd = actor(UserRole::Ctd, Some(1));
        let move_commune = ProjectChanges {
            commune_id: Some(2),
            ..ProjectChanges::default()
        };
        let err = apply_project_update(&ctd, &mut sample_project(1), move_commune.clone())
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let admin = actor(UserRole::Administrator, None);
        let mut project = sample_project(1);
        apply_project_update(&admin, &mut project, move_commune).unwrap();
        assert_eq!(project.commune_id, 2);

        let late_start = ProjectChanges {
            start_date: Some(NaiveDate::from_ymd_opt(2026, 1, 1)),
            ..ProjectChanges::default()
        };
        let err = apply_project_update(&admin, &mut project, late_start).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_only_commune_ctd_responds() {
        let citizen = Uuid::new_v4();
        let scope = accountability_scope_of(citizen, 1);
        let responds = |role, commune| {
            policy::authorize(Some(&actor(role, commune)), Action::Respond, &scope).is_ok()
        };
        assert!(responds(UserRole::Ctd, Some(1)));
        assert!(!responds(UserRole::Ctd, Some(2)));
        assert!(!responds(UserRole::Administrator, None));
    }

    #[test]
    fn test_requester_reads_own_accountability_request() {
        let mut requester = actor(UserRole::Citizen, Some(1));
        let scope = accountability_scope_of(requester.id, 1);
        assert!(policy::authorize(Some(&requester), Action::Read, &scope).is_ok());

        requester.id = Uuid::new_v4();
        assert!(policy::authorize(Some(&requester), Action::Read, &scope).is_err());
    }
}
