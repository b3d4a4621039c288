use std::sync::Arc;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handler::{
        auth::auth_handler, communes::communes_handler, photos::photos_handler,
        projects::projects_handler, signalements::signalements_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.env.allowed_origins);

    let api_route = Router::new()
        .route("/health", get(health_check))
        .nest("/accounts", auth_handler())
        .nest(
            "/communes",
            communes_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/signalements", signalements_handler())
        .nest(
            "/projects",
            projects_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/photos", photos_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db::DBClient,
        mail::sendmail::LogMailer,
        service::storage::LocalFileStore,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = Config::for_tests();
        let pool = sqlx::PgPool::connect_lazy(&config.database_url).unwrap();
        let state = AppState {
            file_store: Arc::new(LocalFileStore::new(config.media_root.clone())),
            env: config,
            db_client: DBClient::new(pool),
            mailer: Arc::new(LogMailer),
        };
        create_router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        for uri in [
            "/api/accounts/me",
            "/api/projects",
            "/api/communes",
            "/api/signalements/mes-signalements",
        ] {
            let response = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected_on_optional_routes() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/signalements/liste")
                    .header(AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_registration_is_a_bad_request() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/accounts/register")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"not-an-email","nom":"","prenom":"U","password":"123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_choices_need_no_account() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/signalements/choices")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_always_succeeds() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/accounts/logout")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"refresh":"garbage"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
