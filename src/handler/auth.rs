use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use validator::Validate;

use crate::{
    db::{
        cache::{OnLookupError, TokenBlacklistExt},
        userdb::{NewUser, UserExt},
    },
    dtos::userdtos::{
        FilterUserDto, LoginData, LoginUserDto, LogoutDto, RefreshTokenDto, RegisterUserDto,
        ResendCodeDto, Response, UserData, UserLoginResponseDto, UserResponseDto,
        VerifyAccountDto,
    },
    error::{ErrorMessage, HttpError},
    mail::mails::send_verification_email,
    middleware::{auth, extract_token, JWTAuthMiddeware},
    models::usermodel::{normalize_email, User, VerificationError},
    utils::{
        otp_generator::generate_otp,
        password,
        token::{self, TokenClaims, TokenType},
    },
    AppState,
};

/// Verification codes stay valid for one hour.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 60;

pub fn auth_handler() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/verify", post(verify_account))
        .route("/resend-code", post(resend_code))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/token/refresh", post(refresh_token))
        .route("/me", get(get_me).layer(axum::middleware::from_fn(auth)))
}

fn token_cookie(value: String, max_age_minutes: i64) -> Cookie<'static> {
    Cookie::build(("token", value))
        .path("/")
        .max_age(time::Duration::minutes(max_age_minutes))
        .http_only(true)
        .build()
}

fn with_cookie(
    response: impl IntoResponse,
    cookie: Cookie<'static>,
) -> Result<axum::response::Response, HttpError> {
    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        cookie
            .to_string()
            .parse()
            .map_err(|_| HttpError::server_error("invalid cookie header"))?,
    );

    let mut response = response.into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

/// Fresh code and the instant it stops being accepted.
fn pending_verification(now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    (
        generate_otp(),
        now + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
    )
}

/// An inactive account is refused before the password is looked at.
fn check_login(user: &User, password_matched: bool) -> Result<(), HttpError> {
    if !user.is_active {
        return Err(HttpError::forbidden(ErrorMessage::InactiveAccount.to_string()));
    }
    if !password_matched {
        return Err(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()));
    }
    Ok(())
}

/// Seconds left before the credential expires on its own.
fn remaining_lifetime(claims: &TokenClaims) -> usize {
    let now = Utc::now().timestamp().max(0) as usize;
    claims.exp.saturating_sub(now)
}

pub async fn register(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let email = normalize_email(&body.email);

    let existing_user = app_state
        .db_client
        .get_user(None, Some(&email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if existing_user.is_some() {
        return Err(HttpError::unique_constraint_violation(
            ErrorMessage::EmailExist.to_string(),
        ));
    }

    let hashed_password =
        password::hash(&body.password).map_err(|e| HttpError::server_error(e.to_string()))?;

    let (code, code_expiration) = pending_verification(Utc::now());

    // Duplicate emails racing past the lookup and unknown communes surface
    // through the sqlx conversion (409 and 400).
    let user = app_state
        .db_client
        .save_user(NewUser {
            email,
            nom: body.nom.trim().to_string(),
            prenom: body.prenom.trim().to_string(),
            telephone: body.telephone.unwrap_or_default(),
            role: body.role.unwrap_or_default(),
            commune_id: body.commune,
            password_hash: hashed_password,
            verification_code: code.clone(),
            code_expiration,
        })
        .await?;

    if let Err(e) =
        send_verification_email(app_state.mailer.as_ref(), &user.email, &user.full_name(), &code)
            .await
    {
        tracing::warn!("Failed to send verification email to {}: {}", user.email, e);
    }

    tracing::info!("User {} registered, awaiting verification", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Account created. A verification code has been sent to your email.",
            "data": UserData { user: FilterUserDto::filter_user(&user) },
        })),
    ))
}

pub async fn verify_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<VerifyAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let email = normalize_email(&body.email);

    let user = app_state
        .db_client
        .get_user(None, Some(&email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::InvalidVerificationCode.to_string()))?;

    let code = body.code.clone();
    let now = Utc::now();
    let user = app_state
        .db_client
        .update_user_with(user.id, |user| {
            user.verify(&code, now).map_err(|e| match e {
                VerificationError::InvalidCode => {
                    HttpError::bad_request(ErrorMessage::InvalidVerificationCode.to_string())
                }
                VerificationError::Expired => {
                    HttpError::expired(ErrorMessage::VerificationCodeExpired.to_string())
                }
            })
        })
        .await?
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::InvalidVerificationCode.to_string()))?;

    tracing::info!("User {} verified", user.id);

    Ok(Json(json!({
        "status": "success",
        "message": "Account verified. You can now log in.",
        "data": UserData { user: FilterUserDto::filter_user(&user) },
    })))
}

pub async fn resend_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<ResendCodeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let email = normalize_email(&body.email);

    let pending = app_state
        .db_client
        .get_user(None, Some(&email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .filter(|user| !user.is_verified);

    if let Some(user) = pending {
        let (code, expires_at) = pending_verification(Utc::now());

        let reissued = app_state
            .db_client
            .reissue_verification_code(user.id, &code, expires_at)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;

        if let Some(user) = reissued {
            if let Err(e) = send_verification_email(
                app_state.mailer.as_ref(),
                &user.email,
                &user.full_name(),
                &code,
            )
            .await
            {
                tracing::warn!("Failed to resend verification email to {}: {}", user.email, e);
            }
        }
    }

    Ok(Json(Response {
        status: "success",
        message: "If an unverified account exists for this email, a new code has been sent."
            .to_string(),
    }))
}

pub async fn login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let email = normalize_email(&body.email);

    let result = app_state
        .db_client
        .get_user(None, Some(&email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = result.ok_or(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    let password_matched = password::compare(&body.password, &user.password).unwrap_or(false);
    check_login(&user, password_matched)?;

    let token = token::create_token_pair(
        &user.id.to_string(),
        user.effective_role(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
        app_state.env.jwt_refresh_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = token_cookie(token.access.clone(), app_state.env.jwt_maxage);

    let response = Json(UserLoginResponseDto {
        status: "success".to_string(),
        message: "Login successful".to_string(),
        data: LoginData {
            user: FilterUserDto::filter_user(&user),
            token,
        },
    });

    tracing::info!("User {} logged in", user.id);

    with_cookie(response, cookie)
}

/// Always succeeds: revocation is attempted, failures are only logged.
pub async fn logout(
    Extension(app_state): Extension<Arc<AppState>>,
    cookie_jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<LogoutDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let secret = app_state.env.jwt_secret.as_bytes();

    let refresh = body.and_then(|Json(dto)| dto.refresh_token);
    let presented = [
        refresh.map(|t| (t, TokenType::Refresh)),
        extract_token(&cookie_jar, &headers).map(|t| (t, TokenType::Access)),
    ];

    for (raw, token_type) in presented.into_iter().flatten() {
        match token::decode_token(raw, secret, token_type) {
            Ok(claims) => {
                if let Err(e) = app_state
                    .db_client
                    .blacklist_token(&claims.jti, remaining_lifetime(&claims))
                    .await
                {
                    tracing::warn!("Failed to revoke {:?} token {}: {}", token_type, claims.jti, e);
                }
            }
            Err(_) => tracing::debug!("Ignoring unusable {:?} token at logout", token_type),
        }
    }

    let cookie = token_cookie(String::new(), -1);

    with_cookie(
        Json(Response {
            status: "success",
            message: "Logged out".to_string(),
        }),
        cookie,
    )
}

pub async fn refresh_token(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RefreshTokenDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let secret = app_state.env.jwt_secret.as_bytes();
    let claims = token::decode_token(body.refresh, secret, TokenType::Refresh)?;

    if app_state
        .db_client
        .is_token_blacklisted(&claims.jti, OnLookupError::Deny)
        .await
    {
        return Err(HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()));
    }

    let user_id = uuid::Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    let user = app_state
        .db_client
        .get_user(Some(user_id), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    if !user.is_active {
        return Err(HttpError::unauthorized(ErrorMessage::InactiveAccount.to_string()));
    }

    let access = token::create_token(
        &user.id.to_string(),
        user.effective_role(),
        TokenType::Access,
        secret,
        Duration::minutes(app_state.env.jwt_maxage),
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = token_cookie(access.clone(), app_state.env.jwt_maxage);

    with_cookie(
        Json(json!({
            "status": "success",
            "data": { "access": access },
        })),
        cookie,
    )
}

pub async fn get_me(
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let filtered_user = FilterUserDto::filter_user(&user.user);

    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: filtered_user,
        },
    }))
}
