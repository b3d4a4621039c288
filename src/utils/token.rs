use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::UserRole,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: UserRole,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn create_token(
    user_id: &str,
    role: UserRole,
    token_type: TokenType,
    secret: &[u8],
    expires_in: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    if user_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + expires_in).timestamp() as usize;
    let claims = TokenClaims {
        sub: user_id.to_string(),
        role,
        token_type,
        jti: Uuid::new_v4().to_string(),
        iat,
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Issues the access/refresh pair handed out at login.
pub fn create_token_pair(
    user_id: &str,
    role: UserRole,
    secret: &[u8],
    access_minutes: i64,
    refresh_days: i64,
) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access: create_token(
            user_id,
            role,
            TokenType::Access,
            secret,
            Duration::minutes(access_minutes),
        )?,
        refresh: create_token(
            user_id,
            role,
            TokenType::Refresh,
            secret,
            Duration::days(refresh_days),
        )?,
    })
}

pub fn decode_token<T: Into<String>>(
    token: T,
    secret: &[u8],
    expected: TokenType,
) -> Result<TokenClaims, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) if token.claims.token_type == expected => Ok(token.claims),
        _ => Err(HttpError::unauthorized(ErrorMessage::InvalidToken.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"a-test-secret";

    #[test]
    fn test_access_token_round_trip_keeps_identity() {
        let user_id = Uuid::new_v4().to_string();
        let token =
            create_token(&user_id, UserRole::Ctd, TokenType::Access, SECRET, Duration::minutes(5))
                .unwrap();
        let claims = decode_token(token, SECRET, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, UserRole::Ctd);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let pair = create_token_pair("42", UserRole::Citizen, SECRET, 5, 1).unwrap();
        assert!(decode_token(pair.refresh.clone(), SECRET, TokenType::Access).is_err());
        assert!(decode_token(pair.refresh, SECRET, TokenType::Refresh).is_ok());
    }

    #[test]
    fn test_expired_or_foreign_tokens_are_rejected() {
        let expired =
            create_token("42", UserRole::Citizen, TokenType::Access, SECRET, Duration::minutes(-10))
                .unwrap();
        assert!(decode_token(expired, SECRET, TokenType::Access).is_err());

        let foreign =
            create_token("42", UserRole::Citizen, TokenType::Access, b"other", Duration::minutes(5))
                .unwrap();
        assert!(decode_token(foreign, SECRET, TokenType::Access).is_err());
        assert!(decode_token("not.a.token", SECRET, TokenType::Access).is_err());
    }

    #[test]
    fn test_empty_subject_is_refused() {
        let empty_subject =
            create_token("", UserRole::Citizen, TokenType::Access, SECRET, Duration::minutes(5));
        assert!(empty_subject.is_err());
    }
}
