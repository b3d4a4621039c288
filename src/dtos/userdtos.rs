use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    models::usermodel::{User, UserRole},
    utils::{
        otp_generator::VERIFICATION_CODE_LENGTH, password::MAX_PASSWORD_LENGTH, token::TokenPair,
    },
};

fn validate_self_assignable_role(role: &UserRole) -> Result<(), ValidationError> {
    if role.is_self_assignable() {
        Ok(())
    } else {
        Err(ValidationError::new("role_not_allowed"))
    }
}

fn validate_numeric_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("code_not_numeric"))
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(min = 1, max = 150, message = "Nom is required"))]
    pub nom: String,

    #[validate(length(min = 1, max = 150, message = "Prenom is required"))]
    pub prenom: String,

    #[validate(length(max = 15, message = "Telephone must not exceed 15 characters"))]
    pub telephone: Option<String>,

    #[validate(custom = "validate_self_assignable_role")]
    pub role: Option<UserRole>,

    pub commune: Option<i32>,

    #[validate(length(
        min = 6,
        max = "MAX_PASSWORD_LENGTH",
        message = "Password must be between 6 and 64 characters"
    ))]
    pub password: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct VerifyAccountDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,

    #[validate(
        length(equal = "VERIFICATION_CODE_LENGTH", message = "Code must be 6 digits"),
        custom = "validate_numeric_code"
    )]
    pub code: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResendCodeDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LogoutDto {
    #[serde(alias = "refresh")]
    pub refresh_token: Option<String>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefreshTokenDto {
    #[serde(alias = "refresh_token")]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterUserDto {
    pub id: Uuid,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: String,
    pub role: UserRole,
    pub commune: Option<i32>,
    pub is_active: bool,
    pub is_verified: bool,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id,
            email: user.email.to_owned(),
            nom: user.nom.to_owned(),
            prenom: user.prenom.to_owned(),
            telephone: user.telephone.to_owned(),
            role: user.effective_role(),
            commune: user.commune_id,
            is_active: user.is_active,
            is_verified: user.is_verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginData {
    pub user: FilterUserDto,
    pub token: TokenPair,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub message: String,
    pub data: LoginData,
}

#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}
