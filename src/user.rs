use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::normalization;
use crate::place::string_enum;
use crate::record::{Id, Times};

const LOGIN_ID_LENGTH: (usize, usize) = (4, 20);
const PASSWORD_LENGTH: (usize, usize) = (8, 20);
const NICKNAME_LENGTH: (usize, usize) = (2, 20);

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

string_enum!(Role {
    User => "USER",
    Admin => "ADMIN",
});

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// The fields of an account the owner may change freely.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub email: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub nickname: String,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub profile_image: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub birthdate: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub phone: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub address: Option<String>,
}

impl Profile {
    pub fn validate(self) -> Result<Self, BackendError> {
        validate_email(&self.email)?;
        validate_length("nickname", &self.nickname, NICKNAME_LENGTH)?;

        Ok(self)
    }
}

/// An account. The password hash never leaves the server.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userId")]
    pub id: Id,

    pub login_id: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    #[serde(flatten)]
    pub profile: Profile,

    pub role: Role,

    pub active: bool,

    #[serde(flatten)]
    pub times: Times,
}

/// A validated signup, ready to be stored.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub login_id: String,
    pub password_hash: String,
    pub profile: Profile,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub login_id: String,

    pub password: String,

    #[serde(flatten)]
    pub profile: Profile,
}

impl SignupRequest {
    pub fn validate(self) -> Result<Self, BackendError> {
        validate_length("loginId", &self.login_id, LOGIN_ID_LENGTH)?;
        validate_password(&self.password)?;

        Ok(SignupRequest {
            profile: self.profile.validate()?,
            ..self
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub login_id: String,

    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub user: User,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindIdRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub birthdate: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub email: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub login_id: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub email: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(self) -> Result<Self, BackendError> {
        validate_password(&self.new_password)?;

        Ok(self)
    }
}

/// Query string for `GET /users/available`. Each present field is checked.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub login_id: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub nickname: Option<String>,
}

impl AvailabilityQuery {
    pub fn is_empty(&self) -> bool {
        self.login_id.is_none() && self.email.is_none() && self.nickname.is_none()
    }
}

/// Whether each of the queried values is still free.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<bool>,
}

fn validate_length(
    field: &'static str,
    value: &str,
    (min, max): (usize, usize),
) -> Result<(), BackendError> {
    let length = value.chars().count();

    if length < min || length > max {
        return Err(BackendError::invalid(
            field,
            format!("must be between {} and {} characters", min, max),
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), BackendError> {
    validate_length("password", password, PASSWORD_LENGTH)
}

pub fn validate_email(email: &str) -> Result<(), BackendError> {
    let invalid = || BackendError::invalid("email", "is not a valid address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;

    let domain_ok = !domain.contains('@')
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.');

    if local.is_empty() || !domain_ok {
        return Err(invalid());
    }

    Ok(())
}
