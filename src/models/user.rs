//! User (borrower and staff) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Role of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Librarian,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Librarian => "librarian",
            UserRole::User => "user",
        }
    }

    /// Staff may run ledger operations and manage the catalog
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Librarian)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "librarian" => Ok(UserRole::Librarian),
            "user" => Ok(UserRole::User),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

/// Internal row structure for database queries (with String fields)
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    id: i32,
    username: String,
    email: String,
    full_name: Option<String>,
    role: String,
    status: String,
    max_borrow_count: i32,
    current_borrow_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            role: row.role.parse().map_err(AppError::Internal)?,
            status: row.status.parse().map_err(AppError::Internal)?,
            max_borrow_count: row.max_borrow_count,
            current_borrow_count: row.current_borrow_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Full user model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub max_borrow_count: i32,
    pub current_borrow_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A new loan may start only for an active account below its limit
    pub fn can_borrow(&self) -> bool {
        self.status == UserStatus::Active && self.current_borrow_count < self.max_borrow_count
    }

    /// Name shown on borrow records
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    pub(crate) fn open_loan(&mut self) {
        self.current_borrow_count += 1;
    }

    pub(crate) fn close_loan(&mut self) {
        self.current_borrow_count = (self.current_borrow_count - 1).max(0);
    }

    /// Apply a partial update, refusing a limit below the loans already held
    pub fn apply_update(&mut self, update: UpdateUser) -> AppResult<()> {
        if let Some(max) = update.max_borrow_count {
            if max < self.current_borrow_count {
                return Err(AppError::Validation(format!(
                    "max_borrow_count {} is below the {} books currently borrowed",
                    max, self.current_borrow_count
                )));
            }
            self.max_borrow_count = max;
        }
        if let Some(full_name) = update.full_name {
            self.full_name = Some(full_name);
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        Ok(())
    }
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Matches username, email or full name
    pub keyword: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 50, message = "Full name must be at most 50 characters"))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    #[validate(range(min = 1, max = 100, message = "max_borrow_count must be between 1 and 100"))]
    pub max_borrow_count: Option<i32>,
}

/// Update user request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(max = 50, message = "Full name must be at most 50 characters"))]
    pub full_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    #[validate(range(min = 1, max = 100, message = "max_borrow_count must be between 1 and 100"))]
    pub max_borrow_count: Option<i32>,
}

/// Users ranked by books currently held
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ActiveUser {
    pub id: i32,
    pub username: String,
    pub borrow_count: i32,
}

/// JWT claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian or admin rights required".to_string()))
        }
    }

    /// Readers may only look at their own account and loans
    pub fn require_self_or_staff(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id || self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to view this user".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(current: i32, max: i32, status: UserStatus) -> User {
        let now = Utc::now();
        User {
            id: 1,
            username: "reader".into(),
            email: "reader@example.org".into(),
            full_name: None,
            role: UserRole::User,
            status,
            max_borrow_count: max,
            current_borrow_count: current,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn can_borrow_requires_active_status_and_room() {
        assert!(reader(0, 5, UserStatus::Active).can_borrow());
        assert!(!reader(5, 5, UserStatus::Active).can_borrow());
        assert!(!reader(0, 5, UserStatus::Suspended).can_borrow());
        assert!(!reader(0, 5, UserStatus::Inactive).can_borrow());
    }

    #[test]
    fn close_loan_never_goes_negative() {
        let mut user = reader(0, 5, UserStatus::Active);
        user.close_loan();
        assert_eq!(user.current_borrow_count, 0);
    }

    #[test]
    fn update_refuses_limit_below_current_loans() {
        let mut user = reader(3, 5, UserStatus::Active);
        let err = user
            .apply_update(UpdateUser {
                max_borrow_count: Some(2),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(user.max_borrow_count, 5);

        user.apply_update(UpdateUser {
            max_borrow_count: Some(3),
            status: Some(UserStatus::Suspended),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(user.max_borrow_count, 3);
        assert_eq!(user.status, UserStatus::Suspended);
    }

    #[test]
    fn claims_round_trip_through_token() {
        let claims = UserClaims {
            sub: "librarian".into(),
            user_id: 7,
            role: UserRole::Librarian,
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = claims.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert!(parsed.require_staff().is_ok());
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn readers_only_see_themselves() {
        let claims = UserClaims {
            sub: "reader".into(),
            user_id: 3,
            role: UserRole::User,
            exp: 0,
            iat: 0,
        };
        assert!(claims.require_self_or_staff(3).is_ok());
        assert!(claims.require_self_or_staff(4).is_err());
        assert!(claims.require_staff().is_err());
    }
}
