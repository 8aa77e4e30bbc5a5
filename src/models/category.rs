//! Book category model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Node of the category tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// Root categories have no parent
    pub parent_id: Option<i32>,
    /// Position among siblings, ascending
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Apply a partial update; re-parenting checks beyond self-reference
    /// need the whole tree and are done by the repository.
    pub fn apply_update(&mut self, update: UpdateCategory) -> AppResult<()> {
        if update.parent_id == Some(self.id) {
            return Err(AppError::Validation(
                "A category cannot be its own parent".to_string(),
            ));
        }
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(parent_id) = update.parent_id {
            self.parent_id = Some(parent_id);
        }
        if update.detach == Some(true) {
            self.parent_id = None;
        }
        if let Some(sort_order) = update.sort_order {
            self.sort_order = sort_order;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        Ok(())
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Category query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct CategoryQuery {
    /// Substring of the name
    pub name: Option<String>,
    pub parent_id: Option<i32>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create category request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(
        length(min = 1, max = 50, message = "Name must be 1-50 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    #[validate(range(min = 0, message = "sort_order cannot be negative"))]
    pub sort_order: Option<i32>,
}

/// Update category request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCategory {
    #[validate(
        length(min = 1, max = 50, message = "Name must be 1-50 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    /// Move under another category
    pub parent_id: Option<i32>,
    /// `true` makes the category a root
    pub detach: Option<bool>,
    #[validate(range(min = 0, message = "sort_order cannot be negative"))]
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i32, parent_id: Option<i32>) -> Category {
        let now = Utc::now();
        Category {
            id,
            name: "Fiction".into(),
            description: None,
            parent_id,
            sort_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn category_cannot_become_its_own_parent() {
        let mut c = category(3, None);
        let update = UpdateCategory {
            parent_id: Some(3),
            name: Some("Poetry".into()),
            ..Default::default()
        };
        assert!(matches!(c.apply_update(update), Err(AppError::Validation(_))));
        assert_eq!(c.name, "Fiction");
        assert_eq!(c.parent_id, None);
    }

    #[test]
    fn detach_turns_a_child_into_a_root() {
        let mut c = category(3, Some(1));
        let update = UpdateCategory {
            detach: Some(true),
            sort_order: Some(4),
            name: Some(" Short fiction ".into()),
            ..Default::default()
        };
        c.apply_update(update).unwrap();
        assert_eq!(c.parent_id, None);
        assert_eq!(c.sort_order, 4);
        assert_eq!(c.name, "Short fiction");
    }

    #[test]
    fn create_request_validation() {
        let request = CreateCategory {
            name: "   ".into(),
            description: None,
            parent_id: None,
            sort_order: Some(-1),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("sort_order"));
    }
}
