//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult, LedgerViolation};

/// Shelf status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
    Maintenance,
    Lost,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Borrowed => "borrowed",
            BookStatus::Maintenance => "maintenance",
            BookStatus::Lost => "lost",
        }
    }

    /// Maintenance and lost are set by catalog staff and survive stock changes
    pub fn is_hold(&self) -> bool {
        matches!(self, BookStatus::Maintenance | BookStatus::Lost)
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(BookStatus::Available),
            "borrowed" => Ok(BookStatus::Borrowed),
            "maintenance" => Ok(BookStatus::Maintenance),
            "lost" => Ok(BookStatus::Lost),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

/// Internal row structure for database queries (with String fields)
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    id: i32,
    isbn: String,
    title: String,
    author: String,
    publisher: Option<String>,
    publish_date: Option<String>,
    price: Decimal,
    category_id: Option<i32>,
    summary: Option<String>,
    cover_url: Option<String>,
    total_stock: i32,
    available_stock: i32,
    borrow_count: i32,
    status: String,
    location: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> AppResult<Self> {
        Ok(Book {
            id: row.id,
            isbn: row.isbn,
            title: row.title,
            author: row.author,
            publisher: row.publisher,
            publish_date: row.publish_date,
            price: row.price,
            category_id: row.category_id,
            summary: row.summary,
            cover_url: row.cover_url,
            total_stock: row.total_stock,
            available_stock: row.available_stock,
            borrow_count: row.borrow_count,
            status: row.status.parse().map_err(AppError::Internal)?,
            location: row.location,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Full book model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    pub id: i32,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    /// Free-form, as printed (`2019`, `2019-03`)
    pub publish_date: Option<String>,
    /// Replacement price, charged when a borrowed copy is lost
    #[schema(value_type = String)]
    pub price: Decimal,
    pub category_id: Option<i32>,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub total_stock: i32,
    pub available_stock: i32,
    /// Number of loans ever started
    pub borrow_count: i32,
    pub status: BookStatus,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// A copy can be lent right now
    pub fn is_available(&self) -> bool {
        self.available_stock > 0 && self.status == BookStatus::Available
    }

    /// Copies currently out on loan
    pub fn on_loan(&self) -> i32 {
        self.total_stock - self.available_stock
    }

    /// Re-derive `available`/`borrowed` from the shelf count.
    ///
    /// Holds (maintenance, lost) are left untouched.
    pub fn sync_status(&mut self) {
        if self.status.is_hold() {
            return;
        }
        self.status = if self.available_stock > 0 {
            BookStatus::Available
        } else {
            BookStatus::Borrowed
        };
    }

    /// Take one copy off the shelf for a new loan
    pub(crate) fn check_out(&mut self) -> Result<(), LedgerViolation> {
        if self.available_stock <= 0 {
            return Err(LedgerViolation::OutOfStock);
        }
        self.available_stock -= 1;
        self.borrow_count += 1;
        self.sync_status();
        Ok(())
    }

    /// Put one copy back on the shelf
    pub(crate) fn check_in(&mut self) {
        if self.available_stock < self.total_stock {
            self.available_stock += 1;
        } else {
            tracing::warn!(
                book_id = self.id,
                total_stock = self.total_stock,
                "Returned copy exceeds recorded stock, shelf count left unchanged"
            );
        }
        self.sync_status();
    }

    /// Remove a copy that was on loan and will not come back
    pub(crate) fn write_off_loaned_copy(&mut self) {
        if self.on_loan() > 0 {
            self.total_stock -= 1;
        }
        self.sync_status();
    }

    /// Inventory correction: set the number of owned copies.
    ///
    /// Copies on loan are kept out of the shelf count.
    pub fn set_total_stock(&mut self, total_stock: i32) -> AppResult<()> {
        let on_loan = self.on_loan();
        if total_stock < on_loan {
            return Err(AppError::Validation(format!(
                "total_stock {} is below the {} copies currently on loan",
                total_stock, on_loan
            )));
        }
        self.total_stock = total_stock;
        self.available_stock = total_stock - on_loan;
        self.sync_status();
        Ok(())
    }

    /// Apply a partial update of descriptive fields and status hold
    pub fn apply_update(&mut self, update: UpdateBook) -> AppResult<()> {
        if let Some(status) = update.status {
            if status == BookStatus::Borrowed {
                return Err(AppError::Validation(
                    "status 'borrowed' is derived from stock and cannot be set".to_string(),
                ));
            }
            self.status = status;
            self.sync_status();
        }
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(author) = update.author {
            self.author = author.trim().to_string();
        }
        if let Some(publisher) = update.publisher {
            self.publisher = Some(publisher);
        }
        if let Some(publish_date) = update.publish_date {
            self.publish_date = Some(publish_date);
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(category_id) = update.category_id {
            self.category_id = Some(category_id);
        }
        if update.uncategorize == Some(true) {
            self.category_id = None;
        }
        if let Some(summary) = update.summary {
            self.summary = Some(summary);
        }
        if let Some(cover_url) = update.cover_url {
            self.cover_url = Some(cover_url);
        }
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        Ok(())
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_negative"));
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Matches title, author or ISBN
    pub keyword: Option<String>,
    pub author: Option<String>,
    pub category_id: Option<i32>,
    pub status: Option<BookStatus>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(
        length(min = 10, max = 20, message = "ISBN must be 10-20 characters"),
        custom(function = "validate_not_blank")
    )]
    pub isbn: String,
    #[validate(
        length(min = 1, max = 200, message = "Title must be 1-200 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author must be 1-100 characters"))]
    pub author: String,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    #[validate(length(max = 20))]
    pub publish_date: Option<String>,
    #[validate(custom(function = "validate_price"))]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    pub category_id: Option<i32>,
    pub summary: Option<String>,
    #[validate(length(max = 500))]
    pub cover_url: Option<String>,
    #[validate(range(min = 0, message = "total_stock cannot be negative"))]
    pub total_stock: Option<i32>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Author must be 1-100 characters"))]
    pub author: Option<String>,
    #[validate(length(max = 100))]
    pub publisher: Option<String>,
    #[validate(length(max = 20))]
    pub publish_date: Option<String>,
    #[validate(custom(function = "validate_price"))]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Move the book into another category
    pub category_id: Option<i32>,
    /// `true` removes the book from its category
    pub uncategorize: Option<bool>,
    pub summary: Option<String>,
    #[validate(length(max = 500))]
    pub cover_url: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    /// `available` lifts a hold; `maintenance` or `lost` sets one
    pub status: Option<BookStatus>,
}

/// Inventory correction request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStock {
    #[validate(range(min = 0, message = "total_stock cannot be negative"))]
    pub total_stock: i32,
}

/// Books ranked by loans started
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PopularBook {
    pub id: i32,
    pub title: String,
    pub borrow_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(total: i32, available: i32, status: BookStatus) -> Book {
        let now = Utc::now();
        Book {
            id: 1,
            isbn: "9780000000001".into(),
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            publisher: None,
            publish_date: None,
            price: Decimal::new(2500, 2),
            category_id: None,
            summary: None,
            cover_url: None,
            total_stock: total,
            available_stock: available,
            borrow_count: 0,
            status,
            location: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn availability_needs_stock_and_available_status() {
        assert!(book(2, 1, BookStatus::Available).is_available());
        assert!(!book(2, 0, BookStatus::Available).is_available());
        assert!(!book(2, 2, BookStatus::Maintenance).is_available());
        assert!(!book(2, 2, BookStatus::Borrowed).is_available());
    }

    #[test]
    fn last_copy_out_marks_book_borrowed() {
        let mut b = book(1, 1, BookStatus::Available);
        b.check_out().unwrap();
        assert_eq!(b.available_stock, 0);
        assert_eq!(b.borrow_count, 1);
        assert_eq!(b.status, BookStatus::Borrowed);
        assert_eq!(b.check_out(), Err(LedgerViolation::OutOfStock));
        assert_eq!(b.available_stock, 0);

        b.check_in();
        assert_eq!(b.available_stock, 1);
        assert_eq!(b.status, BookStatus::Available);
    }

    #[test]
    fn check_in_heals_drifted_status_and_caps_stock() {
        let mut b = book(2, 2, BookStatus::Borrowed);
        b.check_in();
        assert_eq!(b.available_stock, 2);
        assert_eq!(b.status, BookStatus::Available);
    }

    #[test]
    fn holds_survive_stock_changes() {
        let mut b = book(2, 1, BookStatus::Maintenance);
        b.check_in();
        assert_eq!(b.status, BookStatus::Maintenance);
        assert!(!b.is_available());
    }

    #[test]
    fn stock_correction_keeps_loans_out_of_the_shelf() {
        let mut b = book(3, 1, BookStatus::Available);
        assert!(b.set_total_stock(1).is_err());
        b.set_total_stock(2).unwrap();
        assert_eq!((b.total_stock, b.available_stock), (2, 0));
        assert_eq!(b.status, BookStatus::Borrowed);
        b.set_total_stock(5).unwrap();
        assert_eq!((b.total_stock, b.available_stock), (5, 3));
        assert_eq!(b.status, BookStatus::Available);
    }

    #[test]
    fn written_off_copy_leaves_shelf_count_alone() {
        let mut b = book(2, 1, BookStatus::Available);
        b.write_off_loaned_copy();
        assert_eq!((b.total_stock, b.available_stock), (1, 1));
    }

    #[test]
    fn update_rejects_borrowed_status() {
        let mut b = book(1, 1, BookStatus::Available);
        let update = UpdateBook {
            status: Some(BookStatus::Borrowed),
            ..Default::default()
        };
        assert!(b.apply_update(update).is_err());

        let update = UpdateBook {
            status: Some(BookStatus::Maintenance),
            title: Some("  Dune Messiah ".into()),
            ..Default::default()
        };
        b.apply_update(update).unwrap();
        assert_eq!(b.status, BookStatus::Maintenance);
        assert_eq!(b.title, "Dune Messiah");
    }

    #[test]
    fn create_request_validation() {
        let request = CreateBook {
            isbn: "123".into(),
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            publisher: None,
            publish_date: None,
            price: Some(Decimal::new(-1, 0)),
            category_id: None,
            summary: None,
            cover_url: Some("x".repeat(501)),
            total_stock: Some(-1),
            location: None,
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("isbn"));
        assert!(fields.contains_key("price"));
        assert!(fields.contains_key("total_stock"));
        assert!(fields.contains_key("cover_url"));
    }

    #[test]
    fn update_moves_and_clears_category() {
        let mut b = book(1, 1, BookStatus::Available);
        let update = UpdateBook {
            category_id: Some(4),
            summary: Some("Desert planet".into()),
            ..Default::default()
        };
        b.apply_update(update).unwrap();
        assert_eq!(b.category_id, Some(4));
        assert_eq!(b.summary.as_deref(), Some("Desert planet"));

        let update = UpdateBook {
            uncategorize: Some(true),
            ..Default::default()
        };
        b.apply_update(update).unwrap();
        assert_eq!(b.category_id, None);
    }
}
