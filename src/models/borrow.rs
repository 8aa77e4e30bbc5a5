//! Borrow record model: the ledger's loan state machine

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{book::Book, book::PopularBook, user::ActiveUser, user::User};
use crate::error::{AppError, AppResult, LedgerViolation};

/// Loan status.
///
/// `Borrowed` is the only open state; every other state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Overdue => "overdue",
            BorrowStatus::Lost => "lost",
        }
    }

    pub fn is_open(&self) -> bool {
        *self == BorrowStatus::Borrowed
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(BorrowStatus::Borrowed),
            "returned" => Ok(BorrowStatus::Returned),
            "overdue" => Ok(BorrowStatus::Overdue),
            "lost" => Ok(BorrowStatus::Lost),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

/// Internal row structure for database queries (with String fields)
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRecordRow {
    id: i32,
    user_id: i32,
    book_id: i32,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    renew_count: i32,
    max_renew_count: i32,
    overdue_days: i32,
    fine_amount: Decimal,
    operator_id: Option<i32>,
    remark: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BorrowRecordRow> for BorrowRecord {
    type Error = AppError;

    fn try_from(row: BorrowRecordRow) -> AppResult<Self> {
        Ok(BorrowRecord {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status.parse().map_err(AppError::Internal)?,
            renew_count: row.renew_count,
            max_renew_count: row.max_renew_count,
            overdue_days: row.overdue_days,
            fine_amount: row.fine_amount,
            operator_id: row.operator_id,
            remark: row.remark,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// One loan of one book to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    /// Borrower
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set once when the loan is closed, never changed afterwards
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub renew_count: i32,
    pub max_renew_count: i32,
    pub overdue_days: i32,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
    /// Staff member who performed the last ledger action
    pub operator_id: Option<i32>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn can_renew(&self) -> bool {
        self.status == BorrowStatus::Borrowed && self.renew_count < self.max_renew_count
    }

    /// Real-time lateness; the stored status only changes on return
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status != BorrowStatus::Returned && now > self.due_date
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Whole days past the current due date
    pub fn overdue_days_at(&self, now: DateTime<Utc>) -> i32 {
        if now <= self.due_date {
            return 0;
        }
        i32::try_from((now - self.due_date).num_days()).unwrap_or(i32::MAX)
    }

    fn ensure_open(&self) -> Result<(), LedgerViolation> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(LedgerViolation::RecordClosed { status: self.status })
        }
    }

    /// Close the loan because the copy came back.
    ///
    /// Lateness is measured against the current (possibly renewed) due date.
    pub(crate) fn close_returned(
        &mut self,
        now: DateTime<Utc>,
        fine_per_day: Decimal,
        operator_id: i32,
        remark: Option<String>,
    ) -> Result<(), LedgerViolation> {
        self.ensure_open()?;
        if now > self.due_date {
            self.overdue_days = self.overdue_days_at(now);
            self.status = BorrowStatus::Overdue;
            self.fine_amount = Decimal::from(self.overdue_days) * fine_per_day;
        } else {
            self.status = BorrowStatus::Returned;
        }
        self.return_date = Some(now);
        self.operator_id = Some(operator_id);
        self.remark = remark;
        self.updated_at = now;
        Ok(())
    }

    /// Close the loan because the copy will not come back.
    ///
    /// The fine is the replacement cost plus any lateness fine.
    pub(crate) fn close_lost(
        &mut self,
        now: DateTime<Utc>,
        replacement_cost: Decimal,
        fine_per_day: Decimal,
        operator_id: i32,
        remark: Option<String>,
    ) -> Result<(), LedgerViolation> {
        self.ensure_open()?;
        self.overdue_days = self.overdue_days_at(now);
        self.fine_amount = replacement_cost + Decimal::from(self.overdue_days) * fine_per_day;
        self.status = BorrowStatus::Lost;
        self.return_date = Some(now);
        self.operator_id = Some(operator_id);
        self.remark = remark;
        self.updated_at = now;
        Ok(())
    }

    /// Push the due date back
    pub(crate) fn renew(&mut self, now: DateTime<Utc>, days: u32) -> Result<(), LedgerViolation> {
        if !self.can_renew() {
            return Err(LedgerViolation::NotRenewable {
                status: self.status,
                renew_count: self.renew_count,
                max_renew_count: self.max_renew_count,
            });
        }
        self.due_date += Duration::days(i64::from(days));
        self.renew_count += 1;
        self.updated_at = now;
        Ok(())
    }
}

/// Values for a record being opened
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub max_renew_count: i32,
    pub operator_id: i32,
}

impl NewBorrowRecord {
    pub fn into_record(self, id: i32) -> BorrowRecord {
        BorrowRecord {
            id,
            user_id: self.user_id,
            book_id: self.book_id,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: None,
            status: BorrowStatus::Borrowed,
            renew_count: 0,
            max_renew_count: self.max_renew_count,
            overdue_days: 0,
            fine_amount: Decimal::ZERO,
            operator_id: Some(self.operator_id),
            remark: None,
            created_at: self.borrow_date,
            updated_at: self.borrow_date,
        }
    }
}

/// Borrow record with display fields joined from the borrower and the book.
///
/// The joined fields are never stored on the record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecordDetails {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub user_name: Option<String>,
    pub book_title: Option<String>,
    pub book_isbn: Option<String>,
    pub is_overdue: bool,
}

impl BorrowRecordDetails {
    pub fn new(
        record: BorrowRecord,
        user: Option<&User>,
        book: Option<&Book>,
        now: DateTime<Utc>,
    ) -> Self {
        let is_overdue = record.is_overdue_at(now);
        Self {
            user_name: user.map(|u| u.display_name().to_string()),
            book_title: book.map(|b| b.title.clone()),
            book_isbn: book.map(|b| b.isbn.clone()),
            is_overdue,
            record,
        }
    }
}

/// Row of a borrow record joined with borrower and book
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRecordDetailsRow {
    #[sqlx(flatten)]
    record: BorrowRecordRow,
    user_name: Option<String>,
    book_title: Option<String>,
    book_isbn: Option<String>,
}

impl BorrowRecordDetailsRow {
    pub fn into_details(self, now: DateTime<Utc>) -> AppResult<BorrowRecordDetails> {
        let record = BorrowRecord::try_from(self.record)?;
        Ok(BorrowRecordDetails {
            is_overdue: record.is_overdue_at(now),
            record,
            user_name: self.user_name,
            book_title: self.book_title,
            book_isbn: self.book_isbn,
        })
    }
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    pub user_id: i32,
    pub book_id: i32,
    /// Loan length in days (default from configuration)
    #[validate(range(min = 1, max = 60, message = "due_days must be between 1 and 60"))]
    pub due_days: Option<u32>,
}

/// Return request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReturnRequest {
    pub record_id: i32,
    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Renew request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RenewRequest {
    pub record_id: i32,
}

/// Declare a borrowed copy lost
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LostRequest {
    pub record_id: i32,
    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Borrow record query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BorrowQuery {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub status: Option<BorrowStatus>,
    /// Earliest borrow date
    pub start_date: Option<DateTime<Utc>>,
    /// Latest borrow date
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Ledger-wide figures
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowStatistics {
    /// Loans still open
    pub borrowed_count: i64,
    pub returned_count: i64,
    pub overdue_count: i64,
    pub lost_count: i64,
    #[schema(value_type = String)]
    pub total_fine_amount: Decimal,
    pub popular_books: Vec<PopularBook>,
    pub active_users: Vec<ActiveUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_record(borrowed_at: DateTime<Utc>, due_days: i64) -> BorrowRecord {
        NewBorrowRecord {
            user_id: 1,
            book_id: 2,
            borrow_date: borrowed_at,
            due_date: borrowed_at + Duration::days(due_days),
            max_renew_count: 2,
            operator_id: 9,
        }
        .into_record(1)
    }

    fn fine_rate() -> Decimal {
        Decimal::new(50, 2)
    }

    #[test]
    fn on_time_return_has_no_fine() {
        let start = Utc::now();
        let mut record = open_record(start, 14);
        record
            .close_returned(start + Duration::days(3), fine_rate(), 9, Some("ok".into()))
            .unwrap();
        assert_eq!(record.status, BorrowStatus::Returned);
        assert_eq!(record.overdue_days, 0);
        assert_eq!(record.fine_amount, Decimal::ZERO);
        assert_eq!(record.return_date, Some(start + Duration::days(3)));
        assert_eq!(record.remark.as_deref(), Some("ok"));
    }

    #[test]
    fn late_return_is_fined_per_whole_day() {
        let start = Utc::now();
        let mut record = open_record(start, 5);
        record
            .close_returned(start + Duration::days(10) + Duration::hours(6), fine_rate(), 9, None)
            .unwrap();
        assert_eq!(record.status, BorrowStatus::Overdue);
        assert_eq!(record.overdue_days, 5);
        assert_eq!(record.fine_amount, Decimal::new(250, 2));
    }

    #[test]
    fn closed_record_cannot_close_again() {
        let start = Utc::now();
        let mut record = open_record(start, 5);
        record.close_returned(start, fine_rate(), 9, None).unwrap();
        let snapshot = record.clone();
        let err = record
            .close_returned(start + Duration::days(1), fine_rate(), 4, None)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerViolation::RecordClosed {
                status: BorrowStatus::Returned
            }
        );
        assert_eq!(record, snapshot);
    }

    #[test]
    fn renewals_are_limited() {
        let start = Utc::now();
        let mut record = open_record(start, 30);
        record.renew(start, 14).unwrap();
        record.renew(start, 14).unwrap();
        assert_eq!(record.renew_count, 2);
        assert_eq!(record.due_date, start + Duration::days(58));
        assert!(matches!(
            record.renew(start, 14),
            Err(LedgerViolation::NotRenewable { renew_count: 2, .. })
        ));
    }

    #[test]
    fn overdue_records_cannot_be_renewed() {
        let start = Utc::now();
        let mut record = open_record(start, 1);
        record
            .close_returned(start + Duration::days(3), fine_rate(), 9, None)
            .unwrap();
        assert!(!record.can_renew());
    }

    #[test]
    fn lost_copy_charges_replacement_and_lateness() {
        let start = Utc::now();
        let mut record = open_record(start, 2);
        record
            .close_lost(start + Duration::days(4), Decimal::new(2000, 2), fine_rate(), 9, None)
            .unwrap();
        assert_eq!(record.status, BorrowStatus::Lost);
        assert_eq!(record.overdue_days, 2);
        assert_eq!(record.fine_amount, Decimal::new(2100, 2));
    }

    #[test]
    fn overdue_predicate_is_real_time() {
        let start = Utc::now();
        let record = open_record(start, 1);
        assert!(!record.is_overdue_at(start));
        assert!(record.is_overdue_at(start + Duration::days(2)));
        assert_eq!(record.status, BorrowStatus::Borrowed);
    }

    #[test]
    fn due_days_bounds_are_validated() {
        let request = |due_days| BorrowRequest {
            user_id: 1,
            book_id: 1,
            due_days,
        };
        assert!(request(Some(0)).validate().is_err());
        assert!(request(Some(61)).validate().is_err());
        assert!(request(Some(60)).validate().is_ok());
        assert!(request(None).validate().is_ok());
    }
}
