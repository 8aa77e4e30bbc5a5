//! Borrow ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrow::{
            BorrowQuery, BorrowRecordDetails, BorrowRequest, BorrowStatistics, LostRequest,
            RenewRequest, ReturnRequest,
        },
        Page,
    },
    AppState,
};

use super::{AuthenticatedUser, PageParams, PaginatedResponse};

/// Lend a copy of a book to a user
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowRecordDetails),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Staff rights required"),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "User or book not in a state to borrow")
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRecordDetails>)> {
    claims.require_staff()?;

    let details = state.services.ledger.borrow(request, claims.user_id).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/borrows/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Book returned", body = BorrowRecordDetails),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Borrow record already closed")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<BorrowRecordDetails>> {
    claims.require_staff()?;

    let details = state.services.ledger.return_book(request, claims.user_id).await?;
    Ok(Json(details))
}

/// Renew an open loan
#[utoipa::path(
    post,
    path = "/borrows/renew",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Loan renewed", body = BorrowRecordDetails),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Loan closed or renewal limit reached")
    )
)]
pub async fn renew_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<RenewRequest>,
) -> AppResult<Json<BorrowRecordDetails>> {
    claims.require_staff()?;

    let details = state.services.ledger.renew(request).await?;
    Ok(Json(details))
}

/// Declare a borrowed copy lost
#[utoipa::path(
    post,
    path = "/borrows/lost",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = LostRequest,
    responses(
        (status = 200, description = "Copy written off, fine charged", body = BorrowRecordDetails),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Borrow record already closed")
    )
)]
pub async fn mark_lost(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<LostRequest>,
) -> AppResult<Json<BorrowRecordDetails>> {
    claims.require_staff()?;

    let details = state.services.ledger.mark_lost(request, claims.user_id).await?;
    Ok(Json(details))
}

/// List borrow records; readers only see their own
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Borrow records, newest first", body = PaginatedResponse<BorrowRecordDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowRecordDetails>>> {
    let only_user = (!claims.is_staff()).then_some(claims.user_id);

    let (records, total) = state.services.borrows.search(&query, only_user).await?;
    let page = Page::new(query.page, query.per_page);
    Ok(Json(PaginatedResponse::new(records, total, page)))
}

/// Borrow records of the caller
#[utoipa::path(
    get,
    path = "/borrows/my",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Caller's borrow records", body = PaginatedResponse<BorrowRecordDetails>)
    )
)]
pub async fn my_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowRecordDetails>>> {
    let (records, total) = state
        .services
        .borrows
        .search(&query, Some(claims.user_id))
        .await?;
    let page = Page::new(query.page, query.per_page);
    Ok(Json(PaginatedResponse::new(records, total, page)))
}

/// Borrow records of one user
#[utoipa::path(
    get,
    path = "/users/{id}/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        BorrowQuery
    ),
    responses(
        (status = 200, description = "User's borrow records", body = PaginatedResponse<BorrowRecordDetails>),
        (status = 403, description = "Not allowed to view this user"),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowRecordDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let (records, total) = state.services.borrows.user_records(user_id, &query).await?;
    let page = Page::new(query.page, query.per_page);
    Ok(Json(PaginatedResponse::new(records, total, page)))
}

/// Late loans, open or already closed
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(PageParams),
    responses(
        (status = 200, description = "Overdue records by due date", body = PaginatedResponse<BorrowRecordDetails>),
        (status = 403, description = "Staff rights required")
    )
)]
pub async fn overdue_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<PaginatedResponse<BorrowRecordDetails>>> {
    claims.require_staff()?;

    let page = Page::from(&params);
    let (records, total) = state.services.borrows.overdue(page).await?;
    Ok(Json(PaginatedResponse::new(records, total, page)))
}

/// Ledger-wide statistics
#[utoipa::path(
    get,
    path = "/borrows/statistics",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrow statistics", body = BorrowStatistics),
        (status = 403, description = "Staff rights required")
    )
)]
pub async fn borrow_statistics(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowStatistics>> {
    claims.require_staff()?;

    let statistics = state.services.borrows.statistics().await?;
    Ok(Json(statistics))
}

/// Get one borrow record
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Borrow record", body = BorrowRecordDetails),
        (status = 403, description = "Not the caller's record"),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecordDetails>> {
    let details = state.services.borrows.get(id).await?;
    claims.require_self_or_staff(details.record.user_id)?;
    Ok(Json(details))
}
