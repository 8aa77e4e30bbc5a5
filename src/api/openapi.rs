//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrows, categories, health, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Library borrow ledger REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrows
        borrows::borrow_book,
        borrows::return_book,
        borrows::renew_borrow,
        borrows::mark_lost,
        borrows::list_borrows,
        borrows::my_borrows,
        borrows::user_borrows,
        borrows::overdue_borrows,
        borrows::borrow_statistics,
        borrows::get_borrow,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::adjust_stock,
        books::delete_book,
        // Categories
        categories::list_categories,
        categories::all_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
    ),
    components(
        schemas(
            // Borrows
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::BorrowRecord,
            crate::models::borrow::BorrowRecordDetails,
            crate::models::borrow::BorrowRequest,
            crate::models::borrow::ReturnRequest,
            crate::models::borrow::RenewRequest,
            crate::models::borrow::LostRequest,
            crate::models::borrow::BorrowQuery,
            crate::models::borrow::BorrowStatistics,
            // Books
            crate::models::book::BookStatus,
            crate::models::book::Book,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::AdjustStock,
            crate::models::book::PopularBook,
            // Categories
            crate::models::category::Category,
            crate::models::category::CategoryQuery,
            crate::models::category::CreateCategory,
            crate::models::category::UpdateCategory,
            // Users
            crate::models::user::UserRole,
            crate::models::user::UserStatus,
            crate::models::user::User,
            crate::models::user::UserQuery,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::ActiveUser,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrows", description = "Borrow ledger"),
        (name = "books", description = "Catalog management"),
        (name = "categories", description = "Category tree"),
        (name = "users", description = "Borrower accounts")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
