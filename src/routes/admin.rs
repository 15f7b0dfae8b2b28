use crate::{AppState, admin};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Changelists and edit screens for categories and pages. Anonymous visitors
/// are sent to the login page by the `SessionUser` extractor; logged-in users
/// without staff status get 403 from the handlers.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/", get(admin::admin_index))
        // --- Categories ---
        .route("/admin/rango/category/", get(admin::category_changelist))
        .route(
            "/admin/rango/category/add/",
            get(admin::category_add_form).post(admin::category_add),
        )
        .route(
            "/admin/rango/category/{id}/change/",
            get(admin::category_change_form).post(admin::category_change),
        )
        .route(
            "/admin/rango/category/{id}/delete/",
            post(admin::category_delete),
        )
        // --- Pages ---
        .route("/admin/rango/page/", get(admin::page_changelist))
        .route(
            "/admin/rango/page/add/",
            get(admin::page_add_form).post(admin::page_add),
        )
        .route(
            "/admin/rango/page/{id}/change/",
            get(admin::page_change_form).post(admin::page_change),
        )
        .route("/admin/rango/page/{id}/delete/", post(admin::page_delete))
}
