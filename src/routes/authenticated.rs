use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Everything here sits behind `login_required`; anonymous visitors are
/// redirected to `/login/`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET|POST /category/add/
        // Takes precedence over `/category/{slug}/` because static segments win.
        .route(
            "/category/add/",
            get(handlers::add_category_form).post(handlers::add_category),
        )
        // GET /logout/
        // Deletes the server-side session so the old cookie stops working.
        .route("/logout/", get(handlers::user_logout))
        .route("/restricted/", get(handlers::restricted))
}
