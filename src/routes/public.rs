use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Browsing categories and pages, adding pages, and the account entry points.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(handlers::health))
        // GET /
        // Top five categories by likes and top five pages by views.
        .route("/", get(handlers::index))
        .route("/about/", get(handlers::about))
        // GET /category/{slug}/
        // An unknown slug still renders the page, with a not-found message.
        .route("/category/{slug}/", get(handlers::show_category))
        // GET|POST /category/{slug}/page/add/
        .route(
            "/category/{slug}/page/add/",
            get(handlers::add_page_form).post(handlers::add_page),
        )
        // GET|POST /register/
        // Multipart form: user credentials plus optional website and picture.
        .route(
            "/register/",
            get(handlers::register_form).post(handlers::register),
        )
        // GET|POST /login/
        .route("/login/", get(handlers::login_form).post(handlers::user_login))
}
