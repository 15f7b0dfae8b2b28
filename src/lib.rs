use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;
pub mod templates;

// Routing split by access level (public, login required, staff).
pub mod routes;
use auth::SessionUser;
use routes::{admin as admin_routes, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use templates::Templates;

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json`. The
/// routes answer with HTML; the document is mostly useful as a route map.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index, handlers::about, handlers::show_category,
        handlers::add_category_form, handlers::add_category,
        handlers::add_page_form, handlers::add_page,
        handlers::register_form, handlers::register,
        handlers::login_form, handlers::user_login, handlers::user_logout,
        handlers::restricted, handlers::health,
        admin::admin_index,
        admin::category_changelist, admin::category_add_form, admin::category_add,
        admin::category_change_form, admin::category_change, admin::category_delete,
        admin::page_changelist, admin::page_add_form, admin::page_add,
        admin::page_change_form, admin::page_change, admin::page_delete,
    ),
    components(
        schemas(
            models::Category, models::Page, models::User, models::UserProfile,
            forms::CategoryForm, forms::PageForm, forms::LoginForm,
        )
    ),
    tags(
        (name = "rango", description = "Rango: categories of useful web pages")
    )
)]
struct ApiDoc;

/// AppState
///
/// Services shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for categories, pages, users and sessions.
    pub repo: RepositoryState,
    /// Object storage for profile pictures.
    pub storage: StorageState,
    /// Compiled page templates.
    pub templates: Templates,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for Templates {
    fn from_ref(app_state: &AppState) -> Templates {
        app_state.templates.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// login_required
///
/// Gate for the authenticated routes. `SessionUser` rejects anonymous or stale
/// sessions with a redirect to the login page before the handler runs.
async fn login_required(_session: SessionUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles every route, the login gate and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), login_required)),
        )
        // Staff checks happen inside the admin handlers so non-staff users get 403
        // rather than a login redirect.
        .merge(admin_routes::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
