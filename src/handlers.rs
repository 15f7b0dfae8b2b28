use crate::{
    AppState,
    auth::{self, SessionUser},
    error::{AppError, RepositoryError},
    forms::{self, CategoryForm, FormErrors, LoginForm, PageForm, RegistrationSubmission},
    models::{Category, NewCategory, NewPage, NewUser, NewUserProfile},
};
use axum::{
    Form,
    extract::{Multipart, Path, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use tera::Context;
use uuid::Uuid;

/// Greeting shown on the landing and about pages.
pub const BOLD_MESSAGE: &str = "Crunchy, creamy, cookie, candy, cupcake!";

/// How many categories and pages the landing page ranks.
const TOP_N: i64 = 5;

pub const DISABLED_ACCOUNT_MESSAGE: &str = "Your Rango account is disabled.";
pub const INVALID_LOGIN_MESSAGE: &str = "Invalid login details supplied.";
pub const RESTRICTED_MESSAGE: &str = "Since you're logged in, you can see this text!";

// --- Shared Renderers ---

/// render_index
///
/// The landing page body. Also used as the response to a successful
/// category submission.
async fn render_index(state: &AppState) -> Result<Html<String>, AppError> {
    // Independent rankings: pages are not filtered by the listed categories.
    let categories = state.repo.top_categories(TOP_N).await?;
    let pages = state.repo.top_pages(TOP_N).await?;

    let mut context = Context::new();
    context.insert("boldmessage", BOLD_MESSAGE);
    context.insert("categories", &categories);
    context.insert("pages", &pages);
    state.templates.render("rango/index.html", &context)
}

/// render_category
///
/// Category detail body. A missing category renders with an empty context.
async fn render_category(
    state: &AppState,
    category: Option<Category>,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    if let Some(category) = category {
        let pages = state.repo.pages_for_category(category.id).await?;
        context.insert("category", &category);
        context.insert("pages", &pages);
    }
    state.templates.render("rango/category.html", &context)
}

fn render_category_form(
    state: &AppState,
    form: &CategoryForm,
    errors: &FormErrors,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("form", form);
    context.insert("errors", errors);
    state.templates.render("rango/add_category.html", &context)
}

fn render_page_form(
    state: &AppState,
    slug: &str,
    category: Option<&Category>,
    form: &PageForm,
    errors: &FormErrors,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("slug", slug);
    if let Some(category) = category {
        context.insert("category", category);
    }
    context.insert("form", form);
    context.insert("errors", errors);
    state.templates.render("rango/add_page.html", &context)
}

// --- Handlers ---

/// index
///
/// Landing page: five most liked categories and five most viewed pages.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Landing page", content_type = "text/html", body = String))
)]
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render_index(&state).await
}

#[utoipa::path(
    get,
    path = "/about/",
    responses((status = 200, description = "About page", content_type = "text/html", body = String))
)]
pub async fn about(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("boldmessage", BOLD_MESSAGE);
    state.templates.render("rango/about.html", &context)
}

/// show_category
///
/// Category detail. An unknown slug is not a 404: the page renders without a
/// category and says so.
#[utoipa::path(
    get,
    path = "/category/{slug}/",
    params(("slug" = String, Path, description = "Category slug")),
    responses((status = 200, description = "Category and its pages", content_type = "text/html", body = String))
)]
pub async fn show_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Html<String>, AppError> {
    let category = state.repo.get_category_by_slug(&slug).await?;
    if category.is_none() {
        tracing::debug!(slug = %slug, "category not found");
    }
    render_category(&state, category).await
}

/// [Authenticated Route] Empty category form.
#[utoipa::path(
    get,
    path = "/category/add/",
    responses(
        (status = 200, description = "Category form", content_type = "text/html", body = String),
        (status = 303, description = "Not logged in")
    )
)]
pub async fn add_category_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render_category_form(&state, &CategoryForm::default(), &FormErrors::default())
}

/// add_category
///
/// [Authenticated Route] Creates a category and answers with the landing page.
/// Invalid or duplicate names re-render the form with their errors.
#[utoipa::path(
    post,
    path = "/category/add/",
    request_body(content = CategoryForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Landing page on success, form with errors otherwise", content_type = "text/html", body = String),
        (status = 303, description = "Not logged in")
    )
)]
pub async fn add_category(
    State(state): State<AppState>,
    Form(mut form): Form<CategoryForm>,
) -> Result<Html<String>, AppError> {
    form.name = form.name.trim().to_string();
    let mut errors = forms::check(&form);

    if errors.is_empty() {
        let new_category = NewCategory::named(form.name.clone());
        if state
            .repo
            .get_category_by_slug(&new_category.slug())
            .await?
            .is_some()
        {
            errors.add("name", "Category with this Name already exists.");
        } else {
            match state.repo.create_category(new_category).await {
                Ok(category) => {
                    tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
                    return render_index(&state).await;
                }
                Err(RepositoryError::Conflict(_)) => {
                    errors.add("name", "Category with this Name already exists.");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::warn!(?errors, "category form rejected");
    render_category_form(&state, &form, &errors)
}

#[utoipa::path(
    get,
    path = "/category/{slug}/page/add/",
    params(("slug" = String, Path, description = "Parent category slug")),
    responses((status = 200, description = "Page form", content_type = "text/html", body = String))
)]
pub async fn add_page_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Html<String>, AppError> {
    let category = state.repo.get_category_by_slug(&slug).await?;
    render_page_form(
        &state,
        &slug,
        category.as_ref(),
        &PageForm::default(),
        &FormErrors::default(),
    )
}

/// add_page
///
/// Adds a page (views forced to zero) to the category named by the slug and
/// answers with the category detail. Nothing is stored when the category does
/// not exist.
#[utoipa::path(
    post,
    path = "/category/{slug}/page/add/",
    params(("slug" = String, Path, description = "Parent category slug")),
    request_body(content = PageForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Category detail on success, form otherwise", content_type = "text/html", body = String))
)]
pub async fn add_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(mut form): Form<PageForm>,
) -> Result<Html<String>, AppError> {
    let category = state.repo.get_category_by_slug(&slug).await?;
    form.clean();
    let errors = forms::check(&form);

    match (&category, errors.is_empty()) {
        (Some(category), true) => {
            let page = state
                .repo
                .create_page(NewPage {
                    category_id: category.id,
                    title: form.title.clone(),
                    url: form.url.clone(),
                    views: 0,
                })
                .await?;
            tracing::info!(page_id = %page.id, category = %category.slug, "page created");
            return render_category(&state, Some(category.clone())).await;
        }
        (None, _) => {
            tracing::warn!(slug = %slug, "page submitted for a category that does not exist");
        }
        (Some(_), false) => {
            tracing::warn!(?errors, "page form rejected");
        }
    }

    render_page_form(&state, &slug, category.as_ref(), &form, &errors)
}

#[utoipa::path(
    get,
    path = "/register/",
    responses((status = 200, description = "Registration forms", content_type = "text/html", body = String))
)]
pub async fn register_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("registered", &false);
    state.templates.render("rango/register.html", &context)
}

/// register
///
/// Validates the user and profile forms together. On success the password is
/// hashed, the picture (if any) uploaded, and user plus profile stored.
#[utoipa::path(
    post,
    path = "/register/",
    responses(
        (status = 200, description = "Registration result", content_type = "text/html", body = String),
        (status = 400, description = "Malformed multipart body")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let RegistrationSubmission {
        user: user_form,
        profile: profile_form,
    } = RegistrationSubmission::from_multipart(&mut multipart).await?;

    let mut user_errors = forms::check(&user_form);
    let mut profile_errors = forms::check(&profile_form);
    profile_form.check_picture(&mut profile_errors);

    if user_errors.is_empty()
        && state
            .repo
            .find_user_by_username(&user_form.username)
            .await?
            .is_some()
    {
        user_errors.add("username", "A user with that username already exists.");
    }

    let mut registered = false;
    if user_errors.is_empty() && profile_errors.is_empty() {
        let password_hash = auth::hash_password(&user_form.password)?;

        let picture = match &profile_form.picture {
            Some(file) => {
                let key = format!("profile_images/{}.{}", Uuid::new_v4(), file.extension());
                let stored = state
                    .storage
                    .put_object(&key, &file.content_type, file.bytes.clone())
                    .await
                    .map_err(AppError::Storage)?;
                Some(stored)
            }
            None => None,
        };

        let new_user = NewUser {
            username: user_form.username.clone(),
            email: user_form.email.clone().unwrap_or_default(),
            password_hash,
            is_active: true,
            is_staff: false,
        };
        let new_profile = NewUserProfile {
            website: profile_form.website.clone(),
            picture: picture.clone(),
        };

        let result = state.repo.register_user(new_user, new_profile).await;
        if let (Err(_), Some(key)) = (&result, &picture) {
            discard_upload(&state, key).await;
        }
        match result {
            Ok((user, profile)) => {
                tracing::info!(user_id = %user.id, profile_id = %profile.id, "user registered");
                registered = true;
            }
            Err(RepositoryError::Conflict(_)) => {
                user_errors.add("username", "A user with that username already exists.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !registered {
        tracing::warn!(?user_errors, ?profile_errors, "registration rejected");
    }

    let mut context = Context::new();
    context.insert("registered", &registered);
    context.insert("user_form", &user_form);
    context.insert("profile_form", &profile_form);
    context.insert("user_errors", &user_errors);
    context.insert("profile_errors", &profile_errors);
    state.templates.render("rango/register.html", &context)
}

#[utoipa::path(
    get,
    path = "/login/",
    responses((status = 200, description = "Login form", content_type = "text/html", body = String))
)]
pub async fn login_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    state
        .templates
        .render("rango/login.html", &Context::new())
}

/// user_login
///
/// Active users get a session cookie and are sent to the landing page.
/// Disabled accounts and bad credentials get distinct plain-text answers.
#[utoipa::path(
    post,
    path = "/login/",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Logged in, redirect to index"),
        (status = 200, description = "Disabled account or invalid credentials", content_type = "text/plain", body = String)
    )
)]
pub async fn user_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match auth::authenticate(&state.repo, &form.username, &form.password).await? {
        Some(user) if user.is_active => {
            let cookie = auth::start_session(&state.repo, &state.config, &user).await?;
            tracing::info!(user_id = %user.id, "user logged in");
            Ok((
                [(header::SET_COOKIE, cookie.to_string())],
                Redirect::to("/"),
            )
                .into_response())
        }
        Some(user) => {
            tracing::info!(user_id = %user.id, "login refused for disabled account");
            Ok(DISABLED_ACCOUNT_MESSAGE.into_response())
        }
        None => {
            tracing::warn!(username = %form.username, "invalid login details");
            Ok(INVALID_LOGIN_MESSAGE.into_response())
        }
    }
}

/// user_logout
///
/// [Authenticated Route] Deletes the session row and clears the cookie.
#[utoipa::path(
    get,
    path = "/logout/",
    responses((status = 303, description = "Logged out, redirect to index"))
)]
pub async fn user_logout(
    SessionUser { user, session_id }: SessionUser,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    state.repo.delete_session(session_id).await?;
    tracing::info!(user_id = %user.id, "user logged out");
    Ok((
        [(header::SET_COOKIE, auth::removal_cookie().to_string())],
        Redirect::to("/"),
    )
        .into_response())
}

/// [Authenticated Route] Static text for logged-in users.
#[utoipa::path(
    get,
    path = "/restricted/",
    responses(
        (status = 200, description = "Restricted text", content_type = "text/plain", body = String),
        (status = 303, description = "Not logged in")
    )
)]
pub async fn restricted() -> &'static str {
    RESTRICTED_MESSAGE
}

/// Liveness probe.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "ok", body = String)))]
pub async fn health() -> &'static str {
    "ok"
}

/// Removes a picture whose account was never created.
async fn discard_upload(state: &AppState, key: &str) {
    if let Err(e) = state.storage.delete_object(key).await {
        tracing::warn!(key = %key, error = %e, "could not remove orphaned upload");
    }
}

/// Public URL of a category detail page.
pub fn category_url(category: &Category) -> String {
    format!("/category/{}/", category.slug)
}
