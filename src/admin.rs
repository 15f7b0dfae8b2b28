//! Admin panel for categories and pages.
//!
//! The registrations below describe what each changelist shows and how the edit
//! screens group their fields; the handlers turn them into generic list and form
//! templates.

use std::collections::{BTreeMap, HashMap};

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tera::Context;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::SessionUser,
    error::{AppError, RepositoryError},
    forms::{self, FormErrors},
    handlers::category_url,
    models::{Category, NewCategory, NewPage, Page, PageChange},
};

// --- Registrations ---

/// Fieldset
///
/// A titled group of fields on an edit screen.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Fieldset {
    pub title: Option<&'static str>,
    pub fields: &'static [&'static str],
}

/// ModelAdmin
///
/// Static description of how one model appears in the admin panel.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelAdmin {
    pub model_name: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub list_display: &'static [&'static str],
    pub fieldsets: &'static [Fieldset],
}

impl ModelAdmin {
    pub fn changelist_url(&self) -> String {
        format!("/admin/rango/{}/", self.model_name)
    }

    pub fn add_url(&self) -> String {
        format!("/admin/rango/{}/add/", self.model_name)
    }

    pub fn change_url(&self, id: Uuid) -> String {
        format!("/admin/rango/{}/{}/change/", self.model_name, id)
    }

    pub fn delete_url(&self, id: Uuid) -> String {
        format!("/admin/rango/{}/{}/delete/", self.model_name, id)
    }
}

pub const CATEGORY_ADMIN: ModelAdmin = ModelAdmin {
    model_name: "category",
    verbose_name: "category",
    verbose_name_plural: "Categories",
    list_display: &["name", "views", "likes"],
    fieldsets: &[
        Fieldset {
            title: None,
            fields: &["name"],
        },
        Fieldset {
            title: Some("views and likes"),
            fields: &["views", "likes"],
        },
    ],
};

pub const PAGE_ADMIN: ModelAdmin = ModelAdmin {
    model_name: "page",
    verbose_name: "page",
    verbose_name_plural: "Pages",
    list_display: &["category", "title", "url"],
    fieldsets: &[
        Fieldset {
            title: None,
            fields: &["category"],
        },
        Fieldset {
            title: Some("Detail information"),
            fields: &["title", "url", "views"],
        },
    ],
};

/// Blank page rows offered under a category's edit screen.
pub const PAGE_INLINE_EXTRA: usize = 3;

pub const REGISTERED: [ModelAdmin; 2] = [CATEGORY_ADMIN, PAGE_ADMIN];

// --- Forms ---

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

fn parse_counter(field: &str, raw: &str, errors: &mut FormErrors) -> i32 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    match raw.parse::<i32>() {
        Ok(value) if value >= 0 => value,
        Ok(_) => {
            errors.add(field, "Ensure this value is greater than or equal to 0.");
            0
        }
        Err(_) => {
            errors.add(field, "Enter a whole number.");
            0
        }
    }
}

fn value_of<'a>(pairs: &'a [(String, String)], key: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

/// CategoryAdminForm
///
/// Category edit form. Counters stay textual until `clean` so a bad number is a
/// field error rather than a rejected request.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct CategoryAdminForm {
    #[validate(
        length(min = 1, max = 128, message = "This field is required (at most 128 characters)."),
        custom(function = "forms::validate_has_slug")
    )]
    pub name: String,
    pub views: String,
    pub likes: String,
}

impl CategoryAdminForm {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            name: value_of(pairs, "name").trim().to_string(),
            views: value_of(pairs, "views").to_string(),
            likes: value_of(pairs, "likes").to_string(),
        }
    }

    pub fn from_category(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            views: category.views.to_string(),
            likes: category.likes.to_string(),
        }
    }

    pub fn clean(&self) -> Result<NewCategory, FormErrors> {
        let mut errors = forms::check(self);
        let views = parse_counter("views", &self.views, &mut errors);
        let likes = parse_counter("likes", &self.likes, &mut errors);
        if errors.is_empty() {
            Ok(NewCategory {
                name: self.name.clone(),
                views,
                likes,
            })
        } else {
            Err(errors)
        }
    }

    fn value(&self, field: &str) -> String {
        match field {
            "name" => self.name.clone(),
            "views" => self.views.clone(),
            "likes" => self.likes.clone(),
            _ => String::new(),
        }
    }
}

/// PageAdminForm
///
/// Page edit form; `category` holds the selected category id.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct PageAdminForm {
    pub category: String,
    #[validate(length(min = 1, max = 128, message = "This field is required (at most 128 characters)."))]
    pub title: String,
    #[validate(
        length(min = 1, max = 200, message = "This field is required (at most 200 characters)."),
        url(message = "Enter a valid URL.")
    )]
    pub url: String,
    pub views: String,
}

impl PageAdminForm {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            category: value_of(pairs, "category").trim().to_string(),
            title: value_of(pairs, "title").trim().to_string(),
            url: forms::clean_url(value_of(pairs, "url")),
            views: value_of(pairs, "views").to_string(),
        }
    }

    pub fn from_page(page: &Page) -> Self {
        Self {
            category: page.category_id.to_string(),
            title: page.title.clone(),
            url: page.url.clone(),
            views: page.views.to_string(),
        }
    }

    /// Validates against the categories that currently exist.
    pub fn clean(&self, categories: &[Category]) -> Result<NewPage, FormErrors> {
        let mut errors = forms::check(self);
        let views = parse_counter("views", &self.views, &mut errors);

        let category_id = if self.category.is_empty() {
            errors.add("category", REQUIRED);
            None
        } else {
            let found = Uuid::parse_str(&self.category)
                .ok()
                .filter(|id| categories.iter().any(|c| c.id == *id));
            if found.is_none() {
                errors.add("category", INVALID_CHOICE);
            }
            found
        };

        match category_id {
            Some(category_id) if errors.is_empty() => Ok(NewPage {
                category_id,
                title: self.title.clone(),
                url: self.url.clone(),
                views,
            }),
            _ => Err(errors),
        }
    }

    fn value(&self, field: &str) -> String {
        match field {
            "category" => self.category.clone(),
            "title" => self.title.clone(),
            "url" => self.url.clone(),
            "views" => self.views.clone(),
            _ => String::new(),
        }
    }
}

// --- Inline Pages ---

/// InlinePageRow
///
/// One row of the page formset under a category. Submitted as
/// `pages-{index}-{id|title|url|views|DELETE}`. `id` is kept as submitted so
/// a rejected value is echoed back with its error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InlinePageRow {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub url: String,
    pub views: String,
    pub delete: bool,
    pub errors: FormErrors,
}

impl InlinePageRow {
    fn from_page(index: usize, page: &Page) -> Self {
        Self {
            index,
            id: page.id.to_string(),
            title: page.title.clone(),
            url: page.url.clone(),
            views: page.views.to_string(),
            ..Self::default()
        }
    }

    fn blank(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    fn is_blank(&self) -> bool {
        self.id.is_empty() && self.title.trim().is_empty() && self.url.trim().is_empty()
    }

    /// Validates the row and records field errors on it. Untouched extra rows
    /// produce no action. A row may only name one of `owned`, the pages that
    /// already belong to the category being saved.
    pub fn action(&mut self, category_id: Uuid, owned: &[Uuid]) -> Option<PageChange> {
        if self.is_blank() {
            return None;
        }
        let id = if self.id.is_empty() {
            None
        } else {
            match Uuid::parse_str(&self.id) {
                Ok(id) if owned.contains(&id) => Some(id),
                _ => {
                    let mut errors = FormErrors::default();
                    errors.add("id", INVALID_CHOICE);
                    self.errors = errors;
                    return None;
                }
            }
        };
        if let (Some(id), true) = (id, self.delete) {
            return Some(PageChange::Delete(id));
        }

        let form = PageAdminForm {
            category: category_id.to_string(),
            title: self.title.trim().to_string(),
            url: forms::clean_url(&self.url),
            views: self.views.clone(),
        };
        let mut errors = forms::check(&form);
        let views = parse_counter("views", &form.views, &mut errors);
        if !errors.is_empty() {
            self.errors = errors;
            return None;
        }

        let page = NewPage {
            category_id,
            title: form.title,
            url: form.url,
            views,
        };
        Some(match id {
            Some(id) => PageChange::Update(id, page),
            None => PageChange::Create(page),
        })
    }
}

/// inline_rows
///
/// Collects the `pages-N-*` fields of a submission into rows ordered by index.
pub fn inline_rows(pairs: &[(String, String)]) -> Vec<InlinePageRow> {
    let mut rows: BTreeMap<usize, InlinePageRow> = BTreeMap::new();
    for (key, value) in pairs {
        let mut parts = key.splitn(3, '-');
        let (Some("pages"), Some(index), Some(field)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        let row = rows.entry(index).or_insert_with(|| InlinePageRow::blank(index));
        match field {
            "id" => row.id = value.trim().to_string(),
            "title" => row.title = value.clone(),
            "url" => row.url = value.clone(),
            "views" => row.views = value.clone(),
            "DELETE" => row.delete = matches!(value.as_str(), "on" | "true" | "1"),
            _ => {}
        }
    }
    rows.into_values().collect()
}

/// Existing pages followed by the blank extra rows.
fn initial_inline_rows(pages: &[Page]) -> Vec<InlinePageRow> {
    let mut rows: Vec<InlinePageRow> = pages
        .iter()
        .enumerate()
        .map(|(index, page)| InlinePageRow::from_page(index, page))
        .collect();
    let start = rows.len();
    rows.extend((start..start + PAGE_INLINE_EXTRA).map(InlinePageRow::blank));
    rows
}

// --- Rendering Helpers ---

#[derive(Debug, Clone, Serialize)]
struct Choice {
    value: String,
    label: String,
}

#[derive(Debug, Clone, Serialize)]
struct FormField {
    name: &'static str,
    label: String,
    input_type: &'static str,
    value: String,
    choices: Vec<Choice>,
    errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct RenderedFieldset {
    title: Option<&'static str>,
    fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize)]
struct ChangeListRow {
    change_url: String,
    cells: Vec<String>,
}

fn label_for(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn input_type_for(field: &str) -> &'static str {
    match field {
        "views" | "likes" => "number",
        "url" => "url",
        "category" => "select",
        _ => "text",
    }
}

fn fieldsets(
    admin: &ModelAdmin,
    value: impl Fn(&str) -> String,
    errors: &FormErrors,
    choices: &[Choice],
) -> Vec<RenderedFieldset> {
    admin
        .fieldsets
        .iter()
        .map(|fieldset| RenderedFieldset {
            title: fieldset.title,
            fields: fieldset
                .fields
                .iter()
                .map(|&name| {
                    let input_type = input_type_for(name);
                    FormField {
                        name,
                        label: label_for(name),
                        input_type,
                        value: value(name),
                        choices: if input_type == "select" {
                            choices.to_vec()
                        } else {
                            Vec::new()
                        },
                        errors: errors.get(name).map(<[String]>::to_vec).unwrap_or_default(),
                    }
                })
                .collect(),
        })
        .collect()
}

fn category_choices(categories: &[Category]) -> Vec<Choice> {
    categories
        .iter()
        .map(|c| Choice {
            value: c.id.to_string(),
            label: c.name.clone(),
        })
        .collect()
}

/// Everything the generic change form template needs.
struct ChangeForm<'a> {
    admin: &'a ModelAdmin,
    object_id: Option<Uuid>,
    view_on_site: Option<String>,
    fieldsets: Vec<RenderedFieldset>,
    inline: Option<Vec<InlinePageRow>>,
    errors: &'a FormErrors,
}

fn render_change_form(state: &AppState, form: ChangeForm<'_>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    let title = match form.object_id {
        Some(_) => format!("Change {}", form.admin.verbose_name),
        None => format!("Add {}", form.admin.verbose_name),
    };
    let action = match form.object_id {
        Some(id) => form.admin.change_url(id),
        None => form.admin.add_url(),
    };
    context.insert("title", &title);
    context.insert("action", &action);
    context.insert("model", form.admin);
    context.insert("changelist_url", &form.admin.changelist_url());
    if let Some(id) = form.object_id {
        context.insert("delete_url", &form.admin.delete_url(id));
    }
    if let Some(url) = &form.view_on_site {
        context.insert("view_on_site", url);
    }
    context.insert("fieldsets", &form.fieldsets);
    if let Some(rows) = &form.inline {
        context.insert("inline_rows", rows);
    }
    context.insert("has_errors", &!form.errors.is_empty());
    state.templates.render("admin/change_form.html", &context)
}

fn render_changelist(
    state: &AppState,
    admin: &ModelAdmin,
    rows: Vec<ChangeListRow>,
) -> Result<Html<String>, AppError> {
    let columns: Vec<String> = admin.list_display.iter().map(|f| label_for(f)).collect();
    let mut context = Context::new();
    context.insert("model", admin);
    context.insert("columns", &columns);
    context.insert("rows", &rows);
    context.insert("add_url", &admin.add_url());
    state.templates.render("admin/change_list.html", &context)
}

fn require_staff(session: &SessionUser) -> Result<(), AppError> {
    if session.user.is_staff {
        Ok(())
    } else {
        tracing::warn!(user_id = %session.user.id, "non-staff user tried to open the admin panel");
        Err(AppError::Forbidden)
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Validates every inline row; `None` when at least one row has errors.
fn inline_actions(
    rows: &mut [InlinePageRow],
    category_id: Uuid,
    owned: &[Uuid],
) -> Option<Vec<PageChange>> {
    let actions: Vec<PageChange> = rows
        .iter_mut()
        .filter_map(|row| row.action(category_id, owned))
        .collect();
    rows.iter().all(|row| row.errors.is_empty()).then_some(actions)
}

// --- Handlers ---

/// admin_index
///
/// [Admin Route] Lists the registered models.
#[utoipa::path(
    get,
    path = "/admin/",
    responses(
        (status = 200, description = "Admin index", content_type = "text/html", body = String),
        (status = 403, description = "Not staff")
    )
)]
pub async fn admin_index(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    require_staff(&session)?;

    #[derive(Serialize)]
    struct Entry {
        name: &'static str,
        changelist_url: String,
        add_url: String,
    }

    let models: Vec<Entry> = REGISTERED
        .iter()
        .map(|admin| Entry {
            name: admin.verbose_name_plural,
            changelist_url: admin.changelist_url(),
            add_url: admin.add_url(),
        })
        .collect();

    let mut context = Context::new();
    context.insert("models", &models);
    context.insert("username", &session.user.username);
    state.templates.render("admin/index.html", &context)
}

/// [Admin Route] Category changelist: name, views, likes.
#[utoipa::path(
    get,
    path = "/admin/rango/category/",
    responses((status = 200, description = "Category changelist", content_type = "text/html", body = String))
)]
pub async fn category_changelist(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    require_staff(&session)?;
    let categories = state.repo.list_categories().await?;
    let rows = categories
        .iter()
        .map(|category| ChangeListRow {
            change_url: CATEGORY_ADMIN.change_url(category.id),
            cells: CATEGORY_ADMIN
                .list_display
                .iter()
                .map(|&field| CategoryAdminForm::from_category(category).value(field))
                .collect(),
        })
        .collect();
    render_changelist(&state, &CATEGORY_ADMIN, rows)
}

#[utoipa::path(
    get,
    path = "/admin/rango/category/add/",
    responses((status = 200, description = "Empty category form", content_type = "text/html", body = String))
)]
pub async fn category_add_form(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    require_staff(&session)?;
    let form = CategoryAdminForm {
        views: "0".to_string(),
        likes: "0".to_string(),
        ..CategoryAdminForm::default()
    };
    let errors = FormErrors::default();
    render_change_form(
        &state,
        ChangeForm {
            admin: &CATEGORY_ADMIN,
            object_id: None,
            view_on_site: None,
            fieldsets: fieldsets(&CATEGORY_ADMIN, |f| form.value(f), &errors, &[]),
            inline: Some(initial_inline_rows(&[])),
            errors: &errors,
        },
    )
}

/// category_add
///
/// [Admin Route] Creates a category together with any filled-in inline pages.
#[utoipa::path(
    post,
    path = "/admin/rango/category/add/",
    responses(
        (status = 303, description = "Saved, back to the changelist"),
        (status = 200, description = "Form with errors", content_type = "text/html", body = String)
    )
)]
pub async fn category_add(
    session: SessionUser,
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let form = CategoryAdminForm::from_pairs(&pairs);
    let mut rows = inline_rows(&pairs);

    let mut errors = match form.clean() {
        Ok(new_category) => {
            // A new category owns no pages yet, so every row must be a new page.
            // The repository attaches them to the category it creates.
            match inline_actions(&mut rows, Uuid::nil(), &[]) {
                Some(actions) => {
                    let pages: Vec<NewPage> = actions
                        .into_iter()
                        .filter_map(|action| match action {
                            PageChange::Create(page) => Some(page),
                            _ => None,
                        })
                        .collect();
                    match state.repo.create_category_with_pages(new_category, pages).await {
                        Ok(category) => {
                            tracing::info!(category_id = %category.id, "category added via admin");
                            return Ok(
                                Redirect::to(&CATEGORY_ADMIN.changelist_url()).into_response()
                            );
                        }
                        Err(RepositoryError::Conflict(_)) => {
                            let mut errors = FormErrors::default();
                            errors.add("name", "Category with this Name already exists.");
                            errors
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                None => FormErrors::default(),
            }
        }
        Err(errors) => errors,
    };
    if errors.is_empty() && rows.iter().any(|row| !row.errors.is_empty()) {
        errors.add("pages", "Please correct the errors in the pages below.");
    }

    render_change_form(
        &state,
        ChangeForm {
            admin: &CATEGORY_ADMIN,
            object_id: None,
            view_on_site: None,
            fieldsets: fieldsets(&CATEGORY_ADMIN, |f| form.value(f), &errors, &[]),
            inline: Some(rows),
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

#[utoipa::path(
    get,
    path = "/admin/rango/category/{id}/change/",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category edit form", content_type = "text/html", body = String),
        (status = 404, description = "Not Found")
    )
)]
pub async fn category_change_form(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let Some(category) = state.repo.get_category(id).await? else {
        return Ok(not_found());
    };
    let pages = state.repo.pages_for_category(category.id).await?;
    let form = CategoryAdminForm::from_category(&category);
    let errors = FormErrors::default();

    render_change_form(
        &state,
        ChangeForm {
            admin: &CATEGORY_ADMIN,
            object_id: Some(category.id),
            view_on_site: Some(category_url(&category)),
            fieldsets: fieldsets(&CATEGORY_ADMIN, |f| form.value(f), &errors, &[]),
            inline: Some(initial_inline_rows(&pages)),
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

/// category_change
///
/// [Admin Route] Updates a category (its slug follows the new name) and applies
/// the inline page rows.
#[utoipa::path(
    post,
    path = "/admin/rango/category/{id}/change/",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 303, description = "Saved, back to the changelist"),
        (status = 200, description = "Form with errors", content_type = "text/html", body = String),
        (status = 404, description = "Not Found")
    )
)]
pub async fn category_change(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let Some(category) = state.repo.get_category(id).await? else {
        return Ok(not_found());
    };
    let owned: Vec<Uuid> = state
        .repo
        .pages_for_category(category.id)
        .await?
        .into_iter()
        .map(|page| page.id)
        .collect();
    let form = CategoryAdminForm::from_pairs(&pairs);
    let mut rows = inline_rows(&pairs);

    let mut errors = match (form.clean(), inline_actions(&mut rows, category.id, &owned)) {
        (Ok(changes), Some(actions)) => match state
            .repo
            .update_category(category.id, changes, actions)
            .await
        {
            Ok(Some(updated)) => {
                tracing::info!(category_id = %updated.id, slug = %updated.slug, "category changed via admin");
                return Ok(Redirect::to(&CATEGORY_ADMIN.changelist_url()).into_response());
            }
            Ok(None) => return Ok(not_found()),
            Err(RepositoryError::Conflict(_)) => {
                let mut errors = FormErrors::default();
                errors.add("name", "Category with this Name already exists.");
                errors
            }
            Err(e) => return Err(e.into()),
        },
        (Ok(_), None) => FormErrors::default(),
        (Err(errors), _) => errors,
    };
    if rows.iter().any(|row| !row.errors.is_empty()) {
        errors.add("pages", "Please correct the errors in the pages below.");
    }

    render_change_form(
        &state,
        ChangeForm {
            admin: &CATEGORY_ADMIN,
            object_id: Some(category.id),
            view_on_site: Some(category_url(&category)),
            fieldsets: fieldsets(&CATEGORY_ADMIN, |f| form.value(f), &errors, &[]),
            inline: Some(rows),
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

/// [Admin Route] Deletes a category and, through the cascade, its pages.
#[utoipa::path(
    post,
    path = "/admin/rango/category/{id}/delete/",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses((status = 303, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn category_delete(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    if state.repo.delete_category(id).await? {
        tracing::info!(category_id = %id, "category deleted via admin");
        Ok(Redirect::to(&CATEGORY_ADMIN.changelist_url()).into_response())
    } else {
        Ok(not_found())
    }
}

/// [Admin Route] Page changelist: category, title, url.
#[utoipa::path(
    get,
    path = "/admin/rango/page/",
    responses((status = 200, description = "Page changelist", content_type = "text/html", body = String))
)]
pub async fn page_changelist(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    require_staff(&session)?;
    let categories = state.repo.list_categories().await?;
    let names: HashMap<Uuid, &str> = categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();
    let pages = state.repo.list_pages().await?;

    let rows = pages
        .iter()
        .map(|page| ChangeListRow {
            change_url: PAGE_ADMIN.change_url(page.id),
            cells: PAGE_ADMIN
                .list_display
                .iter()
                .map(|&field| match field {
                    "category" => names
                        .get(&page.category_id)
                        .map(|name| name.to_string())
                        .unwrap_or_default(),
                    other => PageAdminForm::from_page(page).value(other),
                })
                .collect(),
        })
        .collect();
    render_changelist(&state, &PAGE_ADMIN, rows)
}

#[utoipa::path(
    get,
    path = "/admin/rango/page/add/",
    responses((status = 200, description = "Empty page form", content_type = "text/html", body = String))
)]
pub async fn page_add_form(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    require_staff(&session)?;
    let categories = state.repo.list_categories().await?;
    let form = PageAdminForm {
        views: "0".to_string(),
        ..PageAdminForm::default()
    };
    let errors = FormErrors::default();
    render_change_form(
        &state,
        ChangeForm {
            admin: &PAGE_ADMIN,
            object_id: None,
            view_on_site: None,
            fieldsets: fieldsets(
                &PAGE_ADMIN,
                |f| form.value(f),
                &errors,
                &category_choices(&categories),
            ),
            inline: None,
            errors: &errors,
        },
    )
}

#[utoipa::path(
    post,
    path = "/admin/rango/page/add/",
    responses(
        (status = 303, description = "Saved, back to the changelist"),
        (status = 200, description = "Form with errors", content_type = "text/html", body = String)
    )
)]
pub async fn page_add(
    session: SessionUser,
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let categories = state.repo.list_categories().await?;
    let form = PageAdminForm::from_pairs(&pairs);

    let errors = match form.clean(&categories) {
        Ok(new_page) => {
            let page = state.repo.create_page(new_page).await?;
            tracing::info!(page_id = %page.id, "page added via admin");
            return Ok(Redirect::to(&PAGE_ADMIN.changelist_url()).into_response());
        }
        Err(errors) => errors,
    };

    render_change_form(
        &state,
        ChangeForm {
            admin: &PAGE_ADMIN,
            object_id: None,
            view_on_site: None,
            fieldsets: fieldsets(
                &PAGE_ADMIN,
                |f| form.value(f),
                &errors,
                &category_choices(&categories),
            ),
            inline: None,
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

#[utoipa::path(
    get,
    path = "/admin/rango/page/{id}/change/",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses(
        (status = 200, description = "Page edit form", content_type = "text/html", body = String),
        (status = 404, description = "Not Found")
    )
)]
pub async fn page_change_form(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let Some(page) = state.repo.get_page(id).await? else {
        return Ok(not_found());
    };
    let categories = state.repo.list_categories().await?;
    let form = PageAdminForm::from_page(&page);
    let errors = FormErrors::default();

    render_change_form(
        &state,
        ChangeForm {
            admin: &PAGE_ADMIN,
            object_id: Some(page.id),
            view_on_site: Some(page.url.clone()),
            fieldsets: fieldsets(
                &PAGE_ADMIN,
                |f| form.value(f),
                &errors,
                &category_choices(&categories),
            ),
            inline: None,
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

#[utoipa::path(
    post,
    path = "/admin/rango/page/{id}/change/",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses(
        (status = 303, description = "Saved, back to the changelist"),
        (status = 200, description = "Form with errors", content_type = "text/html", body = String),
        (status = 404, description = "Not Found")
    )
)]
pub async fn page_change(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    let Some(page) = state.repo.get_page(id).await? else {
        return Ok(not_found());
    };
    let categories = state.repo.list_categories().await?;
    let form = PageAdminForm::from_pairs(&pairs);

    let errors = match form.clean(&categories) {
        Ok(changes) => {
            return match state.repo.update_page(page.id, changes).await? {
                Some(updated) => {
                    tracing::info!(page_id = %updated.id, "page changed via admin");
                    Ok(Redirect::to(&PAGE_ADMIN.changelist_url()).into_response())
                }
                None => Ok(not_found()),
            };
        }
        Err(errors) => errors,
    };

    render_change_form(
        &state,
        ChangeForm {
            admin: &PAGE_ADMIN,
            object_id: Some(page.id),
            view_on_site: Some(page.url.clone()),
            fieldsets: fieldsets(
                &PAGE_ADMIN,
                |f| form.value(f),
                &errors,
                &category_choices(&categories),
            ),
            inline: None,
            errors: &errors,
        },
    )
    .map(IntoResponse::into_response)
}

#[utoipa::path(
    post,
    path = "/admin/rango/page/{id}/delete/",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses((status = 303, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn page_delete(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_staff(&session)?;
    if state.repo.delete_page(id).await? {
        tracing::info!(page_id = %id, "page deleted via admin");
        Ok(Redirect::to(&PAGE_ADMIN.changelist_url()).into_response())
    } else {
        Ok(not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn registrations_match_the_panel_layout() {
        assert_eq!(CATEGORY_ADMIN.list_display, ["name", "views", "likes"]);
        assert_eq!(CATEGORY_ADMIN.fieldsets[1].title, Some("views and likes"));
        assert_eq!(PAGE_ADMIN.list_display, ["category", "title", "url"]);
        assert_eq!(PAGE_ADMIN.fieldsets[1].fields, ["title", "url", "views"]);
    }

    #[test]
    fn category_form_reports_bad_counters() {
        let form = CategoryAdminForm::from_pairs(&pairs(&[
            ("name", "Python"),
            ("views", "-3"),
            ("likes", "many"),
        ]));
        let errors = form.clean().unwrap_err();
        assert!(errors.has("views"));
        assert!(errors.has("likes"));
        assert!(!errors.has("name"));
    }

    #[test]
    fn category_form_defaults_blank_counters_to_zero() {
        let form = CategoryAdminForm::from_pairs(&pairs(&[("name", "Python")]));
        assert_eq!(form.clean().unwrap(), NewCategory::named("Python"));
    }

    #[test]
    fn page_form_requires_an_existing_category() {
        let category = Category {
            id: Uuid::new_v4(),
            name: "Python".into(),
            slug: "python".into(),
            ..Category::default()
        };
        let missing = PageAdminForm::from_pairs(&pairs(&[
            ("category", &Uuid::new_v4().to_string()),
            ("title", "Docs"),
            ("url", "docs.python.org"),
        ]));
        assert_eq!(
            missing.clean(std::slice::from_ref(&category)).unwrap_err().get("category"),
            Some(&[INVALID_CHOICE.to_string()][..])
        );

        let ok = PageAdminForm::from_pairs(&pairs(&[
            ("category", &category.id.to_string()),
            ("title", "Docs"),
            ("url", "docs.python.org"),
            ("views", "7"),
        ]));
        let page = ok.clean(&[category.clone()]).unwrap();
        assert_eq!(page.category_id, category.id);
        assert_eq!(page.url, "http://docs.python.org");
        assert_eq!(page.views, 7);
    }

    #[test]
    fn inline_rows_become_actions() {
        let existing = Uuid::new_v4();
        let removed = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let mut rows = inline_rows(&pairs(&[
            ("name", "Python"),
            ("pages-0-id", &existing.to_string()),
            ("pages-0-title", "Official Tutorial"),
            ("pages-0-url", "https://docs.python.org/3/tutorial/"),
            ("pages-0-views", "12"),
            ("pages-1-id", &removed.to_string()),
            ("pages-1-title", "Old"),
            ("pages-1-url", "http://old.example.com"),
            ("pages-1-DELETE", "on"),
            ("pages-2-title", "Think Python"),
            ("pages-2-url", "greenteapress.com/thinkpython"),
            ("pages-3-title", ""),
            ("pages-3-url", ""),
        ]));
        assert_eq!(rows.len(), 4);

        let actions = inline_actions(&mut rows, parent, &[existing, removed]).unwrap();
        assert_eq!(actions.len(), 3);
        assert!(matches!(&actions[0], PageChange::Update(id, page) if *id == existing && page.views == 12));
        assert_eq!(actions[1], PageChange::Delete(removed));
        assert!(matches!(&actions[2], PageChange::Create(page)
            if page.category_id == parent && page.url == "http://greenteapress.com/thinkpython"));
    }

    #[test]
    fn invalid_inline_row_blocks_the_save() {
        let mut rows = inline_rows(&pairs(&[
            ("pages-0-title", "No url"),
            ("pages-0-url", ""),
        ]));
        assert!(inline_actions(&mut rows, Uuid::new_v4(), &[]).is_none());
        assert!(rows[0].errors.has("url"));
    }

    #[test]
    fn inline_rows_only_name_pages_of_their_category() {
        let owned = Uuid::new_v4();
        let elsewhere = Uuid::new_v4();
        let mut rows = inline_rows(&pairs(&[
            ("pages-0-id", &owned.to_string()),
            ("pages-0-title", "Docs"),
            ("pages-0-url", "http://docs.python.org"),
            ("pages-1-id", &elsewhere.to_string()),
            ("pages-1-DELETE", "on"),
            ("pages-2-id", "not-a-uuid"),
            ("pages-2-title", "Tut"),
            ("pages-2-url", "http://tut.example.com"),
        ]));

        assert!(inline_actions(&mut rows, Uuid::new_v4(), &[owned]).is_none());
        assert!(rows[0].errors.is_empty());
        assert_eq!(rows[1].errors.get("id"), Some(&[INVALID_CHOICE.to_string()][..]));
        assert_eq!(rows[2].errors.get("id"), Some(&[INVALID_CHOICE.to_string()][..]));
        assert_eq!(rows[2].id, "not-a-uuid");
    }

    #[test]
    fn change_form_offers_extra_inline_rows() {
        let page = Page {
            id: Uuid::new_v4(),
            title: "Docs".into(),
            ..Page::default()
        };
        let rows = initial_inline_rows(&[page]);
        assert_eq!(rows.len(), 1 + PAGE_INLINE_EXTRA);
        assert_eq!(rows[3].index, 3);
        assert!(rows[3].id.is_empty());
    }
}
