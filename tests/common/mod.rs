#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use rango::{
    AppConfig, AppState, MockStorageService, Templates, create_router,
    auth,
    error::{RepoResult, RepositoryError},
    models::{
        Category, NewCategory, NewPage, NewUser, NewUserProfile, Page, PageChange, Session, User,
        UserProfile,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- In-memory repository ---

#[derive(Default, Clone)]
struct Tables {
    categories: Vec<Category>,
    pages: Vec<Page>,
    users: Vec<User>,
    profiles: Vec<UserProfile>,
    sessions: Vec<Session>,
}

/// Stateful stand-in for Postgres with the same ordering and uniqueness rules.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    fail_page_writes: AtomicBool,
    lose_registration_race: AtomicBool,
}

impl InMemoryRepository {
    pub fn categories(&self) -> Vec<Category> {
        self.tables.lock().unwrap().categories.clone()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.tables.lock().unwrap().pages.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        self.tables.lock().unwrap().profiles.clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.tables.lock().unwrap().sessions.clone()
    }

    /// Page statements inside category saves fail from now on, as a dropped
    /// connection would mid-transaction.
    pub fn fail_page_writes(&self) {
        self.fail_page_writes.store(true, Ordering::SeqCst);
    }

    /// The next registration hits the username constraint, as if another
    /// request took the name after the form was checked.
    pub fn lose_registration_race(&self) {
        self.lose_registration_race.store(true, Ordering::SeqCst);
    }

    fn page_write(&self) -> RepoResult<()> {
        if self.fail_page_writes.load(Ordering::SeqCst) {
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    pub fn set_active(&self, username: &str, active: bool) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.username == username) {
            user.is_active = active;
        }
    }
}

fn conflict_on_name(tables: &Tables, new: &NewCategory, except: Option<Uuid>) -> bool {
    let slug = new.slug();
    tables
        .categories
        .iter()
        .filter(|c| Some(c.id) != except)
        .any(|c| c.name == new.name || c.slug == slug)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn top_categories(&self, limit: i64) -> RepoResult<Vec<Category>> {
        let mut categories = self.categories();
        categories.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| a.name.cmp(&b.name)));
        categories.truncate(limit as usize);
        Ok(categories)
    }

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut categories = self.categories();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        Ok(self.categories().into_iter().find(|c| c.id == id))
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        Ok(self.categories().into_iter().find(|c| c.slug == slug))
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let mut tables = self.tables.lock().unwrap();
        if conflict_on_name(&tables, &new, None) {
            return Err(RepositoryError::Conflict("categories_name_key".into()));
        }
        let category = Category {
            id: Uuid::new_v4(),
            slug: new.slug(),
            name: new.name,
            views: new.views,
            likes: new.likes,
        };
        tables.categories.push(category.clone());
        Ok(category)
    }

    async fn create_category_with_pages(
        &self,
        new: NewCategory,
        pages: Vec<NewPage>,
    ) -> RepoResult<Category> {
        let mut tables = self.tables.lock().unwrap();
        if conflict_on_name(&tables, &new, None) {
            return Err(RepositoryError::Conflict("categories_name_key".into()));
        }
        let mut staged = tables.clone();
        let category = Category {
            id: Uuid::new_v4(),
            slug: new.slug(),
            name: new.name,
            views: new.views,
            likes: new.likes,
        };
        staged.categories.push(category.clone());
        for page in pages {
            self.page_write()?;
            staged.pages.push(Page {
                id: Uuid::new_v4(),
                category_id: category.id,
                title: page.title,
                url: page.url,
                views: page.views,
            });
        }
        *tables = staged;
        Ok(category)
    }

    /// Works on a copy of the tables and swaps it in only when every statement
    /// succeeded, like the Postgres transaction.
    async fn update_category(
        &self,
        id: Uuid,
        changes: NewCategory,
        pages: Vec<PageChange>,
    ) -> RepoResult<Option<Category>> {
        let mut tables = self.tables.lock().unwrap();
        if conflict_on_name(&tables, &changes, Some(id)) {
            return Err(RepositoryError::Conflict("categories_name_key".into()));
        }
        let mut staged = tables.clone();
        let Some(category) = staged.categories.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        category.slug = changes.slug();
        category.name = changes.name;
        category.views = changes.views;
        category.likes = changes.likes;
        let category = category.clone();

        for change in pages {
            self.page_write()?;
            match change {
                PageChange::Create(page) => staged.pages.push(Page {
                    id: Uuid::new_v4(),
                    category_id: id,
                    title: page.title,
                    url: page.url,
                    views: page.views,
                }),
                PageChange::Update(page_id, page) => {
                    if let Some(p) = staged
                        .pages
                        .iter_mut()
                        .find(|p| p.id == page_id && p.category_id == id)
                    {
                        p.title = page.title;
                        p.url = page.url;
                        p.views = page.views;
                    }
                }
                PageChange::Delete(page_id) => staged
                    .pages
                    .retain(|p| !(p.id == page_id && p.category_id == id)),
            }
        }
        *tables = staged;
        Ok(Some(category))
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.categories.len();
        tables.categories.retain(|c| c.id != id);
        tables.pages.retain(|p| p.category_id != id);
        Ok(tables.categories.len() < before)
    }

    async fn top_pages(&self, limit: i64) -> RepoResult<Vec<Page>> {
        let mut pages = self.pages();
        pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.title.cmp(&b.title)));
        pages.truncate(limit as usize);
        Ok(pages)
    }

    async fn list_pages(&self) -> RepoResult<Vec<Page>> {
        let mut pages = self.pages();
        pages.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(pages)
    }

    async fn pages_for_category(&self, category_id: Uuid) -> RepoResult<Vec<Page>> {
        Ok(self
            .pages()
            .into_iter()
            .filter(|p| p.category_id == category_id)
            .collect())
    }

    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>> {
        Ok(self.pages().into_iter().find(|p| p.id == id))
    }

    async fn create_page(&self, new: NewPage) -> RepoResult<Page> {
        let page = Page {
            id: Uuid::new_v4(),
            category_id: new.category_id,
            title: new.title,
            url: new.url,
            views: new.views,
        };
        self.tables.lock().unwrap().pages.push(page.clone());
        Ok(page)
    }

    async fn update_page(&self, id: Uuid, changes: NewPage) -> RepoResult<Option<Page>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.pages.iter_mut().find(|p| p.id == id).map(|p| {
            p.category_id = changes.category_id;
            p.title = changes.title;
            p.url = changes.url;
            p.views = changes.views;
            p.clone()
        }))
    }

    async fn delete_page(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.pages.len();
        tables.pages.retain(|p| p.id != id);
        Ok(tables.pages.len() < before)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.users().into_iter().find(|u| u.id == id))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self.users().into_iter().find(|u| u.username == username))
    }

    async fn register_user(
        &self,
        user: NewUser,
        profile: NewUserProfile,
    ) -> RepoResult<(User, UserProfile)> {
        let mut tables = self.tables.lock().unwrap();
        if self.lose_registration_race.swap(false, Ordering::SeqCst)
            || tables.users.iter().any(|u| u.username == user.username)
        {
            return Err(RepositoryError::Conflict("users_username_key".into()));
        }
        let created_user = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password: user.password_hash,
            is_active: user.is_active,
            is_staff: user.is_staff,
            date_joined: Utc::now(),
            last_login: None,
        };
        let created_profile = UserProfile {
            id: Uuid::new_v4(),
            user_id: created_user.id,
            website: profile.website,
            picture: profile.picture,
        };
        tables.users.push(created_user.clone());
        tables.profiles.push(created_profile.clone());
        Ok((created_user, created_profile))
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            expires_at,
        };
        self.tables.lock().unwrap().sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>> {
        Ok(self.sessions().into_iter().find(|s| s.id == id))
    }

    async fn delete_session(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.id != id);
        Ok(tables.sessions.len() < before)
    }
}

// --- Test application ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// `name=value` part of the session cookie set by this response.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(auth::SESSION_COOKIE))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_storage(MockStorageService::new())
}

pub fn spawn_app_with_storage(storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::default());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(storage.clone()) as StorageState,
        templates: Templates::new().expect("templates compile"),
        config: AppConfig::default(),
    };
    TestApp {
        router: create_router(state),
        repo,
        storage,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = serde_urlencoded::to_string(fields).unwrap();
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Inserts a user directly, bypassing the registration form.
    pub async fn create_user(&self, username: &str, password: &str, is_staff: bool) -> User {
        let (user, _) = self
            .repo
            .register_user(
                NewUser {
                    username: username.to_string(),
                    email: format!("{username}@example.com"),
                    password_hash: auth::hash_password(password).unwrap(),
                    is_active: true,
                    is_staff,
                },
                NewUserProfile::default(),
            )
            .await
            .unwrap();
        user
    }

    /// Logs in through the form and returns the session cookie pair.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post_form("/login/", &[("username", username), ("password", password)], None)
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        response.session_cookie().expect("login sets a session cookie")
    }

    pub async fn seed_category(&self, name: &str, views: i32, likes: i32) -> Category {
        self.repo
            .create_category(NewCategory {
                name: name.to_string(),
                views,
                likes,
            })
            .await
            .unwrap()
    }

    pub async fn seed_page(&self, category: &Category, title: &str, url: &str, views: i32) -> Page {
        self.repo
            .create_page(NewPage {
                category_id: category.id,
                title: title.to_string(),
                url: url.to_string(),
                views,
            })
            .await
            .unwrap()
    }
}

// --- Multipart ---

pub const BOUNDARY: &str = "rango-test-boundary";

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
