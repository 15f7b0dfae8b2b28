use crate::error::RepoResult;
use crate::models::{
    Category, NewCategory, NewPage, NewUser, NewUserProfile, Page, PageChange, Session, User,
    UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract used by handlers and the session extractor. Handlers
/// only see `Arc<dyn Repository>`, so tests can swap in an in-memory store.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Categories ---
    // Ranked by likes, most liked first.
    async fn top_categories(&self, limit: i64) -> RepoResult<Vec<Category>>;
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;
    // Fails with `Conflict` when the name (or its slug) is taken.
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    // Creates the category and its first pages in one transaction. Each page is
    // attached to the new category whatever its `category_id` says.
    async fn create_category_with_pages(
        &self,
        new: NewCategory,
        pages: Vec<NewPage>,
    ) -> RepoResult<Category>;
    // Updates the category and applies the page changes in one transaction. Page
    // changes only ever touch pages of this category.
    async fn update_category(
        &self,
        id: Uuid,
        changes: NewCategory,
        pages: Vec<PageChange>,
    ) -> RepoResult<Option<Category>>;
    // Cascades to the category's pages.
    async fn delete_category(&self, id: Uuid) -> RepoResult<bool>;

    // --- Pages ---
    // Ranked by views across all categories.
    async fn top_pages(&self, limit: i64) -> RepoResult<Vec<Page>>;
    async fn list_pages(&self) -> RepoResult<Vec<Page>>;
    async fn pages_for_category(&self, category_id: Uuid) -> RepoResult<Vec<Page>>;
    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>>;
    async fn create_page(&self, new: NewPage) -> RepoResult<Page>;
    async fn update_page(&self, id: Uuid, changes: NewPage) -> RepoResult<Option<Page>>;
    async fn delete_page(&self, id: Uuid) -> RepoResult<bool>;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    // Inserts the user and its profile atomically.
    async fn register_user(
        &self,
        user: NewUser,
        profile: NewUserProfile,
    ) -> RepoResult<(User, UserProfile)>;
    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    // --- Sessions ---
    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>)
    -> RepoResult<Session>;
    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are bound at runtime, so the crate
/// builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, views, likes";
const PAGE_COLUMNS: &str = "id, category_id, title, url, views";
const INSERT_PAGE: &str =
    "INSERT INTO pages (id, category_id, title, url, views) VALUES ($1, $2, $3, $4, $5)";
const USER_COLUMNS: &str =
    "id, username, email, password, is_active, is_staff, date_joined, last_login";

#[async_trait]
impl Repository for PostgresRepository {
    async fn top_categories(&self, limit: i64) -> RepoResult<Vec<Category>> {
        let query = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY likes DESC, name ASC LIMIT $1"
        );
        Ok(sqlx::query_as::<_, Category>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC");
        Ok(sqlx::query_as::<_, Category>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        Ok(sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1");
        Ok(sqlx::query_as::<_, Category>(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_category
    ///
    /// Both `name` and `slug` carry unique constraints; a violation on either
    /// surfaces as `RepositoryError::Conflict`.
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let query = format!(
            "INSERT INTO categories (id, name, slug, views, likes) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {CATEGORY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Category>(&query)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(new.slug())
            .bind(new.views)
            .bind(new.likes)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn create_category_with_pages(
        &self,
        new: NewCategory,
        pages: Vec<NewPage>,
    ) -> RepoResult<Category> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO categories (id, name, slug, views, likes) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {CATEGORY_COLUMNS}"
        );
        let category = sqlx::query_as::<_, Category>(&query)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(new.slug())
            .bind(new.views)
            .bind(new.likes)
            .fetch_one(&mut *tx)
            .await?;

        for page in pages {
            sqlx::query(INSERT_PAGE)
                .bind(Uuid::new_v4())
                .bind(category.id)
                .bind(&page.title)
                .bind(&page.url)
                .bind(page.views)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(category)
    }

    /// update_category
    ///
    /// Page updates and deletes are scoped by `category_id`, so an id that
    /// belongs to another category matches no row.
    async fn update_category(
        &self,
        id: Uuid,
        changes: NewCategory,
        pages: Vec<PageChange>,
    ) -> RepoResult<Option<Category>> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE categories SET name = $2, slug = $3, views = $4, likes = $5 WHERE id = $1 \
             RETURNING {CATEGORY_COLUMNS}"
        );
        let Some(category) = sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .bind(&changes.name)
            .bind(changes.slug())
            .bind(changes.views)
            .bind(changes.likes)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        for change in pages {
            match change {
                PageChange::Create(page) => {
                    sqlx::query(INSERT_PAGE)
                        .bind(Uuid::new_v4())
                        .bind(id)
                        .bind(&page.title)
                        .bind(&page.url)
                        .bind(page.views)
                        .execute(&mut *tx)
                        .await?;
                }
                PageChange::Update(page_id, page) => {
                    sqlx::query(
                        "UPDATE pages SET title = $3, url = $4, views = $5 \
                         WHERE id = $1 AND category_id = $2",
                    )
                    .bind(page_id)
                    .bind(id)
                    .bind(&page.title)
                    .bind(&page.url)
                    .bind(page.views)
                    .execute(&mut *tx)
                    .await?;
                }
                PageChange::Delete(page_id) => {
                    sqlx::query("DELETE FROM pages WHERE id = $1 AND category_id = $2")
                        .bind(page_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(Some(category))
    }

    async fn delete_category(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn top_pages(&self, limit: i64) -> RepoResult<Vec<Page>> {
        let query =
            format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY views DESC, title ASC LIMIT $1");
        Ok(sqlx::query_as::<_, Page>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_pages(&self) -> RepoResult<Vec<Page>> {
        let query = format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY title ASC");
        Ok(sqlx::query_as::<_, Page>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn pages_for_category(&self, category_id: Uuid) -> RepoResult<Vec<Page>> {
        let query = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE category_id = $1");
        Ok(sqlx::query_as::<_, Page>(&query)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>> {
        let query = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1");
        Ok(sqlx::query_as::<_, Page>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_page(&self, new: NewPage) -> RepoResult<Page> {
        let query = format!(
            "INSERT INTO pages (id, category_id, title, url, views) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {PAGE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Page>(&query)
            .bind(Uuid::new_v4())
            .bind(new.category_id)
            .bind(&new.title)
            .bind(&new.url)
            .bind(new.views)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_page(&self, id: Uuid, changes: NewPage) -> RepoResult<Option<Page>> {
        let query = format!(
            "UPDATE pages SET category_id = $2, title = $3, url = $4, views = $5 WHERE id = $1 \
             RETURNING {PAGE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Page>(&query)
            .bind(id)
            .bind(changes.category_id)
            .bind(&changes.title)
            .bind(&changes.url)
            .bind(changes.views)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_page(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// register_user
    ///
    /// Writes the user and its profile in one transaction so a failed profile
    /// insert never leaves an orphaned account behind.
    async fn register_user(
        &self,
        user: NewUser,
        profile: NewUserProfile,
    ) -> RepoResult<(User, UserProfile)> {
        let mut tx = self.pool.begin().await?;

        let user_query = format!(
            "INSERT INTO users (id, username, email, password, is_active, is_staff, date_joined) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING {USER_COLUMNS}"
        );
        let created_user = sqlx::query_as::<_, User>(&user_query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_active)
            .bind(user.is_staff)
            .fetch_one(&mut *tx)
            .await?;

        let created_profile = sqlx::query_as::<_, UserProfile>(
            "INSERT INTO user_profiles (id, user_id, website, picture) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, website, picture",
        )
        .bind(Uuid::new_v4())
        .bind(created_user.id)
        .bind(&profile.website)
        .bind(&profile.picture)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created_user, created_profile))
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Session> {
        Ok(sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ($1, $2, NOW(), $3) \
             RETURNING id, user_id, created_at, expires_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_session(&self, id: Uuid) -> RepoResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_session(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
