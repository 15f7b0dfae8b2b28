use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// Category
///
/// A named grouping of pages with popularity counters. The `slug` is derived from
/// the name on every save and is what the public URLs use.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub views: i32,
    pub likes: i32,
}

/// Page
///
/// A link to an external resource, owned by exactly one category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default, PartialEq)]
pub struct Page {
    pub id: Uuid,
    // FK to categories.id (cascade on delete).
    pub category_id: Uuid,
    pub title: String,
    pub url: String,
    pub views: i32,
}

/// User
///
/// The credential record. `password` holds an argon2 PHC string and is never
/// serialized into responses or template contexts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    // Inactive users can authenticate but may not open a session.
    pub is_active: bool,
    // Grants access to the admin panel.
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// UserProfile
///
/// One-to-one extension of `User`. `picture` is the object storage key of the
/// uploaded image, if any.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub website: Option<String>,
    pub picture: Option<String>,
}

/// Session
///
/// Server-side login session. The cookie only carries a signed reference to this
/// row, so deleting it logs the user out everywhere the token was presented.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// --- Write Models (Repository Input) ---

/// NewCategory
///
/// Insert/update payload for a category. The slug is never supplied by callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub views: i32,
    pub likes: i32,
}

impl NewCategory {
    /// A fresh category with zeroed counters.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            views: 0,
            likes: 0,
        }
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPage {
    pub category_id: Uuid,
    pub title: String,
    pub url: String,
    pub views: i32,
}

/// PageChange
///
/// One edit to a category's pages, saved together with the category itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PageChange {
    Create(NewPage),
    Update(Uuid, NewPage),
    Delete(Uuid),
}

/// NewUser
///
/// Registration payload. The password must already be hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUserProfile {
    pub website: Option<String>,
    pub picture: Option<String>,
}

/// slugify
///
/// URL-safe identifier for a category name: lowercase ASCII, words joined by `-`.
pub fn slugify(name: &str) -> String {
    slug::slugify(name)
}
