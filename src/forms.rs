use std::collections::BTreeMap;

use axum::extract::Multipart;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

/// FormErrors
///
/// Field name to messages, in the shape templates iterate over.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl From<&ValidationErrors> for FormErrors {
    fn from(errors: &ValidationErrors) -> Self {
        let mut form_errors = FormErrors::default();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({}).", error.code));
                form_errors.add(&field, message);
            }
        }
        form_errors
    }
}

/// check
///
/// Runs the derived validators of a form and collects the result.
pub fn check<T: Validate>(form: &T) -> FormErrors {
    match form.validate() {
        Ok(()) => FormErrors::default(),
        Err(errors) => FormErrors::from(&errors),
    }
}

/// clean_url
///
/// Prefixes `http://` when the submitted address carries no scheme.
pub fn clean_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if username.chars().all(allowed) {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars").with_message(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.".into(),
        ))
    }
}

pub(crate) fn validate_has_slug(name: &str) -> Result<(), ValidationError> {
    if crate::models::slugify(name).is_empty() {
        Err(ValidationError::new("empty_slug")
            .with_message("Enter a name that contains letters or numbers.".into()))
    } else {
        Ok(())
    }
}

// --- Public Forms ---

/// CategoryForm
///
/// Body of `POST /category/add/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CategoryForm {
    #[serde(default)]
    #[validate(
        length(min = 1, max = 128, message = "Please enter the category name (at most 128 characters)."),
        custom(function = "validate_has_slug")
    )]
    pub name: String,
}

/// PageForm
///
/// Body of `POST /category/{slug}/page/add/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct PageForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "Please enter the title of the page (at most 128 characters)."))]
    pub title: String,
    #[serde(default)]
    #[validate(
        length(min = 1, max = 200, message = "Please enter the URL of the page (at most 200 characters)."),
        url(message = "Enter a valid URL.")
    )]
    pub url: String,
}

impl PageForm {
    pub fn clean(&mut self) {
        self.title = self.title.trim().to_string();
        self.url = clean_url(&self.url);
    }
}

/// LoginForm
///
/// Body of `POST /login/`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// UserForm
///
/// Credential half of the registration submission.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UserForm {
    #[validate(
        length(min = 1, max = 150, message = "Required. 150 characters or fewer."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(skip_serializing)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
}

/// UploadedFile
///
/// A file part of a multipart submission, fully buffered.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("bin")
    }
}

/// UserProfileForm
///
/// Profile half of the registration submission.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UserProfileForm {
    #[validate(
        length(max = 200, message = "Ensure this value has at most 200 characters."),
        url(message = "Enter a valid URL.")
    )]
    pub website: Option<String>,
    #[serde(skip)]
    pub picture: Option<UploadedFile>,
}

impl UserProfileForm {
    const PICTURE_TYPES: [&'static str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

    /// Extra checks the derive cannot express.
    pub fn check_picture(&self, errors: &mut FormErrors) {
        if let Some(picture) = &self.picture {
            if !Self::PICTURE_TYPES.contains(&picture.content_type.as_str()) {
                errors.add(
                    "picture",
                    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                );
            }
        }
    }
}

/// RegistrationSubmission
///
/// Both registration forms, parsed from one `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct RegistrationSubmission {
    pub user: UserForm,
    pub profile: UserProfileForm,
}

impl RegistrationSubmission {
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, AppError> {
        let mut submission = RegistrationSubmission::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "picture" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() && !bytes.is_empty() {
                    submission.profile.picture = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let value = field.text().await?;
            submission.apply_text(&name, value);
        }

        Ok(submission)
    }

    fn apply_text(&mut self, name: &str, value: String) {
        let optional = |v: String| {
            let v = v.trim().to_string();
            if v.is_empty() { None } else { Some(v) }
        };
        match name {
            "username" => self.user.username = value.trim().to_string(),
            "email" => self.user.email = optional(value),
            "password" => self.user.password = value,
            "website" => self.profile.website = optional(value),
            _ => tracing::debug!(field = %name, "ignoring unknown registration field"),
        }
    }
}
