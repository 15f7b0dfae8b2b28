use std::sync::Arc;

use axum::response::Html;
use tera::{Context, Tera};

use crate::error::AppError;

/// Templates
///
/// Tera instance with every page template compiled in. Names ending in `.html`
/// are autoescaped.
#[derive(Clone)]
pub struct Templates {
    tera: Arc<Tera>,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("rango/index.html", include_str!("../templates/rango/index.html")),
            ("rango/about.html", include_str!("../templates/rango/about.html")),
            ("rango/category.html", include_str!("../templates/rango/category.html")),
            ("rango/add_category.html", include_str!("../templates/rango/add_category.html")),
            ("rango/add_page.html", include_str!("../templates/rango/add_page.html")),
            ("rango/register.html", include_str!("../templates/rango/register.html")),
            ("rango/login.html", include_str!("../templates/rango/login.html")),
            ("admin/base.html", include_str!("../templates/admin/base.html")),
            ("admin/index.html", include_str!("../templates/admin/index.html")),
            ("admin/change_list.html", include_str!("../templates/admin/change_list.html")),
            ("admin/change_form.html", include_str!("../templates/admin/change_form.html")),
        ])?;
        Ok(Self { tera: Arc::new(tera) })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<Html<String>, AppError> {
        Ok(Html(self.tera.render(name, context)?))
    }
}
