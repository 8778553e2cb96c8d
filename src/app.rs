#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use axum::{
    Router, middleware,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use handlebars::Handlebars;
use log::{error, info};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::assistant::{self, GeminiClient};
use crate::config::Config;
use crate::database::Database;
use crate::error::{ArgusError, Result};
use crate::loader::SeedFiles;
use crate::login::{self, CurrentUser};
use crate::models::Page;
use crate::pages;
use crate::theme::{BUTTON_CSS, Theme};

/// Shared state of the web server
pub struct AppState {
    /// Single connection guarded by a mutex; never held across an `.await`
    pub db: Mutex<Database>,
    pub config: Config,
    pub seeds: SeedFiles,
    pub theme: Theme,
    pub assistant: GeminiClient,
    templates: Handlebars<'static>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        Ok(AppState {
            db: Mutex::new(db),
            seeds: SeedFiles::new(&config.data_dir),
            theme: Theme::load(&config.image_dir),
            assistant: GeminiClient::from_config(&config)?,
            templates: templates()?,
            config,
        })
    }

    /// Lock the store
    pub fn database(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| ArgusError::LockPoisoned)
    }

    /// Render a template into an HTML response, 500 on failure
    pub fn render(&self, name: &str, data: &Value) -> Response {
        match self.templates.render(name, data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("rendering template {} failed: {}", name, e);
                server_error()
            }
        }
    }

    /// Data shared by every signed-in page: user, sidebar and styling
    pub fn frame(&self, user: &CurrentUser, page: Page) -> Value {
        let nav: Vec<Value> = user
            .role
            .sidebar(page)
            .into_iter()
            .map(|link| json!({ "label": link.label(), "path": link.path() }))
            .collect();

        let background = match page {
            Page::Cybersecurity | Page::DataScience | Page::ItOperations => {
                self.theme.page_css.clone()
            }
            Page::Dashboard | Page::Assistant => None,
        };

        json!({
            "title": page.label(),
            "username": user.username,
            "role": user.role.as_str(),
            "nav": nav,
            "background_css": background,
            "button_css": BUTTON_CSS,
        })
    }
}

/// All page templates and partials, embedded in the binary
pub fn templates() -> Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    let template_err = |e: handlebars::TemplateError| ArgusError::Template(e.to_string());

    hb.register_partial("head", include_str!("./static/head.hbs"))
        .map_err(template_err)?;
    hb.register_partial("sidebar", include_str!("./static/sidebar.hbs"))
        .map_err(template_err)?;
    hb.register_partial("flash", include_str!("./static/flash.hbs"))
        .map_err(template_err)?;

    for (name, source) in [
        ("login", include_str!("./static/login.hbs")),
        ("dashboard", include_str!("./static/dashboard.hbs")),
        ("cybersecurity", include_str!("./static/cybersecurity.hbs")),
        ("it_operations", include_str!("./static/it_operations.hbs")),
        ("data_science", include_str!("./static/data_science.hbs")),
        ("assistant", include_str!("./static/assistant.hbs")),
        ("denied", include_str!("./static/denied.hbs")),
    ] {
        hb.register_template_string(name, source)
            .map_err(template_err)?;
    }

    Ok(hb)
}

fn with_message(path: &str, key: &str, message: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, sep, key, urlencoding::encode(message))
}

/// Redirect showing a success message on the target page
pub fn redirect_notice(path: &str, message: &str) -> Response {
    Redirect::to(&with_message(path, "notice", message)).into_response()
}

/// Redirect showing an error message on the target page
pub fn redirect_error(path: &str, message: &str) -> Response {
    Redirect::to(&with_message(path, "error", message)).into_response()
}

pub fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// 403 page for a role that may not view `page`
pub fn access_denied(state: &AppState, user: &CurrentUser, page: Page) -> Response {
    info!("{} ({}) denied access to {}", user.username, user.role, page.path());
    let mut data = state.frame(user, Page::Dashboard);
    data["title"] = json!("Access Denied");
    data["message"] = json!("Access Denied - You don't have permission to view this page");

    let mut response = state.render("denied", &data);
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

/// Favicon requests would otherwise hit the image directory and log a 404
async fn no_favicon() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, "max-age=86400")])
}

/// Build the full router
///
/// Public routes: the login page, login/register/logout posts and the
/// static images. Everything else requires a session.
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(pages::serve_dashboard))
        .route("/cybersecurity", get(pages::serve_cybersecurity))
        .route("/cybersecurity/incidents", post(pages::create_incident))
        .route("/cybersecurity/incidents/update", post(pages::update_incident))
        .route("/cybersecurity/incidents/delete", post(pages::delete_incident))
        .route("/it-operations", get(pages::serve_it_operations))
        .route("/it-operations/tickets", post(pages::create_ticket))
        .route("/it-operations/tickets/update", post(pages::update_ticket))
        .route("/it-operations/tickets/delete", post(pages::delete_ticket))
        .route("/data-science", get(pages::serve_data_science))
        .route("/data-science/datasets", post(pages::create_dataset))
        .route("/data-science/datasets/update", post(pages::update_dataset))
        .route("/data-science/datasets/delete", post(pages::delete_dataset))
        .route(
            "/assistant",
            get(assistant::serve_assistant).post(assistant::handle_chat),
        )
        .route("/assistant/clear", post(assistant::handle_clear))
        .route("/export/:table/:format", get(pages::export_table))
        .route_layer(middleware::from_fn(login::require_auth));

    let images = ServeDir::new(&state.config.image_dir);

    Router::new()
        .route("/", get(login::serve_login_page))
        .route("/login", post(login::handle_login))
        .route("/register", post(login::handle_register))
        .route("/logout", post(login::handle_logout))
        .route("/favicon.ico", get(no_favicon))
        .merge(protected)
        .nest_service("/imgs", images)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store and serve the dashboard until the process is stopped
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database)?;
    info!("database ready at {}", config.database.display());
    if config.gemini_api_key.is_none() {
        info!("GEMINI_API_KEY not set, the AI assistant will answer with an error");
    }

    let bind = config.bind;
    let app_state = Arc::new(AppState::new(config, db)?);
    let app = build_router(app_state);

    let listener = TcpListener::bind(bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_compiles() {
        let hb = templates().unwrap();
        for name in [
            "login",
            "dashboard",
            "cybersecurity",
            "it_operations",
            "data_science",
            "assistant",
            "denied",
        ] {
            assert!(hb.has_template(name), "missing template {}", name);
        }
    }

    #[test]
    fn messages_are_url_encoded() {
        assert_eq!(
            with_message("/", "error", "Please login first"),
            "/?error=Please%20login%20first"
        );
        assert_eq!(
            with_message("/?tab=register", "error", "Passwords do not match"),
            "/?tab=register&error=Passwords%20do%20not%20match"
        );
    }
}
