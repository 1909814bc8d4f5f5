use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use minijinja::{Environment, Error as MiniJinjaError, ErrorKind as MiniJinjaErrorKind, path_loader};
use minijinja_autoreload::AutoReloader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;
use crate::config::{POLL_INTERVAL_MS, RelayConfig};

pub const DASHBOARD_TEMPLATE: &str = "dashboard.html";

const EMBEDDED_DASHBOARD: &str = include_str!("../templates/dashboard.html");

/// Either the templates compiled into the binary or a directory watched for edits.
#[derive(Clone)]
pub enum TemplateEnv {
    Static(Arc<Environment<'static>>),
    Reloading(Arc<AutoReloader>),
}

impl TemplateEnv {
    pub fn from_config(config: &RelayConfig) -> Result<Self, MiniJinjaError> {
        match &config.templates_dir {
            Some(dir) => Ok(Self::reloading(dir)),
            None => Self::embedded(),
        }
    }

    pub fn embedded() -> Result<Self, MiniJinjaError> {
        let mut env = Environment::new();
        env.add_template(DASHBOARD_TEMPLATE, EMBEDDED_DASHBOARD)?;
        setup_minijinja_environment(&mut env);
        Ok(TemplateEnv::Static(Arc::new(env)))
    }

    pub fn reloading(dir: &Path) -> Self {
        info!("Serving templates from {} with auto-reload", dir.display());
        let dir: PathBuf = dir.to_path_buf();
        let reloader = AutoReloader::new(move |notifier| {
            info!("MiniJinja environment is being (re)created...");
            let mut env = Environment::new();
            env.set_loader(path_loader(&dir));
            setup_minijinja_environment(&mut env);
            notifier.watch_path(&dir, true);
            Ok(env)
        });
        TemplateEnv::Reloading(Arc::new(reloader))
    }
}

/// Filters and globals shared by every template environment.
pub fn setup_minijinja_environment(env: &mut Environment<'static>) {
    env.add_global("version", env!("CARGO_PKG_VERSION"));

    // 1000 -> "1s", 1500 -> "1.5s", 500 -> "500 ms"
    env.add_filter("duration_ms", |ms: u64| -> String {
        if ms >= 1000 && ms % 100 == 0 {
            let secs = ms as f64 / 1000.0;
            format!("{}s", secs)
        } else {
            format!("{} ms", ms)
        }
    });
}

#[derive(Serialize)]
pub struct DashboardTemplate {
    pub title: String,
    pub upstream_url: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

pub fn render_minijinja<T: Serialize>(app_state: &AppState, template_name: &str, context: T) -> Response {
    let render_result = match &app_state.template_env {
        TemplateEnv::Static(env) => env
            .get_template(template_name)
            .and_then(|tmpl| tmpl.render(context)),
        TemplateEnv::Reloading(reloader) => match reloader.acquire_env() {
            Ok(env) => env
                .get_template(template_name)
                .and_then(|tmpl| tmpl.render(context)),
            Err(e) => Err(MiniJinjaError::new(
                MiniJinjaErrorKind::InvalidOperation,
                format!("Failed to acquire env from reloader: {}", e),
            )),
        },
    };

    match render_result {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("MiniJinja render/load error for {}: {}", template_name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

pub fn ui_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

pub async fn index(State(app_state): State<AppState>) -> Response {
    let context = DashboardTemplate {
        title: "Knot Resolver Stats Dashboard".to_string(),
        upstream_url: app_state.config.upstream_url.to_string(),
        poll_interval_ms: POLL_INTERVAL_MS,
        timeout_ms: app_state.config.upstream_timeout_ms,
    };
    render_minijinja(&app_state, DASHBOARD_TEMPLATE, context)
}
