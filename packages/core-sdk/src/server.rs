use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

use crate::db::{self, ConfigStore};
use crate::error::ErrorKind;
use crate::models::{
    AppConfig, ArticleParams, ExtractParams, ImageParams, OperationResult, ProviderId,
    ScrapeParams,
};
use crate::orchestrator::Orchestrator;
use crate::telemetry;
use crate::transport::TransportSettings;

type ApiError = (StatusCode, String);

#[derive(Clone)]
struct AppState {
    db_path: Arc<PathBuf>,
    client: reqwest::Client,
}

impl AppState {
    fn store(&self) -> Result<ConfigStore, ApiError> {
        ConfigStore::open(self.db_path.as_path()).map_err(internal_err)
    }

    /**
     * \brief 每次请求从存储构建编排器，并同步遥测开关。
     */
    fn orchestrator(&self) -> Result<Orchestrator, ApiError> {
        let store = self.store()?;
        telemetry::set_enabled(store.telemetry_enabled().unwrap_or(false));
        Orchestrator::from_store(&store).map_err(internal_err)
    }
}

/**
 * \brief 启动本地 HTTP 服务，提供静态前端、操作 API 与中继端点。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str) -> Result<()> {
    let db_path = std::env::var(db::DB_PATH_ENV).unwrap_or_else(|_| db::DEFAULT_DB_PATH.to_string());
    let ui_root =
        std::env::var("INKRELAY_UI_DIR").unwrap_or_else(|_| "packages/ui/dist".to_string());
    let fallback_root =
        std::env::var("INKRELAY_UI_FALLBACK").unwrap_or_else(|_| "web".to_string());

    let static_handler = if std::path::Path::new(&ui_root).exists() {
        ServeDir::new(ui_root)
    } else {
        ServeDir::new(fallback_root)
    }
    .append_index_html_on_directories(true);

    let app = router(PathBuf::from(db_path))?.fallback_service(get_service(static_handler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief API 路由（不含静态文件回落）。
 */
pub fn router(db_path: PathBuf) -> Result<Router> {
    let state = AppState {
        db_path: Arc::new(db_path),
        client: reqwest::Client::builder().build()?,
    };
    Ok(Router::new()
        .route("/api/config", get(get_config).post(save_config))
        .route("/api/transport", get(get_transport).post(save_transport))
        .route("/api/transport/proxy/{name}", post(select_proxy))
        .route("/api/test-connection", post(test_connection))
        .route("/api/article", post(generate_article))
        .route("/api/images", post(generate_images))
        .route("/api/extract-images", post(extract_images))
        .route("/api/scrape", post(scrape_content))
        .route("/api/relay", any(relay))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ConfigState {
    config: AppConfig,
    telemetry_enabled: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SaveConfigRequest {
    config: AppConfig,
    #[serde(default)]
    telemetry_enabled: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct TestConnectionRequest {
    #[serde(default)]
    provider: Option<String>,
}

fn config_state(store: &ConfigStore) -> Result<ConfigState, ApiError> {
    let telemetry_enabled = store.telemetry_enabled().map_err(internal_err)?;
    telemetry::set_enabled(telemetry_enabled);
    Ok(ConfigState {
        config: store.load(),
        telemetry_enabled,
    })
}

async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigState>, ApiError> {
    let store = state.store()?;
    Ok(Json(config_state(&store)?))
}

/**
 * \brief 整体覆盖保存应用配置。
 */
async fn save_config(
    State(state): State<AppState>,
    Json(input): Json<SaveConfigRequest>,
) -> Result<Json<ConfigState>, ApiError> {
    let store = state.store()?;
    store.save(&input.config).map_err(internal_err)?;
    if let Some(enabled) = input.telemetry_enabled {
        store.set_telemetry_enabled(enabled).map_err(internal_err)?;
    }
    telemetry::log_event(
        "server.config",
        &format!("save active={}", input.config.active_provider),
    );
    Ok(Json(config_state(&store)?))
}

async fn get_transport(
    State(state): State<AppState>,
) -> Result<Json<TransportSettings>, ApiError> {
    Ok(Json(state.store()?.load_transport()))
}

async fn save_transport(
    State(state): State<AppState>,
    Json(settings): Json<TransportSettings>,
) -> Result<Json<TransportSettings>, ApiError> {
    let store = state.store()?;
    store.save_transport(&settings).map_err(internal_err)?;
    Ok(Json(store.load_transport()))
}

async fn select_proxy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TransportSettings>, ApiError> {
    let store = state.store()?;
    let settings = store
        .set_current_proxy(&name)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    telemetry::log_event("server.transport", &format!("select proxy={}", name));
    Ok(Json(settings))
}

async fn test_connection(
    State(state): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> Result<Response, ApiError> {
    let provider = match request.provider.as_deref().map(str::parse::<ProviderId>) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(err)) => {
            let result = OperationResult::failure(ErrorKind::Configuration, err.to_string());
            return Ok((StatusCode::BAD_REQUEST, Json(result)).into_response());
        }
    };
    let orchestrator = state.orchestrator()?;
    Ok(Json(orchestrator.test_connection(provider).await).into_response())
}

async fn generate_article(
    State(state): State<AppState>,
    Json(params): Json<ArticleParams>,
) -> Result<Json<OperationResult>, ApiError> {
    let orchestrator = state.orchestrator()?;
    Ok(Json(orchestrator.generate_article(params).await))
}

async fn generate_images(
    State(state): State<AppState>,
    Json(params): Json<ImageParams>,
) -> Result<Json<OperationResult>, ApiError> {
    let orchestrator = state.orchestrator()?;
    Ok(Json(orchestrator.generate_images(params).await))
}

async fn extract_images(
    State(state): State<AppState>,
    Json(params): Json<ExtractParams>,
) -> Result<Json<OperationResult>, ApiError> {
    let orchestrator = state.orchestrator()?;
    Ok(Json(orchestrator.extract_images(params).await))
}

async fn scrape_content(
    State(state): State<AppState>,
    Json(params): Json<ScrapeParams>,
) -> Result<Json<OperationResult>, ApiError> {
    let orchestrator = state.orchestrator()?;
    Ok(Json(orchestrator.scrape_content(params).await))
}

async fn health_check() -> Json<Value> {
    Json(json!({"ok": true}))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RelayRequest {
    target_url: Option<String>,
    method: Option<String>,
    #[serde(default)]
    headers: Map<String, Value>,
    body: Option<Value>,
}

fn relay_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

/**
 * \brief 中继端点：转发 `{targetUrl, method, headers, body}`，返回 `{status, statusText, data}`。
 */
async fn relay(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    if method != Method::POST {
        return relay_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    let request: RelayRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return relay_error(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")),
    };
    let Some(target) = request.target_url.filter(|t| !t.trim().is_empty()) else {
        return relay_error(StatusCode::BAD_REQUEST, "Missing targetUrl");
    };
    let upstream_method = match request
        .method
        .as_deref()
        .unwrap_or("POST")
        .to_ascii_uppercase()
        .parse::<reqwest::Method>()
    {
        Ok(m) => m,
        Err(e) => return relay_error(StatusCode::BAD_REQUEST, format!("Invalid method: {e}")),
    };

    let sends_body =
        upstream_method != reqwest::Method::GET && upstream_method != reqwest::Method::HEAD;
    let mut builder = state.client.request(upstream_method, &target);
    for (name, value) in &request.headers {
        if let Some(v) = value.as_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    builder = match request.body.filter(|_| sends_body) {
        Some(Value::String(raw)) => builder.body(raw),
        Some(Value::Null) | None => builder,
        Some(other) => builder.json(&other),
    };

    let resp = match builder.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(target = %target, error = %e, "relay upstream request failed");
            telemetry::log_error("server.relay", &format!("target={} error={}", target, e));
            return relay_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    let status = resp.status();
    let text = match resp.text().await {
        Ok(t) => t,
        Err(e) => return relay_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Json(json!({
        "status": status.as_u16(),
        "statusText": status.canonical_reason().unwrap_or(""),
        "data": data,
    }))
    .into_response()
}

fn internal_err<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
