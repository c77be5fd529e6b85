//! In-memory stand-in for the local agent API and the registry API.
//!
//! Both route sets live in one router. Every request bumps `hits`, so tests
//! can prove that a call did or did not reach the network.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigState {
    pub state: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub configstate: ConfigState,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub url: String,
    pub version: String,
    pub arch: String,
    #[serde(default)]
    pub owner: String,
}

/// Error body the registry sends with rejected requests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub node: Option<Node>,
    pub services: BTreeMap<String, Service>,
    pub hits: usize,
}

pub type Db = Arc<RwLock<ServerState>>;

type Rejection = (StatusCode, Json<ErrorBody>);

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        // local agent API
        .route("/node", get(get_node).put(put_node).delete(delete_node))
        .route("/status", get(get_status))
        .route("/agreement/{id}", get(get_agreement))
        // registry API
        .route("/orgs/{org}/services", get(list_services).post(create_service))
        .route(
            "/orgs/{org}/services/{id}",
            get(get_service).put(update_service).delete(delete_service),
        )
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(db.clone(), count_hits))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, Db::default()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

async fn count_hits(State(db): State<Db>, request: Request, next: Next) -> Response {
    db.write().await.hits += 1;
    next.run(request).await
}

fn reject(status: StatusCode, code: &str, msg: impl Into<String>) -> Rejection {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            msg: msg.into(),
        }),
    )
}

/// Accept any well-formed `Basic` credentials with a non-empty id and secret.
fn authenticate(headers: &HeaderMap) -> Result<String, Rejection> {
    let denied = || reject(StatusCode::UNAUTHORIZED, "access-denied", "invalid credentials");
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(denied)?;
    let encoded = value.strip_prefix("Basic ").ok_or_else(denied)?;
    let decoded = BASE64.decode(encoded).map_err(|_| denied())?;
    let creds = String::from_utf8(decoded).map_err(|_| denied())?;
    match creds.split_once(':') {
        Some((id, secret)) if !id.is_empty() && !secret.is_empty() => Ok(id.to_string()),
        _ => Err(denied()),
    }
}

// --- local agent API ---

async fn get_node(State(db): State<Db>) -> Json<Node> {
    let state = db.read().await;
    Json(state.node.clone().unwrap_or_else(|| Node {
        configstate: ConfigState {
            state: "unconfigured".to_string(),
        },
        ..Node::default()
    }))
}

async fn put_node(State(db): State<Db>, Json(mut node): Json<Node>) -> Response {
    let mut state = db.write().await;
    if state.node.is_some() {
        return (StatusCode::CONFLICT, "node is already configured").into_response();
    }
    node.configstate.state = "configuring".to_string();
    state.node = Some(node.clone());
    (StatusCode::CREATED, Json(node)).into_response()
}

async fn delete_node(State(db): State<Db>) -> Response {
    match db.write().await.node.take() {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (StatusCode::FAILED_DEPENDENCY, "node is not configured").into_response(),
    }
}

async fn get_status() -> Json<serde_json::Value> {
    Json(json!({
        "configuration": {"exchange_api": "https://exchange.example.com/v1/"},
        "connectivity": {"exchange.example.com": true}
    }))
}

async fn get_agreement(Path(id): Path<String>) -> Response {
    (StatusCode::NOT_FOUND, format!("agreement {id} not found")).into_response()
}

// --- registry API ---

fn service_id(org: &str, service: &Service) -> String {
    format!("{org}/{}_{}_{}", service.url, service.version, service.arch)
}

async fn list_services(
    State(db): State<Db>,
    Path(org): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Rejection> {
    authenticate(&headers)?;
    let state = db.read().await;
    let prefix = format!("{org}/");
    let services: BTreeMap<_, _> = state
        .services
        .iter()
        .filter(|(id, _)| id.starts_with(&prefix))
        .collect();
    Ok(Json(json!({ "services": services, "lastIndex": 0 })))
}

async fn create_service(
    State(db): State<Db>,
    Path(org): Path<String>,
    headers: HeaderMap,
    Json(mut service): Json<Service>,
) -> Result<(StatusCode, Json<ErrorBody>), Rejection> {
    let owner = authenticate(&headers)?;
    let id = service_id(&org, &service);
    let mut state = db.write().await;
    if state.services.contains_key(&id) {
        return Err(reject(
            StatusCode::CONFLICT,
            "already-exists",
            format!("service '{id}' already exists"),
        ));
    }
    service.owner = owner;
    state.services.insert(id.clone(), service);
    Ok((
        StatusCode::CREATED,
        Json(ErrorBody {
            code: "ok".to_string(),
            msg: format!("service '{id}' created"),
        }),
    ))
}

async fn get_service(
    State(db): State<Db>,
    Path((org, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, Rejection> {
    authenticate(&headers)?;
    let key = format!("{org}/{id}");
    let state = db.read().await;
    Ok(match state.services.get(&key) {
        Some(service) => Json(json!({ "services": { key: service } })).into_response(),
        None => (StatusCode::NOT_FOUND, "service not found").into_response(),
    })
}

async fn update_service(
    State(db): State<Db>,
    Path((org, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(mut service): Json<Service>,
) -> Result<(StatusCode, Json<ErrorBody>), Rejection> {
    let owner = authenticate(&headers)?;
    service.owner = owner;
    let key = format!("{org}/{id}");
    db.write().await.services.insert(key.clone(), service);
    Ok((
        StatusCode::CREATED,
        Json(ErrorBody {
            code: "ok".to_string(),
            msg: format!("service '{key}' updated"),
        }),
    ))
}

async fn delete_service(
    State(db): State<Db>,
    Path((org, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection> {
    authenticate(&headers)?;
    let key = format!("{org}/{id}");
    match db.write().await.services.remove(&key) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(reject(StatusCode::NOT_FOUND, "not-found", format!("service '{key}' not found"))),
    }
}

/// Echo the Authorization header so clients can check what they sent.
async fn whoami(headers: HeaderMap) -> Json<serde_json::Value> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    Json(json!({ "authorization": authorization }))
}
