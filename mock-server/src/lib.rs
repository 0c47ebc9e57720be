//! In-memory stand-in for the Mini App backend.
//!
//! Serves the auth exchange, the profile endpoint and per-user items over the
//! same paths and JSON shapes as the real service. Telegram's hash check is
//! not performed: any init data carrying a user id signs that user in.

pub mod config;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub use config::ServerConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub init_data: String,
}

#[derive(Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Default)]
pub struct UpdateItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

/// User fields carried by Telegram init data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Default)]
pub struct Backend {
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, i64>,
    items: BTreeMap<i64, Item>,
    next_user_id: i64,
    next_item_id: i64,
}

impl Backend {
    fn get_or_create_user(&mut self, tg: TelegramUser) -> User {
        let now = Utc::now();
        if let Some(user) = self.users.values_mut().find(|u| u.telegram_id == tg.id) {
            if user.username != tg.username || user.first_name != tg.first_name || user.last_name != tg.last_name {
                user.username = tg.username;
                user.first_name = tg.first_name;
                user.last_name = tg.last_name;
                user.updated_at = now;
            }
            return user.clone();
        }
        self.next_user_id += 1;
        let user = User {
            id: self.next_user_id,
            telegram_id: tg.id,
            username: tg.username,
            first_name: tg.first_name,
            last_name: tg.last_name,
            created_at: now,
            updated_at: now,
        };
        info!(user_id = user.id, telegram_id = user.telegram_id, "Created user");
        self.users.insert(user.id, user.clone());
        user
    }

    fn user_for_token(&self, token: &str) -> Option<User> {
        let id = self.tokens.get(token)?;
        self.users.get(id).cloned()
    }

    fn owned_item_mut(&mut self, user_id: i64, id: i64) -> Option<&mut Item> {
        self.items.get_mut(&id).filter(|item| item.user_id == user_id)
    }
}

pub type Db = Arc<RwLock<Backend>>;

/// JSON error body `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Item not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    let db: Db = Arc::default();
    let protected = Router::new()
        .route("/api/v1/user/profile", get(get_profile))
        .route("/api/v1/items", get(list_items).post(create_item))
        .route(
            "/api/v1/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route_layer(middleware::from_fn_with_state(db.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/telegram", post(authenticate))
        .merge(protected)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Extract the Telegram user from URL-encoded init data.
///
/// Accepts Telegram's own shape (a JSON `user` field) as well as flat
/// `user_id`/`username`/`first_name`/`last_name` fields.
pub fn parse_init_data(init_data: &str) -> Result<TelegramUser, String> {
    let values: HashMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    if let Some(user) = values.get("user") {
        return serde_json::from_str(user).map_err(|e| format!("failed to parse user JSON: {e}"));
    }

    let id = values
        .get("user_id")
        .ok_or("user data not found in init_data")?
        .parse::<i64>()
        .map_err(|e| format!("invalid user_id: {e}"))?;
    let field = |name: &str| values.get(name).cloned().unwrap_or_default();
    Ok(TelegramUser {
        id,
        username: field("username"),
        first_name: field("first_name"),
        last_name: field("last_name"),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn require_token(State(db): State<Db>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authorization header required"))?;
    let user = db
        .read()
        .await
        .user_for_token(&token)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "Mini App API is running" }))
}

async fn authenticate(State(db): State<Db>, Json(input): Json<AuthRequest>) -> Result<Json<AuthResponse>, ApiError> {
    if input.init_data.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "init_data is required"));
    }
    let tg = parse_init_data(&input.init_data)
        .map_err(|e| ApiError::new(StatusCode::UNAUTHORIZED, format!("Invalid Telegram data: {e}")))?;

    let mut backend = db.write().await;
    let user = backend.get_or_create_user(tg);
    let token = Uuid::new_v4().to_string();
    backend.tokens.insert(token.clone(), user.id);
    debug!(user_id = user.id, "Issued token");
    Ok(Json(AuthResponse { token, user }))
}

async fn get_profile(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

async fn list_items(State(db): State<Db>, Extension(user): Extension<User>) -> Json<Vec<Item>> {
    let backend = db.read().await;
    let items = backend
        .items
        .values()
        .rev()
        .filter(|item| item.user_id == user.id)
        .cloned()
        .collect();
    Json(items)
}

async fn get_item(
    State(db): State<Db>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<Item>, ApiError> {
    let backend = db.read().await;
    backend
        .items
        .get(&id)
        .filter(|item| item.user_id == user.id)
        .cloned()
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn create_item(
    State(db): State<Db>,
    Extension(user): Extension<User>,
    Json(input): Json<CreateItem>,
) -> (StatusCode, Json<Item>) {
    let mut backend = db.write().await;
    backend.next_item_id += 1;
    let now = Utc::now();
    let item = Item {
        id: backend.next_item_id,
        user_id: user.id,
        title: input.title,
        description: input.description,
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
    };
    backend.items.insert(item.id, item.clone());
    (StatusCode::CREATED, Json(item))
}

async fn update_item(
    State(db): State<Db>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateItem>,
) -> Result<Json<Item>, ApiError> {
    let mut backend = db.write().await;
    let item = backend.owned_item_mut(user.id, id).ok_or_else(ApiError::not_found)?;
    if !input.title.is_empty() {
        item.title = input.title;
    }
    if !input.description.is_empty() {
        item.description = input.description;
    }
    if !input.status.is_empty() {
        item.status = input.status;
    }
    item.updated_at = Utc::now();
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(db): State<Db>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut backend = db.write().await;
    backend.owned_item_mut(user.id, id).ok_or_else(ApiError::not_found)?;
    backend.items.remove(&id);
    Ok(Json(json!({ "message": "Item deleted successfully" })))
}
