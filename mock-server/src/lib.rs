use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const CLIENT_ID: &str = "TrackViaAPI";
pub const USERNAME: &str = "demo@example.com";
pub const PASSWORD: &str = "demo-password";
pub const USER_KEY: &str = "demo-user-key";
pub const ACCOUNT_ID: i64 = 7;
pub const EXPIRED_ACCESS_TOKEN: &str = "The access token provided has expired";
pub const TOKEN_LIFETIME_SECS: u64 = 3600;

type Record = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct View {
    pub id: u64,
    pub name: String,
    pub records: BTreeMap<u64, Record>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenStatus {
    Live,
    Expired,
}

#[derive(Debug)]
pub struct Store {
    access_tokens: HashMap<String, TokenStatus>,
    refresh_tokens: HashSet<String>,
    views: BTreeMap<u64, View>,
    users: Vec<Value>,
    next_record_id: u64,
    next_user_id: u64,
}

impl Store {
    fn seeded() -> Self {
        let mut tasks = BTreeMap::new();
        for (id, title, status) in [(1, "Write docs", "Open"), (2, "Fix login bug", "Closed")] {
            let mut record = Record::new();
            record.insert("id".into(), json!(id));
            record.insert("Title".into(), json!(title));
            record.insert("Status".into(), json!(status));
            tasks.insert(id, record);
        }
        let mut views = BTreeMap::new();
        views.insert(
            1,
            View {
                id: 1,
                name: "Open Tasks".into(),
                records: tasks,
            },
        );
        views.insert(
            2,
            View {
                id: 2,
                name: "Contacts".into(),
                records: BTreeMap::new(),
            },
        );

        Self {
            access_tokens: HashMap::new(),
            refresh_tokens: HashSet::new(),
            views,
            users: vec![json!({
                "id": 1,
                "firstName": "Demo",
                "lastName": "User",
                "email": USERNAME,
            })],
            next_record_id: 3,
            next_user_id: 2,
        }
    }

    fn issue_token(&mut self) -> Value {
        let access = Uuid::new_v4().simple().to_string();
        let refresh = Uuid::new_v4().simple().to_string();
        self.access_tokens.insert(access.clone(), TokenStatus::Live);
        self.refresh_tokens.insert(refresh.clone());
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": TOKEN_LIFETIME_SECS,
            "token_type": "bearer",
            "scope": null,
        })
    }

    /// Mark every issued access token as expired. Returns how many changed.
    pub fn expire_access_tokens(&mut self) -> usize {
        let mut expired = 0;
        for status in self.access_tokens.values_mut() {
            if *status == TokenStatus::Live {
                *status = TokenStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    fn check(&self, auth: &AuthQuery) -> Result<(), ApiFailure> {
        if auth.user_key.as_deref() != Some(USER_KEY) {
            return Err(failure(StatusCode::FORBIDDEN, "invalid_key", "Invalid user key"));
        }
        let token = auth.access_token.as_deref().unwrap_or_default();
        match self.access_tokens.get(token) {
            Some(TokenStatus::Live) => Ok(()),
            // The platform reports expiry inside a successful response.
            Some(TokenStatus::Expired) => Err(failure(
                StatusCode::OK,
                "invalid_token",
                EXPIRED_ACCESS_TOKEN,
            )),
            None => Err(failure(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "The access token provided is invalid",
            )),
        }
    }

    fn view(&self, view_id: u64) -> Result<&View, ApiFailure> {
        self.views
            .get(&view_id)
            .ok_or_else(|| failure(StatusCode::NOT_FOUND, "not_found", "View not found"))
    }

    fn view_mut(&mut self, view_id: u64) -> Result<&mut View, ApiFailure> {
        self.views
            .get_mut(&view_id)
            .ok_or_else(|| failure(StatusCode::NOT_FOUND, "not_found", "View not found"))
    }
}

pub type Db = Arc<RwLock<Store>>;

type ApiFailure = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiFailure>;

fn failure(status: StatusCode, error: &str, description: &str) -> ApiFailure {
    (
        status,
        Json(json!({ "error": error, "error_description": description })),
    )
}

fn record_not_found() -> ApiFailure {
    failure(StatusCode::NOT_FOUND, "not_found", "Record not found")
}

pub fn new_db() -> Db {
    Arc::new(RwLock::new(Store::seeded()))
}

pub fn app() -> Router {
    app_with_db(new_db())
}

pub fn app_with_db(db: Db) -> Router {
    let api = Router::new()
        .route("/openapi/views", get(list_views))
        .route("/openapi/views/{view_id}", get(view_records))
        .route("/openapi/views/{view_id}/find", get(find_records))
        .route("/openapi/views/{view_id}/records", post(create_records))
        .route(
            "/openapi/views/{view_id}/records/{record_id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/openapi/users", get(list_users).post(create_user))
        .route("/openapi/users/me", get(current_user))
        .route("/openapi/apps", get(list_apps))
        .route_layer(middleware::from_fn_with_state(db.clone(), require_token));

    Router::new()
        .route("/oauth/token", post(issue_token))
        .route("/__admin/expire-tokens", post(expire_tokens))
        .merge(api)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    access_token: Option<String>,
    user_key: Option<String>,
}

async fn require_token(
    State(db): State<Db>,
    Query(auth): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = db.read().await.check(&auth);
    match verdict {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            debug!(path = %request.uri().path(), "rejected api request");
            rejection.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

async fn issue_token(State(db): State<Db>, Form(form): Form<TokenForm>) -> ApiResult {
    if form.client_id.as_deref() != Some(CLIENT_ID) {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "invalid_client",
            "Client credentials were not found in the headers or body",
        ));
    }
    let mut store = db.write().await;
    match form.grant_type.as_str() {
        "password" => {
            if form.username.as_deref() != Some(USERNAME)
                || form.password.as_deref() != Some(PASSWORD)
            {
                return Err(failure(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Invalid username and password combination",
                ));
            }
        }
        "refresh_token" => {
            let presented = form.refresh_token.unwrap_or_default();
            if !store.refresh_tokens.remove(&presented) {
                return Err(failure(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Invalid refresh token",
                ));
            }
        }
        other => {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                &format!("Grant type \"{other}\" not supported"),
            ))
        }
    }
    info!(grant_type = %form.grant_type, "issuing access token");
    Ok(Json(store.issue_token()))
}

async fn expire_tokens(State(db): State<Db>) -> Json<Value> {
    let expired = db.write().await.expire_access_tokens();
    Json(json!({ "expired": expired }))
}

#[derive(Debug, Deserialize)]
struct ViewFilter {
    name: Option<String>,
}

async fn list_views(State(db): State<Db>, Query(filter): Query<ViewFilter>) -> Json<Value> {
    let store = db.read().await;
    let views: Vec<Value> = store
        .views
        .values()
        .filter(|view| filter.name.as_deref().map_or(true, |name| view.name == name))
        .map(|view| json!({ "id": view.id, "name": view.name }))
        .collect();
    Json(Value::Array(views))
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    start: usize,
    #[serde(default = "default_max")]
    max: usize,
    q: Option<String>,
}

fn default_max() -> usize {
    1000
}

fn page_of<'a>(records: impl Iterator<Item = &'a Record>, page: &Page) -> Value {
    let matching: Vec<&Record> = records.collect();
    let total = matching.len();
    let data: Vec<&Record> = matching.into_iter().skip(page.start).take(page.max).collect();
    json!({ "totalCount": total, "data": data })
}

async fn view_records(
    State(db): State<Db>,
    Path(view_id): Path<u64>,
    Query(page): Query<Page>,
) -> ApiResult {
    let store = db.read().await;
    let view = store.view(view_id)?;
    Ok(Json(page_of(view.records.values(), &page)))
}

async fn find_records(
    State(db): State<Db>,
    Path(view_id): Path<u64>,
    Query(page): Query<Page>,
) -> ApiResult {
    let store = db.read().await;
    let view = store.view(view_id)?;
    let needle = page.q.clone().unwrap_or_default().to_lowercase();
    let matches = view.records.values().filter(|record| {
        record.values().any(|value| match value {
            Value::String(text) => text.to_lowercase().contains(&needle),
            other => other.to_string().contains(&needle),
        })
    });
    Ok(Json(page_of(matches, &page)))
}

async fn create_records(
    State(db): State<Db>,
    Path(view_id): Path<u64>,
    Json(input): Json<Value>,
) -> ApiResult {
    let rows: Vec<Record> = match input {
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(rows)) => rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                object.insert("data".into(), other);
                vec![object]
            }
            None => vec![object],
        },
        _ => {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Record data must be an object",
            ))
        }
    };

    let mut store = db.write().await;
    store.view(view_id)?;
    let mut created = Vec::with_capacity(rows.len());
    for mut row in rows {
        let id = store.next_record_id;
        store.next_record_id += 1;
        row.insert("id".into(), json!(id));
        store.view_mut(view_id)?.records.insert(id, row.clone());
        created.push(Value::Object(row));
    }
    Ok(Json(json!({ "data": created })))
}

async fn get_record(
    State(db): State<Db>,
    Path((view_id, record_id)): Path<(u64, u64)>,
) -> ApiResult {
    let store = db.read().await;
    let record = store
        .view(view_id)?
        .records
        .get(&record_id)
        .ok_or_else(record_not_found)?;
    Ok(Json(json!({ "data": record })))
}

async fn update_record(
    State(db): State<Db>,
    Path((view_id, record_id)): Path<(u64, u64)>,
    Json(input): Json<Record>,
) -> ApiResult {
    let mut store = db.write().await;
    let record = store
        .view_mut(view_id)?
        .records
        .get_mut(&record_id)
        .ok_or_else(record_not_found)?;
    for (field, value) in input {
        if field != "id" {
            record.insert(field, value);
        }
    }
    Ok(Json(json!({ "data": [record.clone()] })))
}

async fn delete_record(
    State(db): State<Db>,
    Path((view_id, record_id)): Path<(u64, u64)>,
) -> Result<StatusCode, ApiFailure> {
    let mut store = db.write().await;
    store
        .view_mut(view_id)?
        .records
        .remove(&record_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(record_not_found)
}

async fn list_users(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({
        "structure": ["id", "firstName", "lastName", "email", "timeZone"],
        "data": store.users,
        "totalCount": store.users.len(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub time_zone: Option<String>,
}

async fn create_user(State(db): State<Db>, Query(input): Query<NewUser>) -> Json<Value> {
    let mut store = db.write().await;
    let id = store.next_user_id;
    store.next_user_id += 1;
    let user = json!({
        "id": id,
        "firstName": input.first_name,
        "lastName": input.last_name,
        "email": input.email,
        "timeZone": input.time_zone,
    });
    store.users.push(user.clone());
    Json(json!({ "data": [user] }))
}

async fn current_user() -> Json<Value> {
    Json(json!({
        "id": 1,
        "email": USERNAME,
        "firstName": "Demo",
        "lastName": "User",
        "accounts": [{ "id": ACCOUNT_ID, "name": "Demo Account" }],
    }))
}

async fn list_apps() -> Json<Value> {
    Json(json!([{ "id": 1, "name": "Task Tracker" }]))
}
