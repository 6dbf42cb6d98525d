//! In-process stand-in for the todolist backend, used by the tests.
//!
//! Implements the HTTP API the client talks to: cookie sessions, owner checks,
//! optional paging, and a few failure switches for exercising error paths.

use crate::api::ApiClient;
use crate::models::{Owner, PageResponse, SubTodo, Todo, User};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;

struct StoredUser {
    id: i64,
    username: String,
    password: String,
    email: Option<String>,
}

#[derive(Default)]
struct Db {
    users: Vec<StoredUser>,
    todos: Vec<Todo>,
    subtodos: Vec<SubTodo>,
    sessions: HashMap<String, String>,
    next_id: i64,
    failing_toggles: HashSet<i64>,
    check_delay: Option<Duration>,
}

impl Db {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    // Every entity gets a distinct, increasing timestamp.
    fn stamp(&self) -> NaiveDateTime {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap();
        base + ChronoDuration::seconds(self.next_id)
    }

    fn insert_todo(&mut self, owner: &str, title: &str) -> Todo {
        let id = self.next_id();
        let todo = Todo {
            id,
            title: title.to_string(),
            checked: false,
            created_at: self.stamp(),
            user: Some(Owner {
                username: owner.to_string(),
            }),
        };
        self.todos.push(todo.clone());
        todo
    }

    fn insert_subtodo(&mut self, todo_id: i64, title: &str) -> SubTodo {
        let id = self.next_id();
        let sub = SubTodo {
            id,
            title: title.to_string(),
            checked: false,
            created_at: Some(self.stamp()),
            todo_id: Some(todo_id),
        };
        self.subtodos.push(sub.clone());
        sub
    }

    fn todos_newest_first(&self, owner: Option<&str>) -> Vec<Todo> {
        let mut todos: Vec<Todo> = self
            .todos
            .iter()
            .filter(|todo| owner.is_none() || todo.owner() == owner)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        todos
    }

    fn todo_owner(&self, todo_id: i64) -> Option<String> {
        self.todos
            .iter()
            .find(|todo| todo.id == todo_id)
            .and_then(|todo| todo.owner().map(str::to_string))
    }
}

type Shared = Arc<Mutex<Db>>;

fn lock(db: &Shared) -> MutexGuard<'_, Db> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockBackend {
    addr: SocketAddr,
    db: Shared,
}

impl MockBackend {
    pub async fn start() -> MockBackend {
        let db: Shared = Arc::new(Mutex::new(Db::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(db.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockBackend { addr, db }
    }

    /// A fresh client with its own (empty) cookie jar.
    pub fn client(&self) -> ApiClient {
        ApiClient::new(
            &format!("http://{}/api", self.addr),
            Some(Duration::from_secs(5)),
        )
        .unwrap()
    }

    pub fn add_user(&self, username: &str, password: &str) -> User {
        let mut db = lock(&self.db);
        let id = db.next_id();
        db.users.push(StoredUser {
            id,
            username: username.to_string(),
            password: password.to_string(),
            email: Some(format!("{}@example.com", username)),
        });
        User {
            id,
            username: username.to_string(),
        }
    }

    pub fn add_todo(&self, owner: &str, title: &str) -> Todo {
        lock(&self.db).insert_todo(owner, title)
    }

    pub fn add_subtodo(&self, todo_id: i64, title: &str) -> SubTodo {
        lock(&self.db).insert_subtodo(todo_id, title)
    }

    pub fn todo(&self, id: i64) -> Option<Todo> {
        lock(&self.db).todos.iter().find(|todo| todo.id == id).cloned()
    }

    pub fn subtodos(&self, todo_id: i64) -> Vec<SubTodo> {
        lock(&self.db)
            .subtodos
            .iter()
            .filter(|sub| sub.todo_id == Some(todo_id))
            .cloned()
            .collect()
    }

    /// Make `PATCH /subtodos/{id}/check` fail with a 500 for this sub-todo.
    pub fn fail_subtodo_toggle(&self, id: i64) {
        lock(&self.db).failing_toggles.insert(id);
    }

    /// Hold availability-check responses for `delay`.
    pub fn delay_checks(&self, delay: Duration) {
        lock(&self.db).check_delay = Some(delay);
    }
}

fn router(db: Shared) -> Router {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/my", get(list_my_todos))
        .route("/api/todos/{id}", patch(update_todo).delete(delete_todo))
        .route("/api/todos/{id}/check", patch(toggle_todo))
        .route(
            "/api/subtodos/{id}",
            get(list_subtodos)
                .post(create_subtodo)
                .patch(update_subtodo)
                .delete(delete_subtodo),
        )
        .route("/api/subtodos/{id}/check", patch(toggle_subtodo))
        .route("/api/auth/me", get(me))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/register", post(register))
        .route("/api/auth/check-username", get(check_username))
        .route("/api/auth/check-email", get(check_email))
        .with_state(db)
}

#[derive(Deserialize)]
struct TitleBody {
    title: String,
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
    email: Option<String>,
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn session_user(db: &Db, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().strip_prefix("SESSION="))
        .find_map(|token| db.sessions.get(token).cloned())
}

// Resolves the session and checks it owns `todo_id`.
fn authorize(db: &Db, headers: &HeaderMap, todo_id: i64) -> Result<(), Response> {
    let Some(username) = session_user(db, headers) else {
        return Err(fail(StatusCode::UNAUTHORIZED, "Login required."));
    };
    match db.todo_owner(todo_id) {
        None if !db.todos.iter().any(|todo| todo.id == todo_id) => {
            Err(fail(StatusCode::BAD_REQUEST, "Todo does not exist."))
        }
        Some(owner) if owner == username => Ok(()),
        _ => Err(fail(
            StatusCode::FORBIDDEN,
            "Only the author can change this todo.",
        )),
    }
}

fn listing(todos: Vec<Todo>, params: &HashMap<String, String>) -> Response {
    let page = params.get("page").and_then(|p| p.parse::<u32>().ok());
    let size = params.get("size").and_then(|s| s.parse::<u32>().ok());
    match (page, size) {
        (Some(page), Some(size)) => Json(PageResponse::from_items(todos, page, size)).into_response(),
        _ => Json(todos).into_response(),
    }
}

async fn list_todos(
    State(db): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let todos = lock(&db).todos_newest_first(None);
    listing(todos, &params)
}

async fn list_my_todos(
    State(db): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let db = lock(&db);
    let todos = match session_user(&db, &headers) {
        Some(username) => db.todos_newest_first(Some(&username)),
        None => Vec::new(),
    };
    listing(todos, &params)
}

async fn create_todo(
    State(db): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<TitleBody>,
) -> Response {
    let mut db = lock(&db);
    let Some(username) = session_user(&db, &headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Login required.");
    };
    Json(db.insert_todo(&username, &body.title)).into_response()
}

async fn update_todo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<TitleBody>,
) -> Response {
    let mut db = lock(&db);
    if let Err(res) = authorize(&db, &headers, id) {
        return res;
    }
    match db.todos.iter_mut().find(|todo| todo.id == id) {
        Some(todo) => {
            todo.title = body.title;
            Json(todo.clone()).into_response()
        }
        None => fail(StatusCode::BAD_REQUEST, "Todo does not exist."),
    }
}

async fn delete_todo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut db = lock(&db);
    if let Err(res) = authorize(&db, &headers, id) {
        return res;
    }
    db.todos.retain(|todo| todo.id != id);
    db.subtodos.retain(|sub| sub.todo_id != Some(id));
    StatusCode::OK.into_response()
}

async fn toggle_todo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut db = lock(&db);
    if let Err(res) = authorize(&db, &headers, id) {
        return res;
    }
    match db.todos.iter_mut().find(|todo| todo.id == id) {
        Some(todo) => {
            todo.checked = !todo.checked;
            Json(todo.clone()).into_response()
        }
        None => fail(StatusCode::BAD_REQUEST, "Todo does not exist."),
    }
}

async fn list_subtodos(State(db): State<Shared>, Path(todo_id): Path<i64>) -> Response {
    let db = lock(&db);
    let subs: Vec<SubTodo> = db
        .subtodos
        .iter()
        .filter(|sub| sub.todo_id == Some(todo_id))
        .cloned()
        .collect();
    Json(subs).into_response()
}

async fn create_subtodo(
    State(db): State<Shared>,
    Path(todo_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<TitleBody>,
) -> Response {
    let mut db = lock(&db);
    if let Err(res) = authorize(&db, &headers, todo_id) {
        return res;
    }
    Json(db.insert_subtodo(todo_id, &body.title)).into_response()
}

fn parent_of(db: &Db, sub_id: i64) -> Result<i64, Response> {
    db.subtodos
        .iter()
        .find(|sub| sub.id == sub_id)
        .and_then(|sub| sub.todo_id)
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "Sub-todo does not exist."))
}

async fn update_subtodo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<TitleBody>,
) -> Response {
    let mut db = lock(&db);
    let parent = match parent_of(&db, id) {
        Ok(parent) => parent,
        Err(res) => return res,
    };
    if let Err(res) = authorize(&db, &headers, parent) {
        return res;
    }
    match db.subtodos.iter_mut().find(|sub| sub.id == id) {
        Some(sub) => {
            sub.title = body.title;
            Json(sub.clone()).into_response()
        }
        None => fail(StatusCode::BAD_REQUEST, "Sub-todo does not exist."),
    }
}

async fn toggle_subtodo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut db = lock(&db);
    if db.failing_toggles.contains(&id) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal Server Error" })),
        )
            .into_response();
    }
    let parent = match parent_of(&db, id) {
        Ok(parent) => parent,
        Err(res) => return res,
    };
    if let Err(res) = authorize(&db, &headers, parent) {
        return res;
    }
    match db.subtodos.iter_mut().find(|sub| sub.id == id) {
        Some(sub) => {
            sub.checked = !sub.checked;
            Json(sub.clone()).into_response()
        }
        None => fail(StatusCode::BAD_REQUEST, "Sub-todo does not exist."),
    }
}

async fn delete_subtodo(
    State(db): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut db = lock(&db);
    let parent = match parent_of(&db, id) {
        Ok(parent) => parent,
        Err(res) => return res,
    };
    if let Err(res) = authorize(&db, &headers, parent) {
        return res;
    }
    db.subtodos.retain(|sub| sub.id != id);
    StatusCode::OK.into_response()
}

async fn me(State(db): State<Shared>, headers: HeaderMap) -> Response {
    let db = lock(&db);
    let user = session_user(&db, &headers).and_then(|username| {
        db.users
            .iter()
            .find(|user| user.username == username)
            .map(|user| User {
                id: user.id,
                username: user.username.clone(),
            })
    });
    match user {
        Some(user) => Json(user).into_response(),
        // The real server answers 200 with an empty body.
        None => StatusCode::OK.into_response(),
    }
}

async fn login(State(db): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let mut db = lock(&db);
    let valid = db
        .users
        .iter()
        .any(|user| user.username == body.username && user.password == body.password);
    if !valid {
        return fail(StatusCode::BAD_REQUEST, "Invalid username or password.");
    }
    let token = format!("token-{}", db.next_id());
    db.sessions.insert(token.clone(), body.username);
    (
        [(header::SET_COOKIE, format!("SESSION={}; Path=/", token))],
        StatusCode::OK,
    )
        .into_response()
}

async fn logout(State(db): State<Shared>, headers: HeaderMap) -> Response {
    let mut db = lock(&db);
    let tokens: Vec<String> = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(|cookies| {
            cookies
                .split(';')
                .filter_map(|pair| pair.trim().strip_prefix("SESSION="))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for token in tokens {
        db.sessions.remove(&token);
    }
    (
        [(header::SET_COOKIE, "SESSION=; Path=/; Max-Age=0".to_string())],
        StatusCode::OK,
    )
        .into_response()
}

async fn register(State(db): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let mut db = lock(&db);
    if db.users.iter().any(|user| user.username == body.username) {
        return fail(StatusCode::BAD_REQUEST, "Username already exists.");
    }
    let id = db.next_id();
    db.users.push(StoredUser {
        id,
        username: body.username.clone(),
        password: body.password,
        email: body.email,
    });
    Json(User {
        id,
        username: body.username,
    })
    .into_response()
}

async fn check_username(
    State(db): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let delay = lock(&db).check_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let wanted = params.get("username").cloned().unwrap_or_default();
    let exists = lock(&db).users.iter().any(|user| user.username == wanted);
    Json(json!({ "exists": exists })).into_response()
}

async fn check_email(
    State(db): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let delay = lock(&db).check_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let wanted = params.get("email").cloned().unwrap_or_default();
    let exists = lock(&db)
        .users
        .iter()
        .any(|user| user.email.as_deref() == Some(wanted.as_str()));
    Json(json!({ "exists": exists })).into_response()
}
