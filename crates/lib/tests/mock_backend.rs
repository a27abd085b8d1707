//! Integration tests: start an in-process mock of the task/chat backend on a free port and
//! drive the real gateway, session store, and controllers against it over HTTP.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tasktalk::chat::TranscriptState;
use tasktalk::config::{Config, EndpointProfile};
use tasktalk::credential::{CredentialStore, MemoryCredentialStore};
use tasktalk::models::{ConversationId, Message};
use tasktalk::session::SessionEvent;
use tasktalk::tasks::TaskFilter;
use tasktalk::{AuthError, Client, ClientError};

const VALID_TOKEN: &str = "valid-token";

#[derive(Default)]
struct Backend {
    tasks: Vec<Value>,
    next_task_id: i64,
    conversations: Vec<Value>,
    chat_bodies: Vec<Value>,
    seen_auth: Vec<Option<String>>,
    revoked: bool,
}

type Shared = Arc<Mutex<Backend>>;
type ApiError = (StatusCode, Json<Value>);

fn detail(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(json!({ "detail": msg })))
}

fn authorize(state: &Shared, headers: &HeaderMap) -> Result<(), ApiError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let mut b = state.lock().unwrap();
    b.seen_auth.push(header.clone());
    let expected = format!("Bearer {}", VALID_TOKEN);
    if b.revoked || header.as_deref() != Some(expected.as_str()) {
        return Err(detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"));
    }
    Ok(())
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Result<Json<Value>, ApiError> {
    if form.get("username").map(String::as_str) == Some("ana")
        && form.get("password").map(String::as_str) == Some("secret")
    {
        Ok(Json(json!({ "access_token": VALID_TOKEN, "token_type": "bearer" })))
    } else {
        Err(detail(StatusCode::UNAUTHORIZED, "Incorrect username or password"))
    }
}

async fn register(Json(body): Json<Value>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let username = body["username"].as_str().unwrap_or_default();
    if username == "taken" {
        return Err(detail(StatusCode::BAD_REQUEST, "Username already registered"));
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": 1,
            "email": body["email"],
            "username": username,
            "full_name": body.get("full_name").cloned().unwrap_or(Value::Null),
            "is_active": true,
            "created_at": "2024-05-01T10:00:00.000001"
        })),
    ))
}

async fn list_tasks(State(s): State<Shared>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    Ok(Json(json!({ "tasks": s.lock().unwrap().tasks })))
}

async fn list_tasks_bare(State(s): State<Shared>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    Ok(Json(Value::Array(s.lock().unwrap().tasks.clone())))
}

async fn create_task(
    State(s): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&s, &headers)?;
    let mut b = s.lock().unwrap();
    b.next_task_id += 1;
    let task = json!({
        "id": b.next_task_id,
        "title": body["title"],
        "description": body.get("description").cloned().unwrap_or(Value::Null),
        "completed": false,
        "owner_id": 1,
        "created_at": "2024-05-01T10:00:00.000001",
        "updated_at": "2024-05-01T10:00:00.000001"
    });
    b.tasks.push(task.clone());
    Ok((StatusCode::CREATED, Json(task)))
}

fn with_task<T>(s: &Shared, id: i64, f: impl FnOnce(&mut Value) -> T) -> Result<T, ApiError> {
    let mut b = s.lock().unwrap();
    b.tasks
        .iter_mut()
        .find(|t| t["id"].as_i64() == Some(id))
        .map(f)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Task not found"))
}

async fn update_task(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    with_task(&s, id, |t| {
        if let Some(obj) = body.as_object() {
            for (k, v) in obj {
                t[k.as_str()] = v.clone();
            }
        }
        Json(t.clone())
    })
}

async fn delete_task(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize(&s, &headers)?;
    with_task(&s, id, |_| ())?;
    s.lock().unwrap().tasks.retain(|t| t["id"].as_i64() != Some(id));
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_task(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    with_task(&s, id, |t| {
        t["completed"] = Value::Bool(true);
        Json(t.clone())
    })
}

async fn incomplete_task(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    with_task(&s, id, |t| {
        t["completed"] = Value::Bool(false);
        Json(t.clone())
    })
}

/// Replies "Added!" and reports the conversation id as a string, like one deployed variant does.
async fn chat(
    State(s): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    let mut b = s.lock().unwrap();
    b.chat_bodies.push(body.clone());
    let message = body["message"].as_str().unwrap_or_default().to_string();
    let id = match body.get("conversation_id").and_then(Value::as_i64) {
        Some(id) => id,
        None => {
            b.conversations.push(json!({
                "id": 42,
                "title": message.chars().take(50).collect::<String>(),
                "owner_id": 1,
                "created_at": "2024-05-01T10:00:00",
                "updated_at": "2024-05-01T10:00:00",
                "messages": []
            }));
            42
        }
    };
    let conv = b
        .conversations
        .iter_mut()
        .find(|c| c["id"].as_i64() == Some(id))
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Conversation not found"))?;
    if let Some(msgs) = conv["messages"].as_array_mut() {
        let n = msgs.len() as i64;
        msgs.push(json!({ "id": n + 1, "role": "user", "content": message, "conversation_id": id }));
        msgs.push(json!({ "id": n + 2, "role": "assistant", "content": "Added!", "conversation_id": id }));
    }
    Ok(Json(json!({
        "message": "Added!",
        "conversation_id": id.to_string(),
        "conversation_history": body["conversation_history"]
    })))
}

async fn list_conversations(
    State(s): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    Ok(Json(Value::Array(s.lock().unwrap().conversations.clone())))
}

async fn get_conversation(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    s.lock()
        .unwrap()
        .conversations
        .iter()
        .find(|c| c["id"].as_i64() == Some(id))
        .cloned()
        .map(Json)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Conversation not found"))
}

async fn delete_conversation(
    State(s): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&s, &headers)?;
    let mut b = s.lock().unwrap();
    let before = b.conversations.len();
    b.conversations.retain(|c| c["id"].as_i64() != Some(id));
    if b.conversations.len() == before {
        return Err(detail(StatusCode::NOT_FOUND, "Conversation not found"));
    }
    Ok(Json(json!({ "message": "Conversation deleted" })))
}

async fn start_backend() -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(Backend::default()));
    let app = Router::new()
        .route("/auth/token", post(token))
        .route("/auth/register", post(register))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/tasks", get(list_tasks_bare).post(create_task))
        .route("/api/tasks/:id", put(update_task).delete(delete_task))
        .route("/api/tasks/:id/complete", patch(complete_task))
        .route("/api/tasks/:id/incomplete", patch(incomplete_task))
        .route("/api/chat", post(chat))
        .route("/chat/", post(chat))
        .route("/chat/conversations", get(list_conversations))
        .route(
            "/chat/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, state)
}

fn config_for(addr: SocketAddr) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("http://{}/", addr);
    config.api.timeout_secs = 5;
    config
}

async fn logged_in_client(addr: SocketAddr) -> Client {
    let client = Client::with_store(&config_for(addr), Arc::new(MemoryCredentialStore::new()))
        .expect("client");
    client.session().login("ana", "secret").await.expect("login");
    client
}

#[tokio::test]
async fn task_crud_round_trip_with_bearer_header() {
    let (addr, state) = start_backend().await;
    let client = logged_in_client(addr).await;
    let mut tasks = client.tasks();

    let created = tasks.create("buy groceries", Some("milk, eggs")).await.unwrap();
    assert_eq!(created.title, "buy groceries");
    assert_eq!(tasks.tasks().len(), 1);
    tasks.create("call mom", None).await.unwrap();

    tasks.set_completed(created.id, true).await.unwrap();
    let counts = tasks.counts();
    assert_eq!((counts.all, counts.active, counts.completed), (2, 1, 1));
    assert_eq!(tasks.visible(TaskFilter::Completed)[0].id, created.id);

    let updated = tasks
        .update(
            created.id,
            tasktalk::models::TaskUpdate {
                title: Some("buy bread".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "buy bread");
    assert_eq!(updated.description.as_deref(), Some("milk, eggs"));

    let yes = |_: &str| true;
    assert!(tasks.delete(created.id, &yes).await.unwrap());
    assert_eq!(tasks.tasks().len(), 1);
    assert!(matches!(
        tasks.delete(created.id, &yes).await,
        Err(ClientError::NotFound(_))
    ));

    let seen = state.lock().unwrap().seen_auth.clone();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|h| h.as_deref() == Some("Bearer valid-token")));
}

#[tokio::test]
async fn empty_title_makes_no_request() {
    let (addr, state) = start_backend().await;
    let client = logged_in_client(addr).await;
    let mut tasks = client.tasks();
    assert!(matches!(
        tasks.create("", None).await,
        Err(ClientError::Validation(_))
    ));
    assert!(state.lock().unwrap().seen_auth.is_empty());
}

#[tokio::test]
async fn credential_rejection_forces_logout_and_keeps_cache() {
    let (addr, state) = start_backend().await;
    let client = logged_in_client(addr).await;
    let mut events = client.subscribe();
    let mut tasks = client.tasks();
    tasks.create("a", None).await.unwrap();
    assert_eq!(tasks.tasks().len(), 1);

    state.lock().unwrap().revoked = true;
    let err = tasks.refresh().await.unwrap_err();
    assert_eq!(err, ClientError::Auth(AuthError::Expired));
    assert!(!client.session().is_authenticated());
    assert_eq!(tasks.tasks().len(), 1);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
    assert!(events.try_recv().is_err());

    assert!(matches!(
        tasks.refresh().await,
        Err(ClientError::Auth(AuthError::NotAuthenticated))
    ));
}

#[tokio::test]
async fn bad_password_with_stale_token_is_not_an_expiry() {
    let (addr, _) = start_backend().await;
    let store = Arc::new(MemoryCredentialStore::with_token("stale"));
    let client = Client::with_store(&config_for(addr), store.clone()).unwrap();
    let mut events = client.subscribe();
    let err = client.session().login("ana", "nope").await.unwrap_err();
    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(store.load().as_deref(), Some("stale"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn register_logs_in_and_duplicate_is_rejected() {
    let (addr, _) = start_backend().await;
    let client = Client::with_store(&config_for(addr), Arc::new(MemoryCredentialStore::new())).unwrap();
    let err = client
        .session()
        .register("t@x.io", "taken", "secret", None)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Rejected("Username already registered".into()));
    assert!(!client.session().is_authenticated());

    client
        .session()
        .register("a@x.io", "ana", "secret", Some("Ana"))
        .await
        .unwrap();
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn chat_adopts_id_and_replays_history() {
    let (addr, state) = start_backend().await;
    let client = logged_in_client(addr).await;
    let mut chat = client.chat();

    let out = chat.send("Add a task to buy groceries").await.unwrap();
    assert!(out.adopted);
    assert_eq!(chat.active(), ConversationId::Existing(42));
    assert_eq!(
        chat.transcript().messages(),
        &[
            Message::user("Add a task to buy groceries"),
            Message::assistant("Added!")
        ]
    );
    assert_eq!(chat.conversations().len(), 1);

    chat.send("Show me all my tasks").await.unwrap();
    let bodies = state.lock().unwrap().chat_bodies.clone();
    assert!(bodies[0].get("conversation_id").is_none());
    assert_eq!(bodies[1]["conversation_id"], json!(42));
    assert_eq!(
        bodies[1]["conversation_history"],
        json!([
            { "role": "user", "content": "Add a task to buy groceries" },
            { "role": "assistant", "content": "Added!" },
            { "role": "user", "content": "Show me all my tasks" }
        ])
    );
}

#[tokio::test]
async fn select_and_delete_conversation() {
    let (addr, _) = start_backend().await;
    let client = logged_in_client(addr).await;
    let mut chat = client.chat();
    chat.send("first").await.unwrap();
    chat.clear();
    assert_eq!(chat.transcript().state(), TranscriptState::Empty);

    chat.select(42).await.unwrap();
    assert_eq!(chat.transcript().messages().len(), 2);
    assert_eq!(chat.active(), ConversationId::Existing(42));

    chat.delete(42).await.unwrap();
    assert!(chat.active().is_new());
    assert!(chat.transcript().messages().is_empty());
    assert!(chat.conversations().is_empty());
    assert!(matches!(chat.delete(42).await, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn legacy_profile_reads_bare_task_array() {
    let (addr, _) = start_backend().await;
    let mut config = config_for(addr);
    config.api.profile = EndpointProfile::Legacy;
    let client = Client::with_store(&config, Arc::new(MemoryCredentialStore::new())).unwrap();
    client.session().login("ana", "secret").await.unwrap();
    let mut tasks = client.tasks();
    tasks.create("legacy", None).await.unwrap();
    let all = tasks.list(TaskFilter::All).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "legacy");
}

#[tokio::test]
async fn token_survives_restart_via_token_file() {
    let (addr, _) = start_backend().await;
    let dir = std::env::temp_dir().join(format!("tasktalk-it-{}", uuid::Uuid::new_v4()));
    let config_path = dir.join("config.json");
    let config = config_for(addr);

    let first = Client::from_config(&config, &config_path).unwrap();
    first.session().login("ana", "secret").await.unwrap();
    drop(first);

    let second = Client::from_config(&config, &config_path).unwrap();
    assert!(second.session().is_authenticated());
    second.tasks().refresh().await.unwrap();
    second.session().logout();

    let third = Client::from_config(&config, &config_path).unwrap();
    assert!(!third.session().is_authenticated());
    let _ = std::fs::remove_dir_all(&dir);
}
