//! Mock hosted backend for testing
//!
//! Simulates the subset of the GoTrue and PostgREST HTTP APIs used by
//! `HostedBackend`, backed by in-memory tables:
//! - POST /auth/v1/signup, POST /auth/v1/token?grant_type=password
//! - GET /auth/v1/user, POST /auth/v1/logout
//! - GET|POST|PATCH /rest/v1/{table} with `col=eq.value` and `order=col.dir`

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::domain::Row;

pub const MOCK_API_KEY: &str = "mock-anon-key";

#[derive(Debug, Clone)]
struct MockUser {
    id: Uuid,
    email: String,
    password: String,
    metadata: JsonValue,
}

impl MockUser {
    fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "email": self.email,
            "user_metadata": self.metadata,
        })
    }
}

/// Server-side state shared with the test
#[derive(Debug, Default)]
pub struct MockState {
    users: Vec<MockUser>,
    tokens: HashMap<String, Uuid>,
    tables: HashMap<String, Vec<Row>>,
    /// Tables whose inserts fail with HTTP 500
    pub fail_inserts_into: Vec<String>,
    /// Tables whose reads fail with HTTP 500
    pub fail_selects_from: Vec<String>,
    /// Return a user without a session from signup
    pub require_confirmation: bool,
}

impl MockState {
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Expire every issued access token
    pub fn revoke_tokens(&mut self) {
        self.tokens.clear();
    }

    fn issue_token(&mut self, user_id: Uuid) -> String {
        let token = format!("mock-token-{}", Uuid::new_v4());
        self.tokens.insert(token.clone(), user_id);
        token
    }

    fn user_for_token(&self, token: &str) -> Option<&MockUser> {
        let id = self.tokens.get(token)?;
        self.users.iter().find(|u| u.id == *id)
    }
}

struct MockRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl MockRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn bearer(&self) -> Option<&str> {
        self.header("authorization")?.strip_prefix("Bearer ")
    }

    fn json(&self) -> JsonValue {
        serde_json::from_slice(&self.body).unwrap_or(JsonValue::Null)
    }
}

/// Mock hosted server on a random local port
pub struct MockHostedServer {
    port: u16,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<MockState>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockHostedServer {
    pub fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(MockState::default()));

        // Non-blocking accept so stop() can end the loop
        listener.set_nonblocking(true)?;

        let running_clone = running.clone();
        let state_clone = state.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let state = state_clone.clone();
                        thread::spawn(move || handle_connection(stream, &state));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            state,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockHostedServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<MockRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/").to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.clone(), String::new()),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    Ok(Some(MockRequest {
        method,
        path,
        query,
        headers,
        body,
    }))
}

fn send_response(stream: &mut TcpStream, status: u16, body: &JsonValue) {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        _ => "Internal Server Error",
    };
    let body = if status == 204 { String::new() } else { body.to_string() };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn handle_connection(mut stream: TcpStream, state: &Arc<Mutex<MockState>>) {
    // Accepted sockets inherit non-blocking mode on some platforms
    let _ = stream.set_nonblocking(false);

    let request = match read_request(&mut stream) {
        Ok(Some(request)) => request,
        _ => return,
    };

    if request.header("apikey") != Some(MOCK_API_KEY) {
        send_response(&mut stream, 401, &json!({"message": "Invalid API key"}));
        return;
    }

    let mut state = state.lock().unwrap();
    let (status, body) = if let Some(rest) = request.path.strip_prefix("/auth/v1/") {
        route_auth(rest, &request, &mut state)
    } else if let Some(table) = request.path.strip_prefix("/rest/v1/") {
        route_rest(table, &request, &mut state)
    } else {
        (404, json!({"message": "Not found"}))
    };
    drop(state);

    send_response(&mut stream, status, &body);
}

fn route_auth(endpoint: &str, request: &MockRequest, state: &mut MockState) -> (u16, JsonValue) {
    match (request.method.as_str(), endpoint) {
        ("POST", "signup") => {
            let body = request.json();
            let email = body["email"].as_str().unwrap_or("").to_lowercase();
            let password = body["password"].as_str().unwrap_or("").to_string();
            if password.len() < 6 {
                return (422, json!({"msg": "Password should be at least 6 characters"}));
            }
            if state.users.iter().any(|u| u.email == email) {
                return (400, json!({"msg": "User already registered"}));
            }
            let user = MockUser {
                id: Uuid::new_v4(),
                email,
                password,
                metadata: body.get("data").cloned().unwrap_or_else(|| json!({})),
            };
            state.users.push(user.clone());
            if state.require_confirmation {
                return (200, user.to_json());
            }
            let token = state.issue_token(user.id);
            (200, json!({"access_token": token, "token_type": "bearer", "user": user.to_json()}))
        }
        ("POST", "token") => {
            let grant = request.query.iter().find(|(k, _)| k == "grant_type");
            if grant.map(|(_, v)| v.as_str()) != Some("password") {
                return (400, json!({"error": "unsupported_grant_type"}));
            }
            let body = request.json();
            let email = body["email"].as_str().unwrap_or("").to_lowercase();
            let password = body["password"].as_str().unwrap_or("");
            let user = state
                .users
                .iter()
                .find(|u| u.email == email && u.password == password)
                .cloned();
            match user {
                Some(user) => {
                    let token = state.issue_token(user.id);
                    (200, json!({"access_token": token, "token_type": "bearer", "user": user.to_json()}))
                }
                None => (
                    400,
                    json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}),
                ),
            }
        }
        ("GET", "user") => match request.bearer().and_then(|t| state.user_for_token(t)) {
            Some(user) => (200, user.to_json()),
            None => (401, json!({"msg": "invalid JWT"})),
        },
        ("POST", "logout") => {
            if let Some(token) = request.bearer() {
                state.tokens.remove(token);
            }
            (204, JsonValue::Null)
        }
        _ => (404, json!({"msg": "Not found"})),
    }
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_cells(a: &JsonValue, b: &JsonValue) -> std::cmp::Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => cell_text(a).cmp(&cell_text(b)),
    }
}

fn matches_filters(row: &Row, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, expected)| {
        row.get(column)
            .map(|value| cell_text(value) == *expected)
            .unwrap_or(false)
    })
}

fn route_rest(table: &str, request: &MockRequest, state: &mut MockState) -> (u16, JsonValue) {
    if request.bearer().and_then(|t| state.user_for_token(t)).is_none() {
        return (401, json!({"message": "JWT expired"}));
    }

    let filters: Vec<(String, String)> = request
        .query
        .iter()
        .filter_map(|(k, v)| v.strip_prefix("eq.").map(|v| (k.clone(), v.to_string())))
        .collect();

    match request.method.as_str() {
        "GET" => {
            if state.fail_selects_from.iter().any(|t| t == table) {
                return (500, json!({"message": "read failed"}));
            }
            let mut rows: Vec<Row> = state
                .rows(table)
                .into_iter()
                .filter(|row| matches_filters(row, &filters))
                .collect();
            if let Some((_, order)) = request.query.iter().find(|(k, _)| k == "order") {
                let (column, direction) = order.split_once('.').unwrap_or((order.as_str(), "asc"));
                rows.sort_by(|a, b| {
                    let ord = compare_cells(
                        a.get(column).unwrap_or(&JsonValue::Null),
                        b.get(column).unwrap_or(&JsonValue::Null),
                    );
                    if direction == "desc" {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            (200, JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect()))
        }
        "POST" => {
            if state.fail_inserts_into.iter().any(|t| t == table) {
                return (500, json!({"message": "insert failed"}));
            }
            let mut row = match request.json() {
                JsonValue::Object(row) => row,
                _ => return (400, json!({"message": "expected an object"})),
            };
            row.entry("id".to_string())
                .or_insert_with(|| json!(Uuid::new_v4().to_string()));
            row.entry("created_at".to_string())
                .or_insert_with(|| json!(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)));
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .push(row.clone());
            (201, json!([row]))
        }
        "PATCH" => {
            let patch = match request.json() {
                JsonValue::Object(patch) => patch,
                _ => return (400, json!({"message": "expected an object"})),
            };
            let mut updated = Vec::new();
            for row in state.tables.entry(table.to_string()).or_default().iter_mut() {
                if matches_filters(row, &filters) {
                    for (k, v) in &patch {
                        row.insert(k.clone(), v.clone());
                    }
                    updated.push(JsonValue::Object(row.clone()));
                }
            }
            (200, JsonValue::Array(updated))
        }
        _ => (404, json!({"message": "Not found"})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hosted::HostedBackend;
    use crate::adapters::session_file::SessionSlot;
    use crate::domain::result::Error;
    use crate::domain::{AccountKind, TransactionKind};
    use crate::ports::{DataStore, Filter, IdentityProvider, Order, Table};
    use crate::services::{LedgerStore, SessionStore};

    fn backend(server: &MockHostedServer) -> Arc<HostedBackend> {
        Arc::new(HostedBackend::new(&server.base_url(), MOCK_API_KEY, SessionSlot::memory()).unwrap())
    }

    #[test]
    fn test_sign_up_and_session_validation() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);

        let session = backend
            .sign_up("ada@example.com", "secret123", &json!({"full_name": "Ada"}))
            .unwrap();
        assert_eq!(session.user.metadata["full_name"], "Ada");

        let restored = backend.get_session().unwrap().unwrap();
        assert_eq!(restored.user.id, session.user.id);

        backend.sign_out().unwrap();
        assert!(backend.get_session().unwrap().is_none());
        assert_eq!(server.state().active_tokens(), 0);
    }

    #[test]
    fn test_auth_rejections_carry_service_message() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);

        let err = backend.sign_up("ada@example.com", "123", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("at least 6")));

        backend.sign_up("ada@example.com", "secret123", &json!({})).unwrap();
        let err = backend.sign_up("ada@example.com", "secret123", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m == "User already registered"));

        let err = backend.sign_in_with_password("ada@example.com", "nope-nope").unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m == "Invalid login credentials"));
    }

    #[test]
    fn test_sign_up_needing_confirmation() {
        let server = MockHostedServer::start().unwrap();
        server.state().require_confirmation = true;
        let backend = backend(&server);

        let err = backend.sign_up("ada@example.com", "secret123", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("confirm")));
        assert!(backend.get_session().unwrap().is_none());
    }

    #[test]
    fn test_wrong_api_key() {
        let server = MockHostedServer::start().unwrap();
        let backend = HostedBackend::new(&server.base_url(), "wrong", SessionSlot::memory()).unwrap();
        let err = backend.sign_in_with_password("ada@example.com", "secret123").unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m == "Invalid API key"));
    }

    #[test]
    fn test_rest_requires_session() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);
        let err = backend.select(Table::Accounts, &[], None).unwrap_err();
        assert!(matches!(err, Error::Persistence(ref m) if m.contains("sign in again")));
    }

    #[test]
    fn test_mutation_with_expired_token_is_rejected() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);
        let session = SessionStore::new(backend.clone(), backend.clone());
        let ledger = Arc::new(LedgerStore::new(backend.clone()));
        session.subscribe(ledger.clone());

        let identity = session.sign_up("ada@example.com", "secret123", "Ada").unwrap();
        ledger.create_account(AccountKind::Current, identity.id).unwrap();
        server.state().revoke_tokens();

        assert!(matches!(ledger.deposit(250), Err(Error::Persistence(_))));
        assert_eq!(ledger.get_balance(), 1000);
        assert_eq!(server.state().rows("accounts")[0]["balance"], 1000);
        assert!(server.state().rows("transactions").is_empty());
    }

    #[test]
    fn test_rows_round_trip_through_rest() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);
        let user = backend.sign_up("ada@example.com", "secret123", &json!({})).unwrap().user;

        let mut first = Row::new();
        first.insert("user_id".into(), json!(user.id.to_string()));
        first.insert("account_number".into(), json!("111111111"));
        first.insert("type".into(), json!("savings"));
        first.insert("balance".into(), json!(0));
        let first = backend.insert(Table::Accounts, first).unwrap();
        assert!(first.contains_key("id"));

        let mut second = first.clone();
        second.remove("id");
        second.remove("created_at");
        second.insert("account_number".into(), json!("222222222"));
        backend.insert(Table::Accounts, second).unwrap();

        let rows = backend
            .select(
                Table::Accounts,
                &[Filter::eq("user_id", user.id.to_string())],
                Some(&Order::desc("created_at")),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["account_number"], "222222222");

        let mut patch = Row::new();
        patch.insert("balance".into(), json!(75));
        let updated = backend
            .update(Table::Accounts, &[Filter::eq("id", first["id"].clone())], patch)
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["balance"], 75);
    }

    #[test]
    fn test_ledger_over_hosted_backend() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);
        let session = SessionStore::new(backend.clone(), backend.clone());
        let ledger = Arc::new(LedgerStore::new(backend.clone()));
        session.subscribe(ledger.clone());

        let identity = session.sign_up("ada@example.com", "secret123", "Ada").unwrap();
        assert_eq!(server.state().rows("users").len(), 1);
        assert!(ledger.take_load_error().is_none());

        ledger.create_account(AccountKind::Current, identity.id).unwrap();
        assert_eq!(ledger.get_balance(), 1000);

        ledger.deposit(500).unwrap();
        let tx = ledger.withdraw(200).unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdrawal);
        assert_eq!(tx.balance_after, 1300);
        assert_eq!(ledger.get_balance(), 1300);
        assert_eq!(ledger.transactions().len(), 2);
    }

    #[test]
    fn test_failed_transaction_insert_is_unlogged_mutation() {
        let server = MockHostedServer::start().unwrap();
        let backend = backend(&server);
        let session = SessionStore::new(backend.clone(), backend.clone());
        let ledger = Arc::new(LedgerStore::new(backend.clone()));
        session.subscribe(ledger.clone());

        let identity = session.sign_up("ada@example.com", "secret123", "Ada").unwrap();
        let account = ledger.create_account(AccountKind::Savings, identity.id).unwrap();
        server.state().fail_inserts_into.push("transactions".to_string());

        let err = ledger.deposit(40).unwrap_err();
        assert!(matches!(
            err,
            Error::UnloggedMutation { account_id, balance: 40, .. } if account_id == account.id
        ));
        assert_eq!(ledger.get_balance(), 40);
        assert!(server.state().rows("transactions").is_empty());
        assert_eq!(server.state().rows("accounts")[0]["balance"], 40);
    }
}
