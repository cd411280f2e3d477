//! Hosted backend client
//!
//! Talks to a PostgREST/GoTrue style backend-as-a-service: authentication
//! lives under `/auth/v1`, row access under `/rest/v1/<table>`. Every
//! request carries the project `apikey`; row requests additionally carry the
//! signed-in user's access token as a bearer token so row-level security
//! applies.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use url::Url;
use uuid::Uuid;

use crate::adapters::session_file::{SessionSlot, StoredSession};
use crate::domain::result::{Error, Result as CoreResult};
use crate::domain::{AuthSession, AuthUser, Row};
use crate::ports::{DataStore, Filter, IdentityProvider, Order, Table};

/// Provider name recorded with persisted sessions
pub const PROVIDER_NAME: &str = "hosted";

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: JsonValue,
}

impl RemoteUser {
    fn into_auth_user(self, fallback_email: &str) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.unwrap_or_else(|| fallback_email.to_string()),
            metadata: self.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteSession {
    access_token: String,
    user: RemoteUser,
}

/// Pull the human-readable message out of an error body
///
/// GoTrue uses `msg` or `error_description`, PostgREST uses `message`.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Render a filter value the way PostgREST expects it after `eq.`
fn filter_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

/// Hosted data service and identity provider
pub struct HostedBackend {
    client: Client,
    base_url: Url,
    api_key: String,
    session: SessionSlot,
}

impl HostedBackend {
    /// Create a client for the project at `base_url`
    ///
    /// Plain `http` is only accepted for loopback hosts.
    pub fn new(base_url: &str, api_key: &str, session: SessionSlot) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Hosted API key cannot be empty");
        }

        let mut url = Url::parse(base_url.trim()).context("Invalid hosted URL")?;
        match url.scheme() {
            "https" => {}
            "http" if is_loopback(&url) => {}
            "http" => bail!("Hosted URL must use https"),
            other => bail!("Unsupported URL scheme '{}'", other),
        }
        if url.host_str().is_none() {
            bail!("Hosted URL has no host");
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: url,
            api_key: api_key.trim().to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path '{}'", path))
    }

    fn table_url(&self, table: Table, filters: &[Filter], order: Option<&Order>) -> Result<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table.as_str()))?;
        {
            let mut query = url.query_pairs_mut();
            for filter in filters {
                query.append_pair(&filter.column, &format!("eq.{}", filter_value(&filter.value)));
            }
            if let Some(order) = order {
                let direction = if order.ascending { "asc" } else { "desc" };
                query.append_pair("order", &format!("{}.{}", order.column, direction));
            }
        }
        Ok(url)
    }

    /// Access token of the persisted session, if any
    fn access_token(&self) -> Option<String> {
        self.session
            .load(PROVIDER_NAME)
            .ok()
            .flatten()
            .map(|stored| stored.session.access_token)
    }

    /// Attach the project key and a bearer token (user token, else project key)
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.api_key.clone());
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Map request errors to user-friendly messages
    fn describe_request_error(&self, error: reqwest::Error) -> String {
        if error.is_timeout() {
            format!("Connection timed out after {} seconds", REQUEST_TIMEOUT_SECS)
        } else if error.is_connect() {
            format!("Unable to connect to {}", self.base_url)
        } else {
            format!("Request failed: {}", error)
        }
    }

    fn send_auth(&self, builder: RequestBuilder) -> CoreResult<Response> {
        let response = builder
            .header("apikey", &self.api_key)
            .send()
            .map_err(|e| Error::auth(self.describe_request_error(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(Error::auth(error_message(status, &body)))
    }

    fn send_rest(&self, builder: RequestBuilder) -> CoreResult<Vec<Row>> {
        let response = self
            .authorize(builder)
            .header("Prefer", "return=representation")
            .send()
            .map_err(|e| Error::persistence(self.describe_request_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = error_message(status, &body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::persistence(format!(
                    "not authorized ({}); sign in again",
                    message
                )),
                _ => Error::persistence(message),
            });
        }

        let rows: Vec<JsonValue> = response
            .json()
            .map_err(|e| Error::persistence(format!("Failed to parse response: {}", e)))?;
        rows.into_iter()
            .map(|row| match row {
                JsonValue::Object(map) => Ok(map),
                other => Err(Error::persistence(format!("expected a row object, got {}", other))),
            })
            .collect()
    }

    fn store_session(&self, remote: RemoteSession, email: &str) -> CoreResult<AuthSession> {
        let session = AuthSession {
            access_token: remote.access_token,
            user: remote.user.into_auth_user(email),
        };
        self.session
            .save(&StoredSession {
                provider: PROVIDER_NAME.to_string(),
                session: session.clone(),
            })
            .map_err(|e| Error::auth(format!("could not persist session: {}", e)))?;
        Ok(session)
    }

    fn endpoint_or_auth_error(&self, path: &str) -> CoreResult<Url> {
        self.endpoint(path).map_err(|e| Error::auth(e.to_string()))
    }
}

impl IdentityProvider for HostedBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    /// Validate the persisted token against `/auth/v1/user`
    ///
    /// A rejected token clears the session. When the service cannot be
    /// reached the persisted session is returned unverified.
    fn get_session(&self) -> CoreResult<Option<AuthSession>> {
        let stored = self
            .session
            .load(PROVIDER_NAME)
            .map_err(|e| Error::auth(format!("could not read session: {}", e)))?;
        let stored = match stored {
            Some(stored) => stored,
            None => return Ok(None),
        };

        let url = self.endpoint_or_auth_error("auth/v1/user")?;
        let response = match self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&stored.session.access_token)
            .send()
        {
            Ok(response) => response,
            Err(_) => return Ok(Some(stored.session)),
        };

        match response.status() {
            status if status.is_success() => {
                let user: RemoteUser = response
                    .json()
                    .map_err(|e| Error::auth(format!("Failed to parse user: {}", e)))?;
                Ok(Some(AuthSession {
                    user: user.into_auth_user(&stored.session.user.email),
                    access_token: stored.session.access_token,
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.session
                    .clear()
                    .map_err(|e| Error::auth(format!("could not clear session: {}", e)))?;
                Ok(None)
            }
            _ => Ok(Some(stored.session)),
        }
    }

    fn sign_up(&self, email: &str, password: &str, metadata: &JsonValue) -> CoreResult<AuthSession> {
        let url = self.endpoint_or_auth_error("auth/v1/signup")?;
        let response = self.send_auth(self.client.post(url).json(&json!({
            "email": email,
            "password": password,
            "data": metadata,
        })))?;

        let body: JsonValue = response
            .json()
            .map_err(|e| Error::auth(format!("Failed to parse sign-up response: {}", e)))?;
        if body.get("access_token").is_none() {
            return Err(Error::auth(
                "Sign-up accepted; confirm your e-mail address before signing in",
            ));
        }
        let remote: RemoteSession = serde_json::from_value(body)
            .map_err(|e| Error::auth(format!("Failed to parse sign-up response: {}", e)))?;
        self.store_session(remote, email)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> CoreResult<AuthSession> {
        let mut url = self.endpoint_or_auth_error("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self.send_auth(self.client.post(url).json(&json!({
            "email": email,
            "password": password,
        })))?;
        let remote: RemoteSession = response
            .json()
            .map_err(|e| Error::auth(format!("Failed to parse token response: {}", e)))?;
        self.store_session(remote, email)
    }

    fn sign_out(&self) -> CoreResult<()> {
        let token = self.access_token();
        self.session
            .clear()
            .map_err(|e| Error::auth(format!("could not clear session: {}", e)))?;

        let token = match token {
            Some(token) => token,
            None => return Ok(()),
        };
        let url = self.endpoint_or_auth_error("auth/v1/logout")?;
        self.send_auth(self.client.post(url).bearer_auth(token))?;
        Ok(())
    }
}

impl DataStore for HostedBackend {
    fn select(&self, table: Table, filters: &[Filter], order: Option<&Order>) -> CoreResult<Vec<Row>> {
        let mut url = self
            .table_url(table, filters, order)
            .map_err(|e| Error::persistence(e.to_string()))?;
        url.query_pairs_mut().append_pair("select", "*");
        self.send_rest(self.client.get(url))
    }

    fn insert(&self, table: Table, row: Row) -> CoreResult<Row> {
        let url = self
            .table_url(table, &[], None)
            .map_err(|e| Error::persistence(e.to_string()))?;
        self.send_rest(self.client.post(url).json(&row))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::persistence(format!("insert into {} returned no row", table)))
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> CoreResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(Error::persistence(format!(
                "refusing to update every row of {}",
                table
            )));
        }
        let url = self
            .table_url(table, filters, None)
            .map_err(|e| Error::persistence(e.to_string()))?;
        self.send_rest(self.client.patch(url).json(&patch))
    }
}
