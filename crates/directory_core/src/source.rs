use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{User, UserId},
    error::{ErrorCode, SourceError},
    query::UserQuery,
};
use url::Url;

/// External collaborator that answers one committed query with one page of
/// users. Implementations must be safe to call concurrently; the coordinator
/// never cancels an in-flight fetch, it only discards superseded answers.
#[async_trait]
pub trait UserSource: Send + Sync {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<User>, SourceError>;
}

/// Null object for wiring a controller before a real source exists.
pub struct MissingUserSource;

#[async_trait]
impl UserSource for MissingUserSource {
    async fn fetch_users(&self, _query: &UserQuery) -> Result<Vec<User>, SourceError> {
        Err(SourceError::unavailable("user source is unavailable"))
    }
}

/// Fetches pages from `GET {base}/users` with the query encoded as request
/// parameters.
#[derive(Debug)]
pub struct HttpUserSource {
    http: Client,
    base_url: Url,
}

impl HttpUserSource {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, SourceError> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|err| SourceError::new(ErrorCode::BadRequest, format!("invalid base url: {err}")))?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }
}

#[async_trait]
impl UserSource for HttpUserSource {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<User>, SourceError> {
        let url = self
            .base_url
            .join("users")
            .map_err(|err| SourceError::internal(format!("invalid users url: {err}")))?;
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| SourceError::unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Prefer the structured error body when the server sent one.
            return match response.json::<SourceError>().await {
                Ok(err) => Err(err),
                Err(_) => Err(SourceError::new(
                    code_for_status(status),
                    format!("request failed with status {status}"),
                )),
            };
        }

        response
            .json::<Vec<User>>()
            .await
            .map_err(|err| SourceError::internal(format!("invalid users payload: {err}")))
    }
}

fn code_for_status(status: reqwest::StatusCode) -> ErrorCode {
    if status == reqwest::StatusCode::NOT_FOUND {
        ErrorCode::NotFound
    } else if status.is_client_error() {
        ErrorCode::BadRequest
    } else {
        ErrorCode::Unavailable
    }
}

/// In-memory directory, the stand-in for the tutorial's mocked API: filters
/// the fixed list, slices the requested page, and can simulate network
/// latency so response races are reproducible.
pub struct StaticUserSource {
    users: Vec<User>,
    latency: Duration,
}

impl StaticUserSource {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn matches(user: &User, query: &UserQuery) -> bool {
        let name = query.name.trim().to_ascii_lowercase();
        if !name.is_empty() && !user.name.to_ascii_lowercase().contains(&name) {
            return false;
        }
        let age = query.age.trim();
        if !age.is_empty() {
            // An unparseable age filter matches nobody; the validator already
            // flagged it at the input field.
            return age.parse::<u32>().map(|age| user.age == age).unwrap_or(false);
        }
        true
    }
}

#[async_trait]
impl UserSource for StaticUserSource {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<User>, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self
            .users
            .iter()
            .filter(|user| Self::matches(user, query))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}

/// Deterministic sample directory for the demo binary and tests.
pub fn sample_users(count: usize) -> Vec<User> {
    const NAMES: [&str; 8] = [
        "Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi",
    ];
    (0..count)
        .map(|i| User {
            id: UserId(i as i64 + 1),
            name: format!("{}{}", NAMES[i % NAMES.len()], i / NAMES.len() + 1),
            age: (i as u32 * 7) % 100 + 1,
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
