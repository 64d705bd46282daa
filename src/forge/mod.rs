//! Repository discovery against a GitHub-compatible forge API.
//!
//! The client authenticates with basic auth and pages through an
//! organisation's repository listing, accumulating every page before
//! returning. Callers need the full set up front to size the per-run
//! fan-out, so the listing is deliberately not a lazy stream.

use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ForgeConfig;

/// Repositories fetched per listing page.
const PER_PAGE: usize = 100;

/// Errors from the forge API.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// The forge rejected the configured credentials. Fatal for the run.
    #[error("forge rejected the configured credentials")]
    Auth,

    /// Network failure or server-side error. The enclosing call is safe
    /// to retry as a whole.
    #[error("transient forge error: {0}")]
    Transient(String),

    /// Unexpected but definitive response from the forge.
    #[error("forge returned unexpected status {status} for {context}")]
    Api { status: u16, context: String },

    /// The response body did not match the expected shape.
    #[error("failed to decode forge response: {0}")]
    Decode(reqwest::Error),

    #[error("invalid forge api base url {0:?}")]
    BaseUrl(String),
}

/// One repository as returned by the organisation listing.
///
/// Immutable once produced; consumed exactly once by a clone task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryDescriptor {
    /// "org/name" form, used in logs.
    pub full_name: String,
    /// HTTPS clone URL without credentials.
    pub clone_url: String,
    /// Repository name, used for scratch paths and the artifact key.
    pub name: String,
}

/// Client for a GitHub-compatible REST API.
///
/// Stateless apart from the connection pool; safe to share across
/// concurrent tasks behind an `Arc`.
pub struct ForgeClient {
    http: reqwest::Client,
    base: Url,
    username: String,
    password: String,
}

impl ForgeClient {
    /// Build a client from the forge configuration.
    pub fn new(config: &ForgeConfig) -> Result<Self, ForgeError> {
        // A trailing slash makes Url::join treat the last path segment of
        // the base as a directory (GitHub Enterprise bases like /api/v3).
        let mut base = config.api_base.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base).map_err(|_| ForgeError::BaseUrl(config.api_base.clone()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("forgevault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForgeError::Transient(e.to_string()))?;

        Ok(Self {
            http,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Verify the configured credentials against the forge.
    ///
    /// Probes `GET /user` so that bad credentials abort the run before any
    /// organisation is processed, instead of surfacing mid-listing.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<(), ForgeError> {
        let url = self
            .base
            .join("user")
            .map_err(|_| ForgeError::BaseUrl(self.base.to_string()))?;

        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(classify_send_error)?;

        check_status(response.status(), "user")?;
        debug!(username = %self.username, "forge credentials verified");
        Ok(())
    }

    /// List every repository of an organisation.
    ///
    /// Pages through the listing until a short page signals the end and
    /// accumulates all pages. An organisation with zero repositories
    /// yields an empty vec, not an error.
    #[instrument(skip(self), fields(org = %organisation))]
    pub async fn list_org_repos(
        &self,
        organisation: &str,
    ) -> Result<Vec<RepositoryDescriptor>, ForgeError> {
        let url = self
            .base
            .join(&format!("orgs/{organisation}/repos"))
            .map_err(|_| ForgeError::BaseUrl(self.base.to_string()))?;

        let mut all_repos = Vec::new();
        let mut page = 1usize;

        loop {
            let response = self
                .http
                .get(url.clone())
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await
                .map_err(classify_send_error)?;

            check_status(response.status(), &format!("orgs/{organisation}/repos"))?;

            let repos: Vec<RepositoryDescriptor> =
                response.json().await.map_err(ForgeError::Decode)?;
            let page_len = repos.len();
            all_repos.extend(repos);

            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(count = all_repos.len(), "organisation listing complete");
        Ok(all_repos)
    }
}

/// Classify a request-level failure. Connection errors, timeouts and other
/// pre-response issues are transient.
fn classify_send_error(error: reqwest::Error) -> ForgeError {
    ForgeError::Transient(error.to_string())
}

/// Map a non-success status into the error taxonomy.
fn check_status(status: reqwest::StatusCode, context: &str) -> Result<(), ForgeError> {
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ForgeError::Auth);
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ForgeError::Transient(format!(
            "{context} returned {status}"
        )));
    }
    Err(ForgeError::Api {
        status: status.as_u16(),
        context: context.to_string(),
    })
}
