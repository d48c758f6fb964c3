use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{header, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

const GITHUB_API_URL: &str = "https://api.github.com";
const GIST_DESCRIPTION: &str = "Usage Tracker Data Backup";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GistError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("GitHub API error {status}: {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("a token is required to write gists")]
    MissingToken,
}

/// Access to the one remote file holding the usage document.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GistApi: Send + Sync {
    /// Content of the usage document. `None` if nothing was stored yet.
    async fn fetch_document(&self) -> Result<Option<String>, GistError>;

    /// Replaces the whole usage document, creating the gist when there is none.
    async fn write_document(&mut self, content: String) -> Result<(), GistError>;

    /// Id of the backing gist, if one exists.
    fn gist_id(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct GistWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public: Option<bool>,
    files: HashMap<&'a str, GistFileWrite<'a>>,
}

#[derive(Debug, Serialize)]
struct GistFileWrite<'a> {
    content: &'a str,
}

impl<'a> GistWrite<'a> {
    fn create(file_name: &'a str, content: &'a str) -> Self {
        Self {
            description: Some(GIST_DESCRIPTION),
            public: Some(false),
            files: HashMap::from([(file_name, GistFileWrite { content })]),
        }
    }

    fn update(file_name: &'a str, content: &'a str) -> Self {
        Self {
            description: None,
            public: None,
            files: HashMap::from([(file_name, GistFileWrite { content })]),
        }
    }
}

/// [GistApi] over the GitHub REST API.
pub struct GistClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    gist_id: Option<String>,
    file_name: String,
}

impl fmt::Debug for GistClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GistClient")
            .field("gist_id", &self.gist_id)
            .field("file_name", &self.file_name)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl GistClient {
    /// Every request is bounded by `timeout`, so a hung connection looks like any other network
    /// failure to the caller.
    pub fn new(
        token: Option<String>,
        gist_id: Option<String>,
        file_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GistError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GistError::ClientBuild)?;

        Ok(Self {
            http,
            api_base: GITHUB_API_URL.into(),
            token: token.filter(|v| !v.trim().is_empty()),
            gist_id,
            file_name: file_name.into(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn checked(response: Response) -> Result<Response, GistError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GistError::Api { status, message })
    }

    async fn file_content(&self, file: GistFile) -> Result<Option<String>, GistError> {
        match file {
            GistFile {
                truncated: true,
                raw_url: Some(raw_url),
                ..
            } => {
                debug!("Gist file is truncated, downloading {raw_url}");
                let response = self.authorized(self.http.get(raw_url)).send().await?;
                Ok(Some(Self::checked(response).await?.text().await?))
            }
            GistFile { content, .. } => Ok(content),
        }
    }
}

#[async_trait]
impl GistApi for GistClient {
    #[instrument(skip(self))]
    async fn fetch_document(&self) -> Result<Option<String>, GistError> {
        let Some(gist_id) = &self.gist_id else {
            return Ok(None);
        };

        let url = format!("{}/gists/{gist_id}", self.api_base);
        let response = self.authorized(self.http.get(url)).send().await?;
        let mut gist = Self::checked(response).await?.json::<GistResponse>().await?;

        match gist.files.remove(&self.file_name) {
            Some(file) => self.file_content(file).await,
            None => {
                info!("Gist {gist_id} has no {} yet", self.file_name);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, content))]
    async fn write_document(&mut self, content: String) -> Result<(), GistError> {
        if self.token.is_none() {
            return Err(GistError::MissingToken);
        }

        match &self.gist_id {
            Some(gist_id) => {
                let url = format!("{}/gists/{gist_id}", self.api_base);
                let body = GistWrite::update(&self.file_name, &content);
                let response = self.authorized(self.http.patch(url)).json(&body).send().await?;
                Self::checked(response).await?;
                debug!("Updated gist {gist_id}");
            }
            None => {
                let url = format!("{}/gists", self.api_base);
                let body = GistWrite::create(&self.file_name, &content);
                let response = self.authorized(self.http.post(url)).json(&body).send().await?;
                let gist = Self::checked(response).await?.json::<GistResponse>().await?;
                info!("Created gist {}", gist.id);
                self.gist_id = Some(gist.id);
            }
        }
        Ok(())
    }

    fn gist_id(&self) -> Option<String> {
        self.gist_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_body_is_private_gist() {
        let body = serde_json::to_value(GistWrite::create("usage-data.json", "{}")).unwrap();
        assert_eq!(
            body,
            json!({
                "description": "Usage Tracker Data Backup",
                "public": false,
                "files": { "usage-data.json": { "content": "{}" } }
            })
        );
    }

    #[test]
    fn test_update_body_only_touches_files() {
        let body = serde_json::to_value(GistWrite::update("usage-data.json", "{}")).unwrap();
        assert_eq!(
            body,
            json!({ "files": { "usage-data.json": { "content": "{}" } } })
        );
    }

    #[test]
    fn test_parse_gist_response() {
        let response = serde_json::from_value::<GistResponse>(json!({
            "id": "abc",
            "updated_at": "2024-01-01T00:00:00Z",
            "files": {
                "usage-data.json": {
                    "content": "{}",
                    "truncated": false,
                    "raw_url": "https://gist.githubusercontent.com/raw"
                }
            }
        }))
        .unwrap();
        assert_eq!(response.id, "abc");
        assert_eq!(
            response.files["usage-data.json"].content.as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = GistClient::new(
            Some("secret".into()),
            Some("abc".into()),
            "usage-data.json",
            Duration::from_secs(5),
        )
        .unwrap();
        let printed = format!("{client:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_no_gist_reads_nothing() {
        let client =
            GistClient::new(None, None, "usage-data.json", Duration::from_secs(5)).unwrap();
        assert_eq!(client.fetch_document().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_requires_token() {
        let mut client =
            GistClient::new(Some("  ".into()), None, "usage-data.json", Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            client.write_document("{}".into()).await,
            Err(GistError::MissingToken)
        ));
    }
}
