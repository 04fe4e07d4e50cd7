use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::auth::Token;
use crate::error::{GeneratorError, Result};

use super::BranchSource;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_SECONDS: u64 = 5;
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Branch {
    name: String,
}

/// Read-only GitHub REST client.
pub struct GitHubClient {
    client: Client,
    base_url: Url,
    token: Option<Token>,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("prowgen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeneratorError::Config(format!("Failed to create HTTP client: {e}")))?;

        // A trailing slash keeps any path prefix (GitHub Enterprise) when joining.
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| GeneratorError::Config(format!("Invalid GitHub API URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn branches_url(&self, owner: &str, repo: &str, page: usize) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("repos/{owner}/{repo}/branches"))
            .map_err(|e| GeneratorError::Config(format!("Invalid branches URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// Lists every branch name of `owner/repo`, following pagination.
    pub async fn fetch_branches(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page = 1;

        loop {
            let url = self.branches_url(owner, repo, page)?;
            let branches: Vec<Branch> = self.get_json(url).await?;
            let count = branches.len();
            names.extend(branches.into_iter().map(|branch| branch.name));

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!("Found {} branches in {owner}/{repo}", names.len());
        Ok(names)
    }

    /// GET with retries on rate limiting and server errors.
    async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut retry_count = 0;
        loop {
            let response = self
                .auth_request(self.client.get(url.clone()))
                .send()
                .await?;
            let status = response.status();

            if (status == 429 || status.is_server_error()) && retry_count < MAX_RETRIES {
                retry_count += 1;
                warn!(
                    "GitHub API error (status {status}). Retrying in {RETRY_DELAY_SECONDS}s ({retry_count}/{MAX_RETRIES})..."
                );
                tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECONDS)).await;
                continue;
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(GeneratorError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response.json().await?);
        }
    }
}

impl BranchSource for GitHubClient {
    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        self.fetch_branches(owner, repo).await
    }
}
