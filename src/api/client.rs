use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use crate::api::types::*;
use crate::error::{PromptTunerError, Result};

const AUTH_HEADER: &str = "authorizationToken";
const EXTRACTION_KEY: &str = "combined-extraction";

/// The remote calls the tuner makes against the IDP service.
#[async_trait]
pub trait IdpApi: Send + Sync {
    /// Bearer token sent on every call after authentication.
    fn set_token(&mut self, token: &str);

    async fn authenticate(&self, email: &str, password: &str) -> Result<String>;

    /// Raw bytes of a loan's combined extraction.
    async fn fetch_extraction(&self, upload_id: &str) -> Result<Vec<u8>>;

    /// Raw bytes of the category catalog.
    async fn fetch_categories(&self) -> Result<Vec<u8>>;

    async fn list_prompts(&self, category_uid: &str) -> Result<Vec<DataPoint>>;

    /// Starts a prompt test and returns its record id.
    async fn submit_prompt_test(&self, request: &PromptTestRequest) -> Result<String>;

    /// Current state of a prompt test record.
    async fn fetch_prompt_test(&self, test_id: &str) -> Result<Value>;
}

#[derive(Clone)]
pub struct IdpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl IdpClient {
    /// `base_url` should be like `https://idp.example.com/v2` (a trailing slash is dropped).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTH_HEADER, token),
            None => builder,
        }
    }

    async fn check(url: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PromptTunerError::Server {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl IdpApi for IdpClient {
    fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        let url = self.endpoint("auth/token");
        info!("Authenticating against {}", url);

        let resp = self
            .client
            .post(&url)
            .json(&AuthRequest { email, password })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(PromptTunerError::AuthenticationFailed(format!(
                "status code {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: AuthResponse = resp.json().await?;
        body.access_token.ok_or_else(|| {
            PromptTunerError::AuthenticationFailed(
                "authentication token not found in response".to_string(),
            )
        })
    }

    async fn fetch_extraction(&self, upload_id: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&format!("extraction/{}", upload_id));
        debug!("Downloading extraction {}", upload_id);

        let resp = self
            .authorized(self.client.get(&url))
            .query(&[("extractionKey", EXTRACTION_KEY)])
            .send()
            .await?;
        let resp = Self::check(&url, resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn fetch_categories(&self) -> Result<Vec<u8>> {
        let url = self.endpoint("categories");
        let resp = self.authorized(self.client.get(&url)).send().await?;
        let resp = Self::check(&url, resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn list_prompts(&self, category_uid: &str) -> Result<Vec<DataPoint>> {
        let url = self.endpoint(&format!("categories/{}/data-points", category_uid));
        let resp = self.authorized(self.client.get(&url)).send().await?;
        let resp = Self::check(&url, resp).await?;

        let body: DataPointsResponse = resp.json().await?;
        debug!(
            "Category {} has {} configured datapoints",
            category_uid,
            body.points.len()
        );
        Ok(body.points)
    }

    async fn submit_prompt_test(&self, request: &PromptTestRequest) -> Result<String> {
        let url = self.endpoint("test-llm-prompt");
        let resp = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        let resp = Self::check(&url, resp).await?;

        let body: SubmitResponse = resp.json().await?;
        let uid = body
            .uid
            .ok_or_else(|| PromptTunerError::missing("uid", "prompt test submission response"))?;
        info!("Prompt test submitted: {}", uid);
        Ok(uid)
    }

    async fn fetch_prompt_test(&self, test_id: &str) -> Result<Value> {
        let url = self.endpoint("test-llm-prompt");
        let resp = self
            .authorized(self.client.get(&url))
            .query(&[("record_id", test_id)])
            .send()
            .await?;
        let resp = Self::check(&url, resp).await?;
        Ok(resp.json().await?)
    }
}
