//! HTTP request step
//!
//! Sends one request and publishes the response under the step's name:
//! `<name>.responseStatusCode`, `<name>.responseContent`, and for audio
//! responses `<name>.responseFile` (a per-call temporary file).

use super::{result_key, Step, StepContext, StepResult};
use crate::flow::Expr;
use crate::state_machine::Outcome;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_method(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSetting {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebInteractionSettings {
    pub name: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub uri: Expr,
    #[serde(default)]
    pub content: Option<Expr>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<HeaderSetting>,
    /// Falls back to the engine-wide HTTP timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub struct WebInteraction {
    settings: WebInteractionSettings,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebInteraction {
    pub fn new(
        settings: WebInteractionSettings,
        client: reqwest::Client,
        default_timeout: Duration,
    ) -> Self {
        let timeout = settings
            .timeout_ms
            .map_or(default_timeout, Duration::from_millis);
        Self {
            settings,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl Step for WebInteraction {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let name = &self.settings.name;
        let uri = self.settings.uri.evaluate_text(ctx.variables)?;

        let mut request = self
            .client
            .request(self.settings.method.as_method(), &uri)
            .timeout(self.timeout);
        for header in &self.settings.headers {
            let value = header.value.evaluate_text(ctx.variables)?;
            request = request.header(header.name.as_str(), value);
        }
        if let Some(content) = &self.settings.content {
            let body = content.evaluate_text(ctx.variables)?;
            if let Some(content_type) = &self.settings.content_type {
                request = request.header(CONTENT_TYPE, content_type.as_str());
            }
            request = request.body(body);
        }

        tracing::debug!(step = %name, method = ?self.settings.method, %uri, "Sending web request");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let is_audio = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("audio/"));

        if is_audio {
            let bytes = response.bytes().await?;
            let path = ctx.temp_files.create_file("wav")?;
            tokio::fs::write(&path, &bytes).await?;
            ctx.variables
                .set(result_key(name, "responseFile"), path.display().to_string());
            ctx.variables.set(result_key(name, "responseContent"), "");
        } else {
            let text = response.text().await?;
            ctx.variables.set(result_key(name, "responseContent"), text);
        }
        ctx.variables
            .set(result_key(name, "responseStatusCode"), status);

        tracing::debug!(step = %name, status, "Web request completed");
        Ok(Outcome::Continue)
    }
}
