use futures::{StreamExt, TryStreamExt};
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
    Client,
};
use tracing::debug;
use url::Url;

use crate::domain::{AppError, RemoteResponse};
use crate::utils::get_timestamp;

use super::models::{ApiConfig, ApiEnvelope, LaunchConfig};

pub type Result<T> = std::result::Result<T, AppError>;

const CONFIG_PATH: &str = "app/config";

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    client: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn config_url(&self) -> Result<Url> {
        let base = format!("{}/", self.config.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .and_then(|base| base.join(CONFIG_PATH))
            .map_err(|e| AppError::InvalidResponse(format!("Bad base URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("channel", &self.config.channel)
            .append_pair("version", &self.config.version_code.to_string())
            .append_pair("t", &get_timestamp().to_string());
        Ok(url)
    }

    /// Fetch the launch configuration shown behind the splash screen.
    pub async fn fetch_launch_config(&self) -> Result<LaunchConfig> {
        let url = self.config_url()?;
        debug!(%url, "Fetching launch config");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await?
            .error_for_status()?;

        let envelope: ApiEnvelope<LaunchConfig> = response
            .json()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        if envelope.code != 0 {
            return Err(AppError::Business {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        envelope
            .data
            .ok_or_else(|| AppError::InvalidResponse("Missing data".to_string()))
    }

    /// Start a GET and hand back status, headers and the unread body.
    ///
    /// The status is not checked here; the caller decides what counts as success.
    pub async fn retrieve(&self, url: &str) -> Result<RemoteResponse> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(RemoteResponse {
            status: response.status().as_u16(),
            content_length,
            content_type,
            body: Some(
                response
                    .bytes_stream()
                    .map_err(|e| AppError::Network(e.to_string()))
                    .boxed(),
            ),
        })
    }
}
