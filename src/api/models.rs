use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::sanitize_filename;

/// Envelope every endpoint of the shell API wraps its payload in.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default, alias = "message")]
    pub msg: String,
    pub data: Option<T>,
}

/// Response from the /app/config endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Page the WebView opens after the splash screen.
    pub home_url: String,
    #[serde(default)]
    pub latest_version_code: u32,
    #[serde(default)]
    pub apk_url: Option<String>,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub update_notes: String,
}

impl LaunchConfig {
    /// An update is offered only when a newer build and its APK are both published.
    pub fn update_plan(&self, current_version_code: u32) -> Option<UpdatePlan> {
        if self.latest_version_code <= current_version_code {
            return None;
        }
        let apk_url = self.apk_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;

        Some(UpdatePlan {
            version_code: self.latest_version_code,
            apk_url: apk_url.to_string(),
            force: self.force_update,
            notes: self.update_notes.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub version_code: u32,
    pub apk_url: String,
    pub force: bool,
    pub notes: String,
}

impl UpdatePlan {
    /// File name to store the APK under, taken from the URL when it names one.
    pub fn file_name(&self) -> String {
        Url::parse(&self.apk_url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .map(|name| sanitize_filename(&name))
            .filter(|name| name.to_ascii_lowercase().ends_with(".apk") && name.len() > 4)
            .unwrap_or_else(|| format!("update-{}.apk", self.version_code))
    }
}

/// Configuration for the API client
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Distribution channel reported to the config endpoint.
    pub channel: String,
    pub version_code: u32,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            channel: "official".to_string(),
            version_code: 1,
            user_agent: concat!("webview-shell/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
