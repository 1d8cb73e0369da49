use std::collections::BTreeMap;

use bytes::Bytes;
use futures::stream::BoxStream;

use super::AppError;

pub type BodyStream = BoxStream<'static, Result<Bytes, AppError>>;

/// What a retrieval operation hands back to the fetcher.
pub struct RemoteResponse {
    pub status: u16,
    /// Raw `Content-Length`; may be negative when a server misreports it.
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub body: Option<BodyStream>,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.content_length.and_then(|len| u64::try_from(len).ok())
    }
}

/// Outcome of asking the dispatcher about a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// The navigation was diverted; the renderer must not load it.
    Intercepted,
    /// The renderer proceeds with the navigation unmodified.
    NotIntercepted,
}

impl NavigationDecision {
    pub fn is_intercepted(self) -> bool {
        matches!(self, NavigationDecision::Intercepted)
    }
}

/// A request to open an external component, the platform-neutral shape of a view intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    /// URI handed to the component.
    pub target: String,
    /// Restricts resolution to a single package.
    pub package: Option<String>,
    pub action: Option<String>,
    /// MIME type of the data, e.g. `text/plain` for share intents.
    pub mime_type: Option<String>,
    pub categories: Vec<String>,
    /// Explicit `package/class` component.
    pub component: Option<String>,
    pub extras: BTreeMap<String, String>,
    /// Launch into a new task.
    pub new_task: bool,
    pub fallback_url: Option<String>,
    /// Screen rectangle of the element that triggered the launch.
    pub source_bounds: Option<String>,
    /// Narrows which components may handle the request.
    pub selector: Option<Box<LaunchRequest>>,
}

impl LaunchRequest {
    pub const ACTION_VIEW: &'static str = "android.intent.action.VIEW";

    /// Plain view request resolved by whatever handler the platform picks.
    pub fn view(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: Some(Self::ACTION_VIEW.to_string()),
            ..Default::default()
        }
    }

    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_new_task(mut self) -> Self {
        self.new_task = true;
        self
    }
}

/// Snapshot of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    /// `None` when the server did not declare a usable length.
    pub total: Option<u64>,
    /// 0.0 to 100.0, only when the total is known.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        let percent = total.map(|t| {
            if t == 0 {
                100.0
            } else {
                (downloaded as f64 / t as f64 * 100.0) as f32
            }
        });

        Self {
            downloaded,
            total,
            percent,
        }
    }
}
