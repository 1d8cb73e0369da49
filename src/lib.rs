//! Native core of the WebView shell: the navigation dispatcher that diverts page
//! navigations to native apps, and the streaming fetcher that downloads update
//! packages to disk.

pub mod api;
pub mod application;
pub mod domain;
pub mod utils;

pub use api::{ApiClient, ApiConfig, LaunchConfig, UpdatePlan};
pub use application::{
    DispatchPolicy, DownloadEvent, FetcherConfig, NavigationDispatcher, StreamingFetcher,
};
pub use domain::{
    AppError, DownloadProgress, FailureKind, LaunchError, LaunchRequest, Launcher,
    NavigationDecision, PackageQuery, RemoteResponse,
};
