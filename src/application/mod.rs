pub mod dispatcher;
pub mod fetcher;
pub mod launch_policy;
pub mod progress;
pub mod rules;

pub use dispatcher::{DispatchPolicy, NavigationDispatcher};
pub use fetcher::{DownloadEvent, FetcherConfig, StreamingFetcher};
pub use launch_policy::LinkAction;
