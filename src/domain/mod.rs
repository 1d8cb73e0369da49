pub mod error;
pub mod model;
pub mod ports;

pub use error::{AppError, FailureKind, IntentParseError, LaunchError};
pub use model::{BodyStream, DownloadProgress, LaunchRequest, NavigationDecision, RemoteResponse};
pub use ports::{Launcher, PackageQuery};
