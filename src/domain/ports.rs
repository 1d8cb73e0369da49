//! Capabilities supplied by the host platform.

use tracing::warn;

use super::{LaunchError, LaunchRequest};

pub const MARKET_DETAILS_URL: &str = "market://details?id=";
pub const STORE_WEB_DETAILS_URL: &str = "https://play.google.com/store/apps/details?id=";

/// Answers whether a package is installed.
pub trait PackageQuery {
    fn is_installed(&self, package: &str) -> bool;
}

/// Opens external components (apps, browsers, system handlers).
pub trait Launcher {
    /// Whether any component would handle `request`. Must not launch anything.
    fn can_resolve(&self, request: &LaunchRequest) -> bool;

    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError>;

    /// Open the store listing for `package`, preferring the store app over the web page.
    fn open_store_listing(&self, package: &str) -> Result<(), LaunchError> {
        let market = LaunchRequest::view(format!("{MARKET_DETAILS_URL}{package}")).with_new_task();
        match self.launch(&market) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(package, error = %e, "Store app unavailable, opening web listing");
                let web = LaunchRequest::view(format!("{STORE_WEB_DETAILS_URL}{package}"))
                    .with_new_task();
                self.launch(&web)
            }
        }
    }
}

impl<T: PackageQuery + ?Sized> PackageQuery for &T {
    fn is_installed(&self, package: &str) -> bool {
        (**self).is_installed(package)
    }
}

impl<T: Launcher + ?Sized> Launcher for &T {
    fn can_resolve(&self, request: &LaunchRequest) -> bool {
        (**self).can_resolve(request)
    }

    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        (**self).launch(request)
    }

    fn open_store_listing(&self, package: &str) -> Result<(), LaunchError> {
        (**self).open_store_listing(package)
    }
}
