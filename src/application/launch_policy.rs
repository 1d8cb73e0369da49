//! Install-check-then-launch decisions, kept free of any launcher so they can be
//! reasoned about on their own.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Launch restricted to the provider's package.
    OpenInApp,
    /// Hand the original URL to the default external handler.
    OpenExternally,
    /// Send the user to the provider's store listing.
    OpenStoreListing,
}

/// Messaging and social deep links. `resolvable` is only meaningful when installed.
pub fn app_link_action(installed: bool, resolvable: bool) -> LinkAction {
    match (installed, resolvable) {
        (true, true) => LinkAction::OpenInApp,
        _ => LinkAction::OpenExternally,
    }
}

/// Finance apps launch without a resolvability check.
pub fn finance_app_action(installed: bool) -> LinkAction {
    if installed {
        LinkAction::OpenInApp
    } else {
        LinkAction::OpenStoreListing
    }
}
