use tracing::{debug, info, warn};

use crate::{
    domain::{LaunchError, LaunchRequest, Launcher, NavigationDecision, PackageQuery},
    utils::{parse_intent_uri, strip_prefix_ignore_case},
};

use super::{
    launch_policy::{app_link_action, finance_app_action, LinkAction},
    rules::{find_rule, DispatchRule, Handler, BROWSER_SCHEME, DISPATCH_RULES, SECURE_WEB_SCHEME},
};

#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    /// When the `browser://` handoff fails, let the renderer load the URL itself
    /// instead of swallowing the navigation.
    pub browser_failure_falls_through: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            browser_failure_falls_through: true,
        }
    }
}

/// Decides whether a renderer navigation is diverted to a native component.
pub struct NavigationDispatcher<P, L> {
    packages: P,
    launcher: L,
    rules: &'static [DispatchRule],
    policy: DispatchPolicy,
}

impl<P: PackageQuery, L: Launcher> NavigationDispatcher<P, L> {
    pub fn new(packages: P, launcher: L) -> Self {
        Self {
            packages,
            launcher,
            rules: DISPATCH_RULES,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Classify `url` and perform the diversion if one applies.
    ///
    /// Safe for both top-level and popup navigations. Never fails: launcher
    /// errors are logged and folded into the decision.
    pub fn decide(&self, url: &str) -> NavigationDecision {
        let url = url.trim();
        if url.is_empty() {
            return NavigationDecision::NotIntercepted;
        }

        let Some(rule) = find_rule(self.rules, url) else {
            return NavigationDecision::NotIntercepted;
        };
        debug!(rule = rule.name, url, "Navigation matched dispatch rule");

        match rule.handler {
            Handler::AppLink { package, rewrite } => self.open_app_link(url, package, rewrite),
            Handler::BrowserScheme => self.open_browser_scheme(url),
            Handler::IntentScheme => self.open_intent(url),
            Handler::SystemScheme => self.open_system(url),
            Handler::FinanceApp { package } => self.open_finance_app(url, package),
        }
    }

    fn open_app_link(
        &self,
        url: &str,
        package: &str,
        rewrite: Option<fn(&str) -> Option<String>>,
    ) -> NavigationDecision {
        let installed = self.packages.is_installed(package);
        let target = rewrite
            .and_then(|rewrite| rewrite(url))
            .unwrap_or_else(|| url.to_string());
        let in_app = LaunchRequest::view(target).in_package(package);
        let resolvable = installed && self.launcher.can_resolve(&in_app);

        let result = match app_link_action(installed, resolvable) {
            LinkAction::OpenInApp => self.launcher.launch(&in_app).or_else(|e| {
                warn!(package, error = %e, "In-app launch failed, opening externally");
                self.open_externally(url)
            }),
            _ => self.open_externally(url),
        };

        if let Err(e) = result {
            warn!(package, url, error = %e, "Deep link could not be opened");
        }
        NavigationDecision::Intercepted
    }

    fn open_browser_scheme(&self, url: &str) -> NavigationDecision {
        let rest = strip_prefix_ignore_case(url, BROWSER_SCHEME).unwrap_or(url);
        let target = format!("{SECURE_WEB_SCHEME}{rest}");

        match self.open_externally(&target) {
            Ok(()) => NavigationDecision::Intercepted,
            Err(e) => {
                warn!(url, error = %e, "Browser handoff failed");
                if self.policy.browser_failure_falls_through {
                    NavigationDecision::NotIntercepted
                } else {
                    NavigationDecision::Intercepted
                }
            }
        }
    }

    fn open_intent(&self, url: &str) -> NavigationDecision {
        let request = match parse_intent_uri(url) {
            Ok(request) => request,
            Err(e) => {
                warn!(url, error = %e, "Unparseable intent URI");
                return NavigationDecision::NotIntercepted;
            }
        };

        match self.launcher.launch(&request) {
            Ok(()) => {
                info!(uri = %request.target, package = ?request.package, "Launched intent");
                NavigationDecision::Intercepted
            }
            Err(e) => {
                warn!(url, error = %e, "Intent launch failed");
                NavigationDecision::NotIntercepted
            }
        }
    }

    fn open_system(&self, url: &str) -> NavigationDecision {
        match self.launcher.launch(&LaunchRequest::view(url)) {
            Ok(()) => NavigationDecision::Intercepted,
            Err(e) => {
                warn!(url, error = %e, "System handler unavailable");
                NavigationDecision::NotIntercepted
            }
        }
    }

    fn open_finance_app(&self, url: &str, package: &str) -> NavigationDecision {
        let installed = self.packages.is_installed(package);

        let result = match finance_app_action(installed) {
            LinkAction::OpenInApp => self.launcher.launch(
                &LaunchRequest::view(url)
                    .in_package(package)
                    .with_new_task(),
            ),
            _ => {
                info!(package, "App not installed, opening store listing");
                self.launcher.open_store_listing(package)
            }
        };

        if let Err(e) = result {
            warn!(package, url, error = %e, "Finance app link could not be opened");
        }
        NavigationDecision::Intercepted
    }

    fn open_externally(&self, url: &str) -> Result<(), LaunchError> {
        info!(url, "Opening externally");
        self.launcher.launch(&LaunchRequest::view(url))
    }
}
