//! Priority-ordered dispatch table. The first rule whose prefix matches wins.

use crate::utils::starts_with_ignore_case;

#[derive(Debug, Clone, Copy)]
pub enum Handler {
    /// Deep link into a messaging or social app, opened in a browser when the app is absent.
    AppLink {
        package: &'static str,
        rewrite: Option<fn(&str) -> Option<String>>,
    },
    /// Rewritten to `https://` and opened externally.
    BrowserScheme,
    /// Parsed with the intent grammar and launched as-is.
    IntentScheme,
    /// Handed to the platform's default resolver.
    SystemScheme,
    /// Deep link into a finance app, falling back to its store listing.
    FinanceApp { package: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchRule {
    pub name: &'static str,
    pub prefixes: &'static [&'static str],
    pub handler: Handler,
}

impl DispatchRule {
    pub fn matches(&self, url: &str) -> bool {
        self.prefixes.iter().any(|p| starts_with_ignore_case(url, p))
    }
}

pub const WHATSAPP_PACKAGE: &str = "com.whatsapp";
pub const TELEGRAM_PACKAGE: &str = "org.telegram.messenger";
pub const FACEBOOK_PACKAGE: &str = "com.facebook.katana";
pub const PICPAY_PACKAGE: &str = "com.picpay";
pub const MERCADO_PAGO_PACKAGE: &str = "com.mercadopago.wallet";

pub const BROWSER_SCHEME: &str = "browser://";
pub const SECURE_WEB_SCHEME: &str = "https://";

pub static DISPATCH_RULES: &[DispatchRule] = &[
    DispatchRule {
        name: "whatsapp",
        prefixes: &["whatsapp://", "https://wa.me/"],
        handler: Handler::AppLink {
            package: WHATSAPP_PACKAGE,
            rewrite: None,
        },
    },
    DispatchRule {
        name: "telegram",
        prefixes: &[
            "tg://",
            "https://t.me/",
            "https://telegram.me/",
            "https://telegram.dog/",
        ],
        handler: Handler::AppLink {
            package: TELEGRAM_PACKAGE,
            rewrite: None,
        },
    },
    DispatchRule {
        name: "facebook",
        prefixes: &[
            "fb://",
            "https://facebook.com/",
            "https://www.facebook.com/",
            "https://m.facebook.com/",
            "https://fb.com/",
        ],
        handler: Handler::AppLink {
            package: FACEBOOK_PACKAGE,
            rewrite: Some(crate::utils::canonical_facebook_url),
        },
    },
    DispatchRule {
        name: "browser",
        prefixes: &[BROWSER_SCHEME],
        handler: Handler::BrowserScheme,
    },
    DispatchRule {
        name: "intent",
        prefixes: &["intent:"],
        handler: Handler::IntentScheme,
    },
    DispatchRule {
        name: "system",
        prefixes: &["tel:", "mailto:"],
        handler: Handler::SystemScheme,
    },
    DispatchRule {
        name: "picpay",
        prefixes: &["picpay://"],
        handler: Handler::FinanceApp {
            package: PICPAY_PACKAGE,
        },
    },
    DispatchRule {
        name: "mercadopago",
        prefixes: &["mercadopago://"],
        handler: Handler::FinanceApp {
            package: MERCADO_PAGO_PACKAGE,
        },
    },
];

pub fn find_rule<'r>(rules: &'r [DispatchRule], url: &str) -> Option<&'r DispatchRule> {
    rules.iter().find(|rule| rule.matches(url))
}
