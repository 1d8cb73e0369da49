pub mod intent;

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing_subscriber::EnvFilter;

pub use intent::parse_intent_uri;

static FACEBOOK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:fb://|https?://(?:www\.|m\.)?(?:facebook\.com|fb\.com)/)(.*)$")
        .expect("facebook link pattern is valid")
});

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Case-insensitive `str::strip_prefix`.
pub fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

pub fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    strip_prefix_ignore_case(s, prefix).is_some()
}

/// Rewrite web and `fb://` links into the `fb://` form the Facebook app resolves.
pub fn canonical_facebook_url(url: &str) -> Option<String> {
    FACEBOOK_LINK
        .captures(url)
        .map(|caps| format!("fb://{}", &caps[1]))
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides `default_directive`.
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
