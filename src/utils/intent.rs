//! Parser for `intent:` URIs, the structured form page scripts use to address a
//! specific component, e.g.
//! `intent://scan/#Intent;scheme=zxing;package=com.google.zxing.client.android;end`.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::domain::{IntentParseError, LaunchRequest};

const INTENT_SCHEME: &str = "intent:";
const FRAGMENT_START: &str = "#Intent;";
const FRAGMENT_END: &str = "end";
const SELECTOR_MARKER: &str = "SEL";
const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;
const BROWSER_FALLBACK_EXTRA: &str = "S.browser_fallback_url";

/// Parse an intent URI into a launch request.
pub fn parse_intent_uri(uri: &str) -> Result<LaunchRequest, IntentParseError> {
    let body = super::strip_prefix_ignore_case(uri.trim(), INTENT_SCHEME)
        .ok_or(IntentParseError::NotIntent)?;

    let (data, fragment) = match body.find(FRAGMENT_START) {
        Some(idx) => (&body[..idx], Some(&body[idx + FRAGMENT_START.len()..])),
        None => (body, None),
    };

    let mut request = LaunchRequest::default();
    let mut selector: Option<LaunchRequest> = None;
    let mut scheme = None;

    if let Some(fragment) = fragment {
        let mut terminated = false;
        for part in fragment.split(';') {
            if part == FRAGMENT_END {
                terminated = true;
                break;
            }
            if part.is_empty() {
                continue;
            }
            // keys after `SEL` describe the selector
            if part == SELECTOR_MARKER {
                selector.get_or_insert_with(LaunchRequest::default);
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| IntentParseError::Malformed(part.to_string()))?;
            let value = percent_decode(value)?;
            let current = match selector.as_mut() {
                Some(selector) => selector,
                None => &mut request,
            };

            match key {
                "action" => current.action = Some(value),
                "category" => current.categories.push(value),
                "type" => current.mime_type = Some(value),
                "component" => current.component = Some(value),
                "package" => current.package = Some(value),
                "sourceBounds" => current.source_bounds = Some(value),
                "scheme" => scheme = Some(value),
                "launchFlags" => {
                    let flags = parse_flags(&value)?;
                    current.new_task = flags & FLAG_ACTIVITY_NEW_TASK != 0;
                }
                BROWSER_FALLBACK_EXTRA => request.fallback_url = Some(value),
                _ if is_extra_key(key) => {
                    current.extras.insert(key.to_string(), value);
                }
                _ => return Err(IntentParseError::Malformed(part.to_string())),
            }
        }
        if !terminated {
            return Err(IntentParseError::Unterminated);
        }
    }
    request.selector = selector.map(Box::new);

    request.target = match scheme {
        Some(scheme) => {
            let target = format!("{scheme}:{data}");
            Url::parse(&target).map_err(|e| IntentParseError::Malformed(e.to_string()))?;
            target
        }
        None => data.to_string(),
    };

    if request.action.is_none() {
        request.action = Some(LaunchRequest::ACTION_VIEW.to_string());
    }

    Ok(request)
}

// Typed extras look like `S.name`, `i.count`, `B.flag` ...
fn is_extra_key(key: &str) -> bool {
    matches!(
        key.split_once('.'),
        Some((ty, name)) if !name.is_empty() && matches!(ty, "S" | "B" | "b" | "c" | "d" | "f" | "i" | "l" | "s")
    )
}

fn parse_flags(value: &str) -> Result<u32, IntentParseError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|_| IntentParseError::Malformed(format!("launchFlags={value}")))
}

fn percent_decode(value: &str) -> Result<String, IntentParseError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| IntentParseError::Malformed(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_intent() {
        let req = parse_intent_uri(
            "intent://scan/#Intent;scheme=zxing;package=com.google.zxing.client.android;\
             category=android.intent.category.BROWSABLE;S.browser_fallback_url=https%3A%2F%2Fzxing.org;end",
        )
        .unwrap();

        assert_eq!(req.target, "zxing://scan/");
        assert_eq!(req.package.as_deref(), Some("com.google.zxing.client.android"));
        assert_eq!(req.categories, vec!["android.intent.category.BROWSABLE"]);
        assert_eq!(req.fallback_url.as_deref(), Some("https://zxing.org"));
        assert_eq!(req.action.as_deref(), Some(LaunchRequest::ACTION_VIEW));
    }

    #[test]
    fn test_parse_flags_and_extras() {
        let req = parse_intent_uri(
            "intent:#Intent;action=com.example.OPEN;launchFlags=0x10000000;S.token=abc%20def;i.count=3;end",
        )
        .unwrap();

        assert_eq!(req.target, "");
        assert_eq!(req.action.as_deref(), Some("com.example.OPEN"));
        assert!(req.new_task);
        assert_eq!(req.extras.get("S.token").map(String::as_str), Some("abc def"));
        assert_eq!(req.extras.get("i.count").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_intent_uri("https://example.com"),
            Err(IntentParseError::NotIntent)
        );
        assert_eq!(
            parse_intent_uri("intent://x#Intent;package=com.a"),
            Err(IntentParseError::Unterminated)
        );
        assert!(matches!(
            parse_intent_uri("intent://x#Intent;garbage;end"),
            Err(IntentParseError::Malformed(_))
        ));
        // not valid UTF-8 once decoded
        assert!(matches!(
            parse_intent_uri("intent://x#Intent;S.v=%ff%fe;end"),
            Err(IntentParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_stray_percent_is_kept() {
        let req = parse_intent_uri("intent:#Intent;S.v=100%zz;end").unwrap();
        assert_eq!(req.extras.get("S.v").map(String::as_str), Some("100%zz"));
    }

    #[test]
    fn test_parse_share_intent_with_type() {
        let req = parse_intent_uri(
            "intent:#Intent;action=android.intent.action.SEND;type=text/plain;S.android.intent.extra.TEXT=hi;end",
        )
        .unwrap();

        assert_eq!(req.action.as_deref(), Some("android.intent.action.SEND"));
        assert_eq!(req.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(
            req.extras.get("S.android.intent.extra.TEXT").map(String::as_str),
            Some("hi")
        );
    }

    #[test]
    fn test_parse_selector_and_source_bounds() {
        let req = parse_intent_uri(
            "intent://open#Intent;scheme=https;sourceBounds=0%200%20100%2050;package=com.a;\
             SEL;category=android.intent.category.APP_BROWSER;package=com.b;end",
        )
        .unwrap();

        assert_eq!(req.target, "https://open");
        assert_eq!(req.package.as_deref(), Some("com.a"));
        assert_eq!(req.source_bounds.as_deref(), Some("0 0 100 50"));
        let selector = req.selector.expect("selector parsed");
        assert_eq!(selector.package.as_deref(), Some("com.b"));
        assert_eq!(selector.categories, vec!["android.intent.category.APP_BROWSER"]);
        assert!(req.categories.is_empty());
    }
}
