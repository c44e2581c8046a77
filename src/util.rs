/// Small shared helpers: clock, pluralization, truncation, hostname display

/// Milliseconds since the Unix epoch, in the browser's `Date.now()` domain.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

/// "1 tab", "2 tabs"
pub fn maybe_pluralize(count: usize, noun: &str, suffix: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}{}", count, noun, suffix)
    }
}

/// Truncate a string to at most `n` characters, appending an ellipsis when cut.
pub fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        let cut: String = s.chars().take(n.saturating_sub(1)).collect();
        format!("{}\u{2026}", cut)
    } else {
        s.to_string()
    }
}

/// Display form of a URL's host: hostname with a leading "www." stripped.
/// Returns `None` for URLs without a host (about:, data:, malformed input).
pub fn display_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maybe_pluralize() {
        assert_eq!(maybe_pluralize(1, "other tab", "s"), "1 other tab");
        assert_eq!(maybe_pluralize(3, "other tab", "s"), "3 other tabs");
        assert_eq!(maybe_pluralize(0, "other tab", "s"), "0 other tabs");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 14), "short");
        assert_eq!(truncate("exactly-14-ch.", 14), "exactly-14-ch.");
        assert_eq!(
            truncate("a-very-long-hostname.example.org", 14),
            "a-very-long-h\u{2026}"
        );
    }

    #[test]
    fn test_display_host() {
        assert_eq!(
            display_host("https://www.google.com/search"),
            Some("google.com".to_string())
        );
        assert_eq!(
            display_host("https://docs.example.org/page"),
            Some("docs.example.org".to_string())
        );
        assert_eq!(display_host("about:blank"), None);
        assert_eq!(display_host("not a url"), None);
    }

    #[test]
    fn test_now_ms_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 0.0);
    }
}
