//! Small utility helpers shared across the crate.

use std::env;

/// Return the first non-empty environment variable from `keys`, or `None`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Normalise a URL by prepending `http://` or `https://` when the scheme is missing.
pub fn normalize_url(raw: &str) -> String {
    if raw.contains("://") {
        return raw.to_string();
    }
    let scheme = if raw.starts_with("localhost") || raw.starts_with("127.") || raw.contains(":80") {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{raw}")
}

/// Replace `{{char}}` and `{{user}}` macros in `text`.
pub fn substitute_params(text: &str, char_name: &str, user_name: &str) -> String {
    text.replace("{{char}}", char_name)
        .replace("{{user}}", user_name)
}

/// Render a remaining duration in seconds as `1h02m`, `3m05s` or `42s`.
pub fn format_countdown(secs: i64) -> String {
    let secs = secs.max(0);
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_keeps_explicit_scheme() {
        assert_eq!(normalize_url("https://x.dev"), "https://x.dev");
        assert_eq!(normalize_url("localhost:8765"), "http://localhost:8765");
        assert_eq!(normalize_url("timers.example.com"), "https://timers.example.com");
    }

    #[test]
    fn substitute_params_replaces_both_macros() {
        let out = substitute_params("{{char}} waves at {{user}}, {{user}}!", "Ava", "Sam");
        assert_eq!(out, "Ava waves at Sam, Sam!");
    }

    #[test]
    fn countdown_formats() {
        assert_eq!(format_countdown(42), "42s");
        assert_eq!(format_countdown(185), "3m05s");
        assert_eq!(format_countdown(3720), "1h02m");
        assert_eq!(format_countdown(-3), "0s");
    }
}
