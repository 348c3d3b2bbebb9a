//! Lightweight client metadata extraction from request headers.
//!
//! Deliberately a substring scan rather than a full user-agent grammar; it
//! only needs to fill the browser/os/device columns on a session row.

use axum::http::HeaderMap;

use crate::models::session::DeviceType;

#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
}

impl DeviceMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_agent = extract_user_agent(headers);
        let (browser, os, device_type) = match user_agent.as_deref() {
            Some(ua) => parse_user_agent(ua),
            None => (None, None, DeviceType::Unknown),
        };
        Self {
            ip_address: extract_ip(headers),
            user_agent,
            browser,
            os,
            device_type,
        }
    }
}

/// Client IP from `x-forwarded-for` (first hop) or `x-real-ip`.
pub fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Best-effort (browser, os, device) classification.
pub fn parse_user_agent(ua: &str) -> (Option<String>, Option<String>, DeviceType) {
    let lower = ua.to_lowercase();

    // Order matters: Edge and Opera embed "chrome", Chrome embeds "safari".
    let browser = if lower.contains("edg/") || lower.contains("edge") {
        Some("Edge")
    } else if lower.contains("opr/") || lower.contains("opera") {
        Some("Opera")
    } else if lower.contains("firefox") {
        Some("Firefox")
    } else if lower.contains("chrome") {
        Some("Chrome")
    } else if lower.contains("safari") {
        Some("Safari")
    } else {
        None
    };

    let os = if lower.contains("windows") {
        Some("Windows")
    } else if lower.contains("android") {
        Some("Android")
    } else if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ios") {
        Some("iOS")
    } else if lower.contains("mac os") || lower.contains("macintosh") {
        Some("macOS")
    } else if lower.contains("linux") {
        Some("Linux")
    } else {
        None
    };

    let device_type = if lower.contains("ipad") || lower.contains("tablet") {
        DeviceType::Tablet
    } else if lower.contains("mobile") || lower.contains("iphone") || lower.contains("android") {
        DeviceType::Mobile
    } else if browser.is_some() || os.is_some() {
        DeviceType::Desktop
    } else {
        DeviceType::Unknown
    };

    (
        browser.map(str::to_string),
        os.map(str::to_string),
        device_type,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn chrome_on_windows_is_desktop() {
        let (browser, os, device) = parse_user_agent(CHROME_DESKTOP);
        assert_eq!(browser.as_deref(), Some("Chrome"));
        assert_eq!(os.as_deref(), Some("Windows"));
        assert_eq!(device, DeviceType::Desktop);
    }

    #[test]
    fn safari_on_iphone_is_mobile() {
        let (browser, os, device) = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(browser.as_deref(), Some("Safari"));
        assert_eq!(os.as_deref(), Some("iOS"));
        assert_eq!(device, DeviceType::Mobile);
    }

    #[test]
    fn edge_is_not_misread_as_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
        let (browser, _, _) = parse_user_agent(ua);
        assert_eq!(browser.as_deref(), Some("Edge"));
    }

    #[test]
    fn ipad_is_tablet() {
        let ua = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1";
        let (_, _, device) = parse_user_agent(ua);
        assert_eq!(device, DeviceType::Tablet);
    }

    #[test]
    fn unrecognized_agent_is_unknown() {
        let (browser, os, device) = parse_user_agent("curl/8.4.0");
        assert!(browser.is_none());
        assert!(os.is_none());
        assert_eq!(device, DeviceType::Unknown);
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(extract_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_used_when_no_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(extract_ip(&headers).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn metadata_from_headers_fills_all_fields() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/121.0",
            ),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let metadata = DeviceMetadata::from_headers(&headers);
        assert_eq!(metadata.browser.as_deref(), Some("Firefox"));
        assert_eq!(metadata.os.as_deref(), Some("Linux"));
        assert_eq!(metadata.device_type, DeviceType::Desktop);
        assert_eq!(metadata.ip_address.as_deref(), Some("198.51.100.4"));
    }
}
