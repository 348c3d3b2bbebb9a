//! Optional IP geolocation enrichment for session rows.
//!
//! Lookups are best effort with a short timeout; a failed lookup just leaves
//! the country and city columns empty. Two public providers are tried in
//! order.

use serde::Deserialize;
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    country: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    city: Option<String>,
}

/// Resolves country and city for a public address. Private and loopback
/// addresses are skipped without a network call.
pub async fn lookup(ip: &str) -> Option<GeoLocation> {
    if is_private_or_local(ip) {
        return None;
    }

    let client = reqwest::Client::builder()
        .timeout(LOOKUP_TIMEOUT)
        .build()
        .ok()?;

    if let Some(location) = lookup_ip_api(&client, ip).await {
        return Some(location);
    }
    lookup_ipinfo(&client, ip).await
}

async fn lookup_ip_api(client: &reqwest::Client, ip: &str) -> Option<GeoLocation> {
    let url = format!("http://ip-api.com/json/{}?fields=status,country,city", ip);
    let response: IpApiResponse = client.get(&url).send().await.ok()?.json().await.ok()?;
    if response.status.as_deref() != Some("success") {
        return None;
    }
    Some(GeoLocation {
        country: response.country,
        city: response.city,
    })
}

async fn lookup_ipinfo(client: &reqwest::Client, ip: &str) -> Option<GeoLocation> {
    let url = format!("https://ipinfo.io/{}/json", ip);
    let response: IpInfoResponse = client.get(&url).send().await.ok()?.json().await.ok()?;
    if response.country.is_none() && response.city.is_none() {
        return None;
    }
    Some(GeoLocation {
        country: response.country,
        city: response.city,
    })
}

fn is_private_or_local(ip: &str) -> bool {
    match ip.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(v4)) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(std::net::IpAddr::V6(v6)) => v6.is_loopback() || v6.is_unspecified(),
        // Not an IP literal at all; don't waste a lookup on it.
        Err(_) => true,
    }
}
