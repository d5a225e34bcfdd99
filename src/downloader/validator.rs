// URL validation - structural checks independent of the target service

use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

const MIN_URL_LEN: usize = 10;
const MAX_URL_LEN: usize = 2048;
const MIN_HOST_LEN: usize = 3;

const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '|', '^', '`', '{', '}', '\\'];

lazy_static::lazy_static! {
    static ref AUTHORITY_RE: Regex = Regex::new(r"(?i)^(https?)://([^/?#]*)").unwrap();
    static ref IPV4_RE: Regex = Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap();
    static ref DOMAIN_RE: Regex = Regex::new(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$"
    ).unwrap();
}

/// Returns true when `url` looks like a downloadable http(s) link.
///
/// Every rejection is a plain `false`; reasons are only logged at debug level.
pub fn validate(url: &str) -> bool {
    let url = url.trim();
    let len = url.chars().count();

    if len < MIN_URL_LEN {
        debug!(len, "URL too short");
        return false;
    }
    if len > MAX_URL_LEN {
        debug!(len, "URL too long");
        return false;
    }

    if url.contains(FORBIDDEN_CHARS) {
        debug!("URL contains forbidden characters");
        return false;
    }

    // The grammar runs on the authority as typed. A parser would punycode
    // IDNs and reject out-of-range ports or octets before the checks below.
    let netloc = match AUTHORITY_RE.captures(url).and_then(|c| c.get(2)) {
        Some(m) => m.as_str(),
        None => {
            debug!("Not an http(s) URL with an authority");
            return false;
        }
    };

    if netloc.len() < MIN_HOST_LEN {
        debug!(netloc, "Missing or too short host");
        return false;
    }

    if netloc.contains('@') {
        debug!("Credentials in URL are not accepted");
        return false;
    }

    let host = netloc.split(':').next().unwrap_or_default();
    if !is_valid_host(host) {
        debug!(host, "Host is neither IPv4 nor a DNS name");
        return false;
    }

    true
}

fn is_valid_host(host: &str) -> bool {
    IPV4_RE.is_match(host) || DOMAIN_RE.is_match(host)
}

/// HEAD request (redirects followed); reachable means a status below 400.
///
/// Network failures are logged and reported as unreachable.
pub async fn check_url_accessibility(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).no_proxy().build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Cannot build HTTP client: {}", e);
            return false;
        }
    };

    match client.head(url).send().await {
        Ok(response) => {
            let status = response.status();
            debug!(url, status = status.as_u16(), "Accessibility check");
            status.as_u16() < 400
        }
        Err(e) => {
            warn!("URL accessibility check failed for {}: {}", url, e);
            false
        }
    }
}
