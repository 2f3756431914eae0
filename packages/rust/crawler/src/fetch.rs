//! Single-page fetching: target guard, HTTP GET, document extraction.

use std::net::IpAddr;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use fieldmap_mapping::CrawlOutcome;
use fieldmap_parser::extract_html_document;
use fieldmap_shared::{FetchCategory, FieldMapError, IndexDocument, Result};

/// Field holding the final URL of a fetched page.
pub const FIELD_URL: &str = "url";
/// Field holding the SHA-256 of the response body.
pub const FIELD_CONTENT_HASH: &str = "content_hash";
/// Field holding the RFC 3339 fetch time.
pub const FIELD_FETCHED_AT: &str = "fetched_at";

/// Fetch `url` and turn the response into an outcome. Never fails: every
/// problem ends up in [`CrawlOutcome::error`].
#[instrument(skip_all, fields(fetch_id = %id, url = %url, category = %category))]
pub(crate) async fn fetch_outcome(
    client: &Client,
    url: &Url,
    category: FetchCategory,
    allow_private_hosts: bool,
    id: Uuid,
) -> CrawlOutcome {
    let mut outcome = CrawlOutcome {
        url: url.clone(),
        category,
        status_code: None,
        document: None,
        error: None,
    };

    if let Err(e) = check_target(url, allow_private_hosts) {
        warn!(error = %e, "fetch refused");
        outcome.error = Some(e.to_string());
        return outcome;
    }

    match fetch_document(client, url, &mut outcome.status_code).await {
        Ok(document) => {
            debug!(status = ?outcome.status_code, fields = document.len(), "page fetched");
            outcome.document = Some(document);
        }
        Err(e) => {
            warn!(status = ?outcome.status_code, error = %e, "fetch failed");
            outcome.error = Some(e.to_string());
        }
    }

    outcome
}

async fn fetch_document(
    client: &Client,
    url: &Url,
    status_code: &mut Option<u16>,
) -> Result<IndexDocument> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| FieldMapError::Network(format!("{url}: {}", error_chain(&e))))?;

    let status = response.status();
    *status_code = Some(status.as_u16());
    if !status.is_success() {
        return Err(FieldMapError::Network(format!("{url}: HTTP {status}")));
    }

    let final_url = response.url().clone();
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|ct| ct.contains("html"));

    let body = response
        .text()
        .await
        .map_err(|e| FieldMapError::Network(format!("{url}: body read failed: {e}")))?;

    let mut document = if is_html {
        extract_html_document(&body)?
    } else {
        let mut plain = IndexDocument::new();
        let text = body.trim();
        if !text.is_empty() {
            plain.add("content", text);
        }
        plain
    };

    document.add(FIELD_URL, final_url.as_str());
    document.add(FIELD_CONTENT_HASH, compute_hash(&body));
    document.add(FIELD_FETCHED_AT, Utc::now().to_rfc3339());
    Ok(document)
}

/// Render an error with its sources; redirect refusals live in the source.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

// ---------------------------------------------------------------------------
// Target guard
// ---------------------------------------------------------------------------

/// Follow at most `max_redirects` hops, each of which must pass [`check_target`].
pub(crate) fn redirect_policy(max_redirects: usize, allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            let limit = format!("too many redirects (limit {max_redirects})");
            attempt.error(FieldMapError::Crawl(limit))
        } else if let Err(e) = check_target(attempt.url(), allow_private_hosts) {
            warn!(error = %e, "redirect refused");
            attempt.error(e)
        } else {
            attempt.follow()
        }
    })
}

/// Refuse non-HTTP schemes always, and private hosts unless allowed.
pub(crate) fn check_target(url: &Url, allow_private_hosts: bool) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FieldMapError::Crawl(format!(
                "{url}: unsupported scheme {other:?}"
            )));
        }
    }

    if !allow_private_hosts && is_private_target(url) {
        return Err(FieldMapError::Crawl(format!(
            "{url}: blocked private or local host"
        )));
    }

    Ok(())
}

/// Whether an http(s) URL points at a loopback, private or local host.
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10
                || (a == 100 && (b & 0xC0) == 64)
                // 192.0.0.0/24
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Compute SHA-256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
