//! HTTP directory index backend
//!
//! Scrapes the HTML listing an HTTP server generates for a directory
//! (Apache/nginx autoindex and similar). Read-only.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use tracing::debug;

use super::{BackendError, BackendResult, RootIdentity, StorageBackend};
use crate::cancel::CancelToken;
use crate::fs::Entry;
use crate::utils;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("href pattern is valid")
});

/// Backend over an HTTP server's generated directory listings
pub struct HttpIndexBackend {
    base: Url,
    client: Client,
}

impl HttpIndexBackend {
    /// Create a backend rooted at `url`. Query and fragment are dropped;
    /// credentials are kept for requests but never displayed.
    pub fn new(mut url: Url, timeout: Duration) -> BackendResult<Self> {
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Connection {
                path: url.path().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { base: url, client })
    }

    /// URL of the listing for a backend path
    fn listing_url(&self, path: &str) -> BackendResult<Url> {
        let mut url = self.base.clone();
        let dir = utils::normalize_path(path);
        let dir = if dir == "/" { dir } else { format!("{}/", dir) };
        // Paths arrive decoded; set_path leaves '%' alone.
        url.set_path(&dir.replace('%', "%25"));
        Ok(url)
    }
}

impl StorageBackend for HttpIndexBackend {
    fn root(&self) -> RootIdentity {
        let mut url = self.base.clone();
        let _ = url.set_username("");
        let _ = url.set_password(None);
        RootIdentity {
            title: url.to_string(),
            path: utils::normalize_path(url.path()),
            url,
        }
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
        if cancel.is_cancelled() {
            return Err(BackendError::cancelled(path));
        }
        let url = self.listing_url(path)?;
        debug!("http: GET {}", url.path());

        let http_err = |e: reqwest::Error| {
            if e.is_connect() || e.is_timeout() {
                BackendError::Connection {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            } else {
                BackendError::Http {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url.clone()).send().map_err(http_err)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound {
                path: path.to_string(),
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let body = response
            .error_for_status()
            .map_err(http_err)?
            .text()
            .map_err(http_err)?;

        if cancel.is_cancelled() {
            return Err(BackendError::cancelled(path));
        }
        Ok(extract_entries(&url, &body))
    }
}

/// Pull the direct children of `listing` out of an HTML index page.
fn extract_entries(listing: &Url, html: &str) -> Vec<Entry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for caps in HREF_RE.captures_iter(html) {
        let Some(href) = caps.get(1).or(caps.get(2)).or(caps.get(3)) else {
            continue;
        };
        let href = href.as_str().replace("&amp;", "&");
        // Column sort links (?C=N;O=D) and in-page anchors
        if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
            continue;
        }
        let Ok(target) = listing.join(&href) else {
            continue;
        };
        if target.origin() != listing.origin() {
            continue;
        }
        let Some(rest) = target.path().strip_prefix(listing.path()) else {
            continue;
        };
        let (name, is_dir) = match rest.strip_suffix('/') {
            Some(dir) => (dir, true),
            None => (rest, false),
        };
        // Self links and anything deeper than one level
        if name.is_empty() || name.contains('/') {
            continue;
        }
        let name = utils::percent_decode(name);
        if name == "." || name == ".." || name.contains('/') {
            continue;
        }
        if seen.insert(name.clone()) {
            entries.push(Entry::new(name, is_dir));
        }
    }

    entries
}
