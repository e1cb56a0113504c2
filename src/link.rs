//! Link detection and previews for URLs in message text.

use crate::error::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Characters that commonly trail a URL in prose but are not part of it.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ')', ']', '」', '』', '）', '。', '、'];

/// Find http(s) URLs in `text`, in order of appearance.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"https?://[^\s<>"']+"#) else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string())
        .filter(|url| url.len() > "https://".len())
        .collect()
}

/// Host of `url` without a leading `www.`, or the input if it has no host.
#[must_use]
pub fn display_domain(url: &str) -> String {
    let host = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://(?:[^@/]*@)?([^/:?#]+)")
        .ok()
        .and_then(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());

    match host {
        Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
        None => url.to_string(),
    }
}

/// Open Graph summary of a linked page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkPreview {
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
    /// Page description.
    #[serde(default)]
    pub description: Option<String>,
    /// Preview image URL.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
struct PreviewRequest<'a> {
    url: &'a str,
}

/// Client for `POST /api/ogp`.
#[derive(Debug, Clone)]
pub struct LinkPreviewClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl LinkPreviewClient {
    /// Create a client for the API at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Fetch the preview for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or a non-success
    /// status.
    pub async fn fetch(&self, url: &str) -> Result<LinkPreview> {
        debug!(%url, "fetching link preview");
        let response = self
            .client
            .post(format!("{}/api/ogp", self.base_url))
            .timeout(self.timeout)
            .json(&PreviewRequest { url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("preview endpoint returned {status}")));
        }
        Ok(response.json().await?)
    }
}
