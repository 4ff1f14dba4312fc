//! # Probe Target Model
//!
//! A target is a site identified by its normalized URL. The raw text from the
//! target list is reduced to a lowercase host (plus any path), without scheme
//! or `www.` prefix, so `https://WWW.Example.com/` and `example.com` are the
//! same target.

use std::net::IpAddr;

use serde::Serialize;

use crate::model::verdict::Verdict;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    url: String,
    /// Verdict persisted by an earlier run. Marked targets are never probed.
    pub mark: Option<Verdict>,
}

impl Target {
    pub fn new(raw: &str) -> Self {
        Self {
            url: normalize(raw),
            mark: None,
        }
    }

    pub fn with_mark(raw: &str, mark: Option<Verdict>) -> Self {
        Self {
            url: normalize(raw),
            mark,
        }
    }

    /// The normalized identity of this target.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_marked(&self) -> bool {
        self.mark.is_some()
    }

    /// An empty normalized URL cannot be probed.
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty()
    }

    /// URLs to try, in order, until one of them answers.
    ///
    /// Secure before plain, bare host before the `www.` variant. IP literals
    /// get no `www.` variants.
    pub fn candidate_urls(&self) -> Vec<String> {
        if !self.is_valid() {
            return Vec::new();
        }

        let mut urls = vec![format!("https://{}", self.url), format!("http://{}", self.url)];
        if !is_ip_host(&self.url) {
            urls.push(format!("https://www.{}", self.url));
            urls.push(format!("http://www.{}", self.url));
        }
        urls
    }
}

/// Reduces a raw list entry to its target identity.
pub fn normalize(raw: &str) -> String {
    let mut rest = raw.trim();

    for scheme in ["https://", "http://"] {
        if let Some(stripped) = strip_prefix_ignore_case(rest, scheme) {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = strip_prefix_ignore_case(rest, "www.") {
        rest = stripped;
    }

    let (host, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let normalized = format!("{}{}", host.to_ascii_lowercase(), path);
    normalized.trim_end_matches('/').to_string()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

fn is_ip_host(url: &str) -> bool {
    let authority = url.split('/').next().unwrap_or(url);
    if authority.parse::<IpAddr>().is_ok() {
        return true;
    }
    authority
        .rsplit_once(':')
        .is_some_and(|(host, _port)| host.parse::<IpAddr>().is_ok())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
