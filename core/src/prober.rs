//! # Bounded Prober
//!
//! One reachability attempt per call. The attempt walks the target's candidate
//! URLs in order and stops at the first one that answers with any HTTP status.
//!
//! Two caps apply. Each request carries its own timeout, and the whole walk
//! runs under a wall-clock `max_duration` that cuts it off even when the
//! socket is still making progress. Certificate problems are not failures:
//! the client accepts any certificate and host name.

use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url, redirect};
use sitewatch_common::model::{ProbeAttempt, ProbeErrorKind, Target};
use tracing::{debug, trace};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAX_REDIRECTS: usize = 10;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Makes a single bounded attempt. Never fails: every problem is folded
    /// into an unsuccessful [`ProbeAttempt`].
    async fn probe(&self, target: &Target, timeout: Duration, max_duration: Duration) -> ProbeAttempt;
}

/// `reqwest`-backed prober with a browser-like identity.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    async fn walk_candidates(&self, target: &Target, request_timeout: Duration) -> Outcome {
        let mut first_error: Option<(ProbeErrorKind, String)> = None;
        let mut dns_error: Option<(ProbeErrorKind, String)> = None;
        let mut tls_failed = false;

        for url in target.candidate_urls() {
            trace!(%url, "trying candidate");
            match self.client.get(&url).timeout(request_timeout).send().await {
                Ok(response) => {
                    let final_url = response.url().clone();
                    return Outcome::Reached {
                        status: response.status().as_u16(),
                        redirect_host: redirect_host(&url, &final_url),
                        final_url: final_url.to_string(),
                        tls_recovered: tls_failed,
                    };
                }
                Err(e) => {
                    let kind = classify_error(&e);
                    let message = error_chain(&e);
                    debug!(%url, %kind, error = %message, "candidate failed");

                    tls_failed |= kind == ProbeErrorKind::Tls;
                    // DNS misses on `www.` variants are expected noise, so any
                    // other failure is the more useful one to report.
                    if kind == ProbeErrorKind::Dns {
                        dns_error.get_or_insert((kind, message));
                    } else {
                        first_error.get_or_insert((kind, message));
                    }
                }
            }
        }

        let (kind, message) = first_error
            .or(dns_error)
            .unwrap_or((ProbeErrorKind::Other, "no candidate urls".to_string()));
        Outcome::Failed { kind, message }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target, timeout: Duration, max_duration: Duration) -> ProbeAttempt {
        let started_at = Utc::now();
        let clock = Instant::now();

        if !target.is_valid() {
            return ProbeAttempt::failed(
                target.url(),
                started_at,
                clock.elapsed(),
                ProbeErrorKind::InvalidTarget,
                "empty target",
            );
        }

        let request_timeout = timeout.min(max_duration);
        match tokio::time::timeout(max_duration, self.walk_candidates(target, request_timeout)).await {
            Ok(outcome) => outcome.into_attempt(target.url(), started_at, clock.elapsed()),
            Err(_) => ProbeAttempt::failed(
                target.url(),
                started_at,
                clock.elapsed(),
                ProbeErrorKind::Timeout,
                format!("exceeded max duration of {:.1}s", max_duration.as_secs_f64()),
            ),
        }
    }
}

enum Outcome {
    Reached {
        status: u16,
        final_url: String,
        redirect_host: Option<String>,
        tls_recovered: bool,
    },
    Failed {
        kind: ProbeErrorKind,
        message: String,
    },
}

impl Outcome {
    fn into_attempt(self, target: &str, started_at: DateTime<Utc>, elapsed: Duration) -> ProbeAttempt {
        match self {
            Outcome::Reached {
                status,
                final_url,
                redirect_host,
                tls_recovered,
            } => {
                let mut attempt = ProbeAttempt::reachable(target, started_at, elapsed, status, final_url);
                attempt.redirect_host = redirect_host;
                if tls_recovered {
                    attempt.error_kind = Some(ProbeErrorKind::TlsRecovered);
                    attempt.error = Some("secure candidate failed, plain candidate answered".to_string());
                }
                attempt
            }
            Outcome::Failed { kind, message } => ProbeAttempt::failed(target, started_at, elapsed, kind, message),
        }
    }
}

/// Host the request ended up on, when a redirect left the probed site.
///
/// A `www.` prefix on either side does not count as leaving.
fn redirect_host(requested: &str, landed: &Url) -> Option<String> {
    let requested = Url::parse(requested).ok()?;
    let from = requested.host_str()?;
    let to = landed.host_str()?;

    let strip = |h: &str| h.strip_prefix("www.").unwrap_or(h).to_ascii_lowercase();
    (strip(from) != strip(to)).then(|| to.to_string())
}

fn classify_error(e: &reqwest::Error) -> ProbeErrorKind {
    if e.is_timeout() {
        return ProbeErrorKind::Timeout;
    }

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return ProbeErrorKind::ConnectionRefused,
                io::ErrorKind::TimedOut => return ProbeErrorKind::Timeout,
                // TLS streams surface handshake failures as invalid data.
                io::ErrorKind::InvalidData => return ProbeErrorKind::Tls,
                _ => {}
            }
        }
        source = err.source();
    }

    let text = error_chain(e).to_ascii_lowercase();
    if text.contains("dns error") || text.contains("failed to lookup address") || text.contains("name or service not known") {
        ProbeErrorKind::Dns
    } else if ["certificate", "tls", "ssl", "handshake", "corrupt message"]
        .iter()
        .any(|needle| text.contains(needle))
    {
        ProbeErrorKind::Tls
    } else if text.contains("connection refused") {
        ProbeErrorKind::ConnectionRefused
    } else {
        ProbeErrorKind::Other
    }
}

/// `reqwest` keeps the useful part of an error in its sources.
fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
