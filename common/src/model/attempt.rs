use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a probe failed, or how it recovered. Used for observability only; the
/// verdict depends on reachability and resource growth alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    Timeout,
    ConnectionRefused,
    Dns,
    Tls,
    /// A secure candidate failed its handshake and a later candidate answered.
    TlsRecovered,
    InvalidTarget,
    Other,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::ConnectionRefused => "connection refused",
            ProbeErrorKind::Dns => "dns failure",
            ProbeErrorKind::Tls => "tls error",
            ProbeErrorKind::TlsRecovered => "tls error (recovered)",
            ProbeErrorKind::InvalidTarget => "invalid target",
            ProbeErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Outcome of one bounded reachability attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub success: bool,
    pub status: Option<u16>,
    /// URL that finally answered, after redirects.
    pub final_url: Option<String>,
    /// Host the target redirected to, when it differs from the probed host.
    pub redirect_host: Option<String>,
    pub error_kind: Option<ProbeErrorKind>,
    pub error: Option<String>,
}

impl ProbeAttempt {
    pub fn reachable(
        target: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        status: u16,
        final_url: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            started_at,
            elapsed,
            success: true,
            status: Some(status),
            final_url: Some(final_url.into()),
            redirect_host: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(
        target: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        kind: ProbeErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            started_at,
            elapsed,
            success: false,
            status: None,
            final_url: None,
            redirect_host: None,
            error_kind: Some(kind),
            error: Some(message.into()),
        }
    }
}
