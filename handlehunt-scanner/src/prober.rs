use crate::error::Result;
use crate::site::SiteDefinition;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub const DEFAULT_USER_AGENT: &str = concat!(
    "handlehunt/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/trapdoorsec/handlehunt)"
);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a probe did not produce a definitive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub site: String,
    pub reason: String,
}

impl ProbeFailure {
    pub fn new(site: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.site, self.reason)
    }
}

impl std::error::Error for ProbeFailure {}

/// Classified result of checking one site for one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service answered 200 OK for the handle.
    Found,
    /// Any other definitive response.
    NotFound { status: u16 },
    /// The catalog marks the site invalid; no request was made.
    Skipped,
    /// Timeout, connection/TLS failure, a dropped connection or a
    /// malformed per-site URI. The site simply does not count.
    Transient(ProbeFailure),
    /// Anything unclassified. Aborts the whole scan.
    Fatal(ProbeFailure),
}

/// Issues one existence check. Implementations must not touch persistence
/// or task state.
#[async_trait]
pub trait SiteProber: Send + Sync {
    async fn probe(&self, site: &SiteDefinition, handle: &str) -> ProbeOutcome;
}

/// HEAD-request prober backed by a pooled reqwest client.
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::with_config(timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_config(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            // A redirect is a definitive "not here" for a HEAD check
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    fn classify_error(site: &SiteDefinition, url: &str, err: &reqwest::Error) -> ProbeOutcome {
        let failure = ProbeFailure::new(&site.name, format!("{}: {}", url, err));

        if err.is_timeout() || err.is_connect() || is_dropped_connection(err) {
            debug!("Error while checking site '{}' ({}): {}", site.name, url, err);
            ProbeOutcome::Transient(failure)
        } else {
            error!("Unexpected error while checking site '{}' ({}): {}", site.name, url, err);
            ProbeOutcome::Fatal(failure)
        }
    }
}

/// Walks the error chain for an I/O failure or a connection the server
/// closed mid-response. A response that is not HTTP at all does not match.
fn is_dropped_connection(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() || cause.to_string().contains("connection closed before message completed") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[async_trait]
impl SiteProber for HttpProber {
    async fn probe(&self, site: &SiteDefinition, handle: &str) -> ProbeOutcome {
        if !site.is_enabled() {
            return ProbeOutcome::Skipped;
        }

        let url = match site.probe_url(handle) {
            Ok(url) => url,
            Err(e) => {
                debug!("{}", e);
                return ProbeOutcome::Transient(ProbeFailure::new(&site.name, e.to_string()));
            }
        };

        let start = Instant::now();
        let response = match self.client.head(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Self::classify_error(site, url.as_str(), &e),
        };
        let status = response.status();

        debug!(
            "HEAD {} -> {} in {}ms",
            url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if status == StatusCode::OK {
            ProbeOutcome::Found
        } else {
            ProbeOutcome::NotFound {
                status: status.as_u16(),
            }
        }
    }
}
