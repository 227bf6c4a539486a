//! HTTP client utilities and the outbound request guard.
//!
//! Every upstream call (validation, balance, model list) goes through
//! [`SecureFetcher`], which:
//! - rejects non-HTTP(S) targets and private/loopback addresses,
//! - optionally randomizes `User-Agent` / `Accept-Language`,
//! - optionally routes through a region-pinned proxy,
//! - applies an explicit per-request timeout.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use serde_json::{Value, json};
use url::{Host, Url};

use crate::error::{KeyprobeError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails (e.g. an invalid proxy URL).
pub fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(format!("keyprobe/{}", env!("CARGO_PKG_VERSION")));

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| KeyprobeError::Config(format!("Invalid proxy URL '{proxy_url}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| KeyprobeError::Network(e.to_string()))
}

// =============================================================================
// Upstream Request
// =============================================================================

/// A fully-built upstream request, independent of any client.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

// =============================================================================
// Target Guard
// =============================================================================

/// Check that a URL is safe to call.
///
/// # Errors
///
/// Returns a reason string if the scheme is not HTTP(S), the host is missing,
/// or (unless `allow_private`) the host is a loopback/private/link-local
/// address or `localhost`.
pub fn check_target(raw: &str, allow_private: bool) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("scheme '{}' is not allowed", url.scheme()));
    }

    let host = url.host().ok_or_else(|| "URL has no host".to_string())?;
    if allow_private {
        return Ok(url);
    }

    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err("localhost is not allowed".to_string());
            }
        }
        Host::Ipv4(ip) => {
            if let Some(reason) = blocked_ipv4(ip) {
                return Err(reason.to_string());
            }
        }
        Host::Ipv6(ip) => {
            if let Some(reason) = blocked_ipv6(ip) {
                return Err(reason.to_string());
            }
        }
    }

    Ok(url)
}

fn blocked_ipv4(ip: Ipv4Addr) -> Option<&'static str> {
    let octets = ip.octets();
    if ip.is_loopback() {
        Some("loopback address")
    } else if ip.is_private() {
        Some("private address")
    } else if ip.is_link_local() {
        Some("link-local/metadata address")
    } else if ip.is_unspecified() || ip.is_broadcast() {
        Some("unroutable address")
    } else if ip.is_multicast() {
        Some("multicast address")
    } else if octets[0] == 100 && (64..=127).contains(&octets[1]) {
        Some("shared address space")
    } else if octets[0] >= 240 {
        Some("reserved address")
    } else {
        None
    }
}

fn blocked_ipv6(ip: Ipv6Addr) -> Option<&'static str> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return blocked_ipv4(mapped);
    }
    let first = ip.segments()[0];
    if ip.is_loopback() {
        Some("loopback address")
    } else if ip.is_unspecified() {
        Some("unroutable address")
    } else if ip.is_multicast() {
        Some("multicast address")
    } else if (first & 0xfe00) == 0xfc00 {
        Some("unique local address")
    } else if (first & 0xffc0) == 0xfe80 {
        Some("link-local address")
    } else {
        None
    }
}

// =============================================================================
// Header Randomizer
// =============================================================================

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "zh-CN,zh;q=0.9,en;q=0.6",
    "de-DE,de;q=0.9,en;q=0.7",
    "ja-JP,ja;q=0.9,en;q=0.6",
];

/// Picks browser-like request headers.
///
/// Owned by the [`SecureFetcher`] that uses it.
#[derive(Debug, Clone)]
pub struct HeaderRandomizer {
    user_agents: Vec<String>,
    languages: Vec<String>,
}

impl Default for HeaderRandomizer {
    fn default() -> Self {
        Self::new(
            USER_AGENTS.iter().map(ToString::to_string).collect(),
            ACCEPT_LANGUAGES.iter().map(ToString::to_string).collect(),
        )
    }
}

impl HeaderRandomizer {
    #[must_use]
    pub const fn new(user_agents: Vec<String>, languages: Vec<String>) -> Self {
        Self {
            user_agents,
            languages,
        }
    }

    /// Pick a `(user_agent, accept_language)` pair.
    #[must_use]
    pub fn pick(&self) -> (Option<&str>, Option<&str>) {
        let mut rng = rand::thread_rng();
        (
            self.user_agents.choose(&mut rng).map(String::as_str),
            self.languages.choose(&mut rng).map(String::as_str),
        )
    }
}

// =============================================================================
// Secure Fetcher
// =============================================================================

/// Construction options for [`SecureFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub allow_private_targets: bool,
    pub randomize_headers: bool,
    /// Region id -> proxy URL.
    pub regions: BTreeMap<String, String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            allow_private_targets: false,
            randomize_headers: true,
            regions: BTreeMap::new(),
        }
    }
}

/// Response from [`SecureFetcher::fetch`].
///
/// A target rejected by the guard is reported as a synthetic 400 so callers
/// interpret it like any other upstream failure.
#[derive(Debug)]
pub struct FetchResponse {
    status: StatusCode,
    body: ResponseBody,
}

#[derive(Debug)]
enum ResponseBody {
    Upstream(Response),
    Blocked(String),
}

impl FetchResponse {
    fn blocked(reason: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ResponseBody::Blocked(reason),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the request never left the process.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self.body, ResponseBody::Blocked(_))
    }

    /// Read the whole body as text.
    ///
    /// # Errors
    ///
    /// Returns a network error if the body cannot be read.
    pub async fn text(self) -> Result<String> {
        match self.body {
            ResponseBody::Upstream(response) => response
                .text()
                .await
                .map_err(|e| KeyprobeError::Network(e.to_string())),
            ResponseBody::Blocked(reason) => Ok(json!({
                "error": { "message": format!("request blocked: {reason}") }
            })
            .to_string()),
        }
    }

    /// Read a single body chunk and return its length.
    ///
    /// `Ok(None)` means the body ended without yielding any data. The
    /// connection is released when `self` is dropped.
    ///
    /// # Errors
    ///
    /// Returns a network error if reading fails.
    pub async fn first_chunk_len(&mut self) -> Result<Option<usize>> {
        match &mut self.body {
            ResponseBody::Upstream(response) => loop {
                match response.chunk().await {
                    Ok(Some(chunk)) if chunk.is_empty() => {}
                    Ok(Some(chunk)) => return Ok(Some(chunk.len())),
                    Ok(None) => return Ok(None),
                    Err(e) => return Err(KeyprobeError::Network(e.to_string())),
                }
            },
            ResponseBody::Blocked(reason) => Ok(Some(reason.len())),
        }
    }
}

/// The single outbound HTTP boundary.
#[derive(Debug)]
pub struct SecureFetcher {
    client: Client,
    region_clients: HashMap<String, Client>,
    randomizer: Option<HeaderRandomizer>,
    allow_private_targets: bool,
    timeout: Duration,
}

impl SecureFetcher {
    /// Build the fetcher and one proxied client per configured region.
    ///
    /// # Errors
    ///
    /// Returns error if a client cannot be built or a proxy URL is invalid.
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let client = build_client(options.timeout, None)?;
        let mut region_clients = HashMap::new();
        for (region, proxy) in &options.regions {
            region_clients.insert(region.clone(), build_client(options.timeout, Some(proxy))?);
        }

        Ok(Self {
            client,
            region_clients,
            randomizer: options.randomize_headers.then(HeaderRandomizer::default),
            allow_private_targets: options.allow_private_targets,
            timeout: options.timeout,
        })
    }

    /// Fetcher with default options.
    ///
    /// # Errors
    ///
    /// Returns error if client construction fails.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&FetchOptions::default())
    }

    fn client_for(&self, region: Option<&str>) -> Result<&Client> {
        match region {
            None => Ok(&self.client),
            Some(region) => self
                .region_clients
                .get(region)
                .ok_or_else(|| KeyprobeError::UnknownRegion(region.to_string())),
        }
    }

    /// Send a request.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, timeout, or an unknown region.
    /// A blocked target is not an error; it yields a 400 response.
    pub async fn fetch(
        &self,
        request: &UpstreamRequest,
        region: Option<&str>,
    ) -> Result<FetchResponse> {
        let url = match check_target(&request.url, self.allow_private_targets) {
            Ok(url) => url,
            Err(reason) => {
                tracing::warn!(url = %request.url, %reason, "Blocked upstream target");
                return Ok(FetchResponse::blocked(reason));
            }
        };

        let client = self.client_for(region)?;
        let mut builder = client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(randomizer) = &self.randomizer {
            let (user_agent, language) = randomizer.pick();
            if let Some(ua) = user_agent.filter(|_| !request.has_header("user-agent")) {
                builder = builder.header("user-agent", ua);
            }
            if let Some(lang) = language.filter(|_| !request.has_header("accept-language")) {
                builder = builder.header("accept-language", lang);
            }
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| KeyprobeError::from_reqwest(&e, self.timeout.as_secs()))?;

        Ok(FetchResponse {
            status: response.status(),
            body: ResponseBody::Upstream(response),
        })
    }

    /// Send a request and decode a JSON body, treating non-2xx as an error.
    ///
    /// # Errors
    ///
    /// Returns error on network failure, non-success status, or JSON parse failure.
    pub async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        request: &UpstreamRequest,
        region: Option<&str>,
    ) -> Result<T> {
        let response = self.fetch(request, region).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(KeyprobeError::ProviderApiError {
                provider: host_of(&request.url),
                status_code: Some(status.as_u16()),
                message: format!("HTTP {} from {}", status.as_u16(), request.url),
            });
        }

        serde_json::from_str(&text).map_err(|e| KeyprobeError::ParseResponse(e.to_string()))
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_else(|| url.to_string())
}
