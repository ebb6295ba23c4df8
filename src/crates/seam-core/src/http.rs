//! Constrained outbound HTTP
//!
//! Every outbound request an executor makes flows through [`HttpFacade`]:
//!
//! - **Address guard**: the URL's scheme must be http/https and, after DNS
//!   resolution, none of the resolved addresses may fall in the blocked
//!   space (RFC1918, loopback, link-local, multicast, broadcast, cloud
//!   metadata, plus any configured CIDRs). An allow-list of hostnames, when
//!   set, takes precedence: only listed hosts are fetched.
//! - **Redirects** are followed manually so that every hop re-runs the
//!   address guard.
//! - **Body caps**: responses are read chunkwise against the configured
//!   byte limit.
//! - **Counters**: each request (including each redirect hop) counts
//!   against the per-execution `http_calls` ceiling. A request the guard
//!   rejects is never counted.

use seam_node::config::EngineConfig;
use seam_node::context::ResourceCounters;
use seam_node::error::{FlowError, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio_util::sync::CancellationToken;
use url::Url;

/// An outbound request, after template interpolation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// The structured response an HTTP node reports.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the response declares a JSON media type, the raw
    /// text otherwise.
    pub body: Value,
}

// ---------------------------------------------------------------------------
// CIDR ranges
// ---------------------------------------------------------------------------

/// A parsed CIDR range, v4 or v6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `"10.0.0.0/8"` notation.
    pub fn parse(text: &str) -> Result<Self> {
        let (addr, prefix) = text.split_once('/').ok_or_else(|| {
            FlowError::Schema(format!("invalid CIDR '{text}': missing '/'"))
        })?;
        let network: IpAddr = addr
            .parse()
            .map_err(|_| FlowError::Schema(format!("invalid CIDR '{text}': bad address")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| FlowError::Schema(format!("invalid CIDR '{text}': bad prefix")))?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(FlowError::Schema(format!(
                "invalid CIDR '{text}': prefix exceeds {max}"
            )));
        }
        Ok(Self { network, prefix })
    }

    /// Whether `ip` falls inside this range. Addresses of the other family
    /// never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_v4(self.prefix);
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_v6(self.prefix);
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

// ---------------------------------------------------------------------------
// address guard
// ---------------------------------------------------------------------------

/// URL validation performed before every request and on every redirect hop.
#[derive(Debug, Clone, Default)]
pub struct SsrfGuard {
    allow_hosts: Vec<String>,
    extra_blocks: Vec<Cidr>,
}

impl SsrfGuard {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let extra_blocks = config
            .http_block_cidrs
            .iter()
            .map(|text| Cidr::parse(text))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            allow_hosts: config.http_allow_hosts.clone(),
            extra_blocks,
        })
    }

    /// Validate one URL: scheme, allow-list, then post-resolution address
    /// classification.
    pub async fn validate(&self, url: &Url) -> Result<()> {
        let blocked = |reason: String| FlowError::SsrfBlocked {
            url: url.to_string(),
            reason,
        };

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(blocked(format!("scheme '{scheme}' is not allowed"))),
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| blocked("URL has no host".into()))?;

        // allow-list takes precedence: when set, only listed hosts pass
        if !self.allow_hosts.is_empty() {
            if self.host_allowed(host) {
                return Ok(());
            }
            return Err(blocked(format!("host '{host}' is not in the allow-list")));
        }

        if host.eq_ignore_ascii_case("metadata.google.internal") {
            return Err(blocked("cloud metadata host".into()));
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let ips: Vec<IpAddr> = match url.host() {
            Some(url::Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(url::Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(url::Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| blocked(format!("failed to resolve '{domain}': {e}")))?
                .map(|addr| addr.ip())
                .collect(),
            None => return Err(blocked("URL has no host".into())),
        };
        if ips.is_empty() {
            return Err(blocked(format!("host '{host}' resolved to no addresses")));
        }

        for ip in ips {
            if let Some(reason) = blocked_address(ip) {
                return Err(blocked(format!("address {ip} is {reason}")));
            }
            if self.extra_blocks.iter().any(|cidr| cidr.contains(ip)) {
                return Err(blocked(format!("address {ip} is in a blocked range")));
            }
        }
        Ok(())
    }

    fn host_allowed(&self, host: &str) -> bool {
        self.allow_hosts.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host.eq_ignore_ascii_case(suffix)
                    || host
                        .to_ascii_lowercase()
                        .ends_with(&format!(".{}", suffix.to_ascii_lowercase()))
            } else {
                host.eq_ignore_ascii_case(pattern)
            }
        })
    }
}

/// Classify an address against the built-in block list. Returns the rule
/// that matched.
fn blocked_address(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => blocked_v4(v4),
        IpAddr::V6(v6) => blocked_v6(v6),
    }
}

fn blocked_v4(ip: Ipv4Addr) -> Option<&'static str> {
    if ip.octets() == [169, 254, 169, 254] {
        return Some("a cloud metadata endpoint");
    }
    if ip.is_private() {
        return Some("a private (RFC1918) address");
    }
    if ip.is_loopback() {
        return Some("a loopback address");
    }
    if ip.is_link_local() {
        return Some("a link-local address");
    }
    if ip.is_broadcast() {
        return Some("the broadcast address");
    }
    if ip.is_multicast() {
        return Some("a multicast address");
    }
    if ip.is_unspecified() {
        return Some("the unspecified address");
    }
    None
}

fn blocked_v6(ip: Ipv6Addr) -> Option<&'static str> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return blocked_v4(mapped);
    }
    if ip.is_loopback() {
        return Some("a loopback address");
    }
    if ip.is_multicast() {
        return Some("a multicast address");
    }
    if ip.is_unspecified() {
        return Some("the unspecified address");
    }
    // fe80::/10 link-local
    if (ip.segments()[0] & 0xffc0) == 0xfe80 {
        return Some("a link-local address");
    }
    // fc00::/7 unique-local
    if (ip.segments()[0] & 0xfe00) == 0xfc00 {
        return Some("a unique-local address");
    }
    None
}

// ---------------------------------------------------------------------------
// facade
// ---------------------------------------------------------------------------

/// The outbound HTTP client every executor shares.
#[derive(Debug)]
pub struct HttpFacade {
    client: reqwest::Client,
    guard: SsrfGuard,
    max_response_size: u64,
    max_redirects: u32,
    max_http_calls: u64,
}

impl HttpFacade {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.http_timeout_connect)
            .read_timeout(config.http_timeout_read)
            .timeout(config.http_timeout_overall)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FlowError::HttpTransport(e.to_string()))?;
        Ok(Self {
            client,
            guard: SsrfGuard::from_config(config)?,
            max_response_size: config.max_response_size,
            max_redirects: config.http_max_redirects,
            max_http_calls: config.max_http_calls,
        })
    }

    /// Perform one request, following redirects up to the hop limit with
    /// re-validation at every hop.
    pub async fn fetch(
        &self,
        request: &HttpRequest,
        counters: &ResourceCounters,
        token: &CancellationToken,
    ) -> Result<HttpResponse> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| FlowError::HttpTransport(format!("invalid url '{}': {e}", request.url)))?;
        let mut method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FlowError::HttpTransport(format!("invalid method '{}'", request.method)))?;
        let mut body = request.body.clone();
        let mut hops = 0u32;

        loop {
            // the guard runs before the counter so a blocked request is
            // never charged
            self.guard.validate(&url).await?;
            let calls = counters.record_http_call();
            if calls > self.max_http_calls {
                return Err(FlowError::QuotaExceeded {
                    resource: "http_calls".into(),
                    limit: self.max_http_calls,
                });
            }

            let mut builder = self.client.request(method.clone(), url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &body {
                builder = match body {
                    Value::String(text) => builder.body(text.clone()),
                    other => builder.json(other),
                };
            }

            tracing::debug!(url = %url, method = %method, hop = hops, "outbound request");
            let response = tokio::select! {
                _ = token.cancelled() => {
                    return Err(FlowError::Cancelled {
                        reason: "cancelled during outbound request".into(),
                    })
                }
                sent = builder.send() => {
                    sent.map_err(|e| FlowError::HttpTransport(e.to_string()))?
                }
            };

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    hops += 1;
                    if hops > self.max_redirects {
                        return Err(FlowError::HttpTransport(format!(
                            "exceeded {} redirects",
                            self.max_redirects
                        )));
                    }
                    let target = location
                        .to_str()
                        .map_err(|_| FlowError::HttpTransport("unreadable redirect target".into()))?;
                    url = url
                        .join(target)
                        .map_err(|e| FlowError::HttpTransport(format!("bad redirect target: {e}")))?;
                    // 303 always demotes to GET; 301/302 conventionally do
                    // for non-GET requests
                    if status == StatusCode::SEE_OTHER
                        || ((status == StatusCode::MOVED_PERMANENTLY
                            || status == StatusCode::FOUND)
                            && method != Method::GET)
                    {
                        method = Method::GET;
                        body = None;
                    }
                    continue;
                }
            }

            return self.read_response(response, token).await;
        }
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
        token: &CancellationToken,
    ) -> Result<HttpResponse> {
        let status = response.status().as_u16();

        if let Some(declared) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            ensure_within_cap(declared, self.max_response_size)?;
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("json"));

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.as_str().to_string(), text.to_string());
            }
        }

        let bytes = read_capped(response, self.max_response_size, token).await?;
        let body = if is_json {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Accumulated `total` bytes stay within `cap`; exactly at the cap is
/// fine, one byte over fails.
fn ensure_within_cap(total: u64, cap: u64) -> Result<()> {
    if total > cap {
        return Err(FlowError::ResponseTooLarge { limit: cap });
    }
    Ok(())
}

async fn read_capped(
    mut response: reqwest::Response,
    cap: u64,
    token: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => {
                return Err(FlowError::Cancelled {
                    reason: "cancelled while reading response body".into(),
                })
            }
            chunk = response.chunk() => {
                chunk.map_err(|e| FlowError::HttpTransport(e.to_string()))?
            }
        };
        match chunk {
            Some(bytes) => {
                ensure_within_cap(buf.len() as u64 + bytes.len() as u64, cap)?;
                buf.extend_from_slice(&bytes);
            }
            None => return Ok(buf),
        }
    }
}
