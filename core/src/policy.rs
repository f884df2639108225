//! Destination policy: decides whether a URL may be fetched.
//!
//! # Design
//! `SsrfValidator` parses the URL, resolves its host and rejects the request
//! if any resolved address falls in a range that reaches internal
//! infrastructure. Every check resolves afresh; nothing is cached.
//!
//! An allowed verdict carries the addresses that were checked. The executor
//! pins the connection to exactly those addresses, so a DNS answer that
//! changes between the check and the connect cannot steer the request
//! elsewhere. Redirect targets go through the same policy before they are
//! followed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::{Host, Url};

/// How long a hostname lookup may take before the destination is denied.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A destination that passed the policy, with the addresses it was checked
/// against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub addrs: Vec<SocketAddr>,
}

impl Destination {
    /// True when the URL named an address directly, so there is nothing to pin.
    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationVerdict {
    Allowed(Destination),
    /// The reason is for logs only and must not reach the caller.
    Denied(String),
}

impl DestinationVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DestinationVerdict::Allowed(_))
    }
}

/// Decides whether the forwarder may contact a URL.
#[async_trait]
pub trait DestinationPolicy: Send + Sync {
    async fn check(&self, url: &Url) -> DestinationVerdict;
}

/// Hostname resolution seam.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolves through the operating system's resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// SSRF policy: only http(s) URLs whose host resolves exclusively to public
/// addresses are allowed.
#[derive(Clone)]
pub struct SsrfValidator {
    resolver: Arc<dyn Resolver>,
    resolve_timeout: Duration,
}

impl Default for SsrfValidator {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl SsrfValidator {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Parse and check a raw URL string.
    pub async fn validate(&self, raw: &str) -> DestinationVerdict {
        match Url::parse(raw) {
            Ok(url) => self.check(&url).await,
            Err(e) => DestinationVerdict::Denied(format!("unparseable URL: {e}")),
        }
    }

    async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, String> {
        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(host, port)).await {
            Ok(Ok(addrs)) if addrs.is_empty() => Err(format!("{host} has no addresses")),
            Ok(Ok(addrs)) => Ok(addrs),
            Ok(Err(e)) => Err(format!("cannot resolve {host}: {e}")),
            Err(_) => Err(format!("resolving {host} timed out")),
        }
    }
}

#[async_trait]
impl DestinationPolicy for SsrfValidator {
    async fn check(&self, url: &Url) -> DestinationVerdict {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return DestinationVerdict::Denied(format!("scheme {scheme} is not allowed"));
        }
        let port = url.port_or_known_default().unwrap_or(80);

        let (host, addrs) = match url.host() {
            None => return DestinationVerdict::Denied("URL has no host".to_string()),
            Some(Host::Ipv4(ip)) => (ip.to_string(), vec![SocketAddr::new(ip.into(), port)]),
            Some(Host::Ipv6(ip)) => (ip.to_string(), vec![SocketAddr::new(ip.into(), port)]),
            Some(Host::Domain(domain)) => match self.lookup(domain, port).await {
                Ok(addrs) => (domain.to_string(), addrs),
                Err(reason) => return DestinationVerdict::Denied(reason),
            },
        };

        for addr in &addrs {
            if let Some(class) = forbidden_class(addr.ip()) {
                debug!(host = %host, ip = %addr.ip(), class, "destination denied");
                return DestinationVerdict::Denied(format!(
                    "{host} resolves to {class} address {}",
                    addr.ip()
                ));
            }
        }

        debug!(host = %host, addrs = addrs.len(), "destination allowed");
        DestinationVerdict::Allowed(Destination { host, addrs })
    }
}

/// Name of the non-public range `ip` belongs to, or `None` for a public
/// address.
pub fn forbidden_class(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => forbidden_v4(v4),
        IpAddr::V6(v6) => forbidden_v6(v6),
    }
}

fn forbidden_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let [a, b, c, _] = ip.octets();
    if a == 0 {
        Some("unspecified")
    } else if ip.is_loopback() {
        Some("loopback")
    } else if ip.is_private() {
        Some("private")
    } else if ip.is_link_local() {
        Some("link-local")
    } else if ip.is_multicast() {
        Some("multicast")
    } else if ip.is_broadcast() {
        Some("broadcast")
    } else if a == 100 && (b & 0xc0) == 64 {
        Some("shared")
    } else if ip.is_documentation() {
        Some("documentation")
    } else if a == 198 && (b & 0xfe) == 18 {
        Some("benchmarking")
    } else if a == 192 && b == 0 && c == 0 {
        Some("reserved")
    } else if a >= 240 {
        Some("reserved")
    } else {
        None
    }
}

fn forbidden_v6(ip: Ipv6Addr) -> Option<&'static str> {
    let seg = ip.segments();
    if ip.is_unspecified() {
        return Some("unspecified");
    }
    if ip.is_loopback() {
        return Some("loopback");
    }
    // ::ffff:a.b.c.d and the deprecated ::a.b.c.d embed an IPv4 address.
    if seg[..5].iter().all(|s| *s == 0) && (seg[5] == 0 || seg[5] == 0xffff) {
        let embedded = Ipv4Addr::new(
            (seg[6] >> 8) as u8,
            seg[6] as u8,
            (seg[7] >> 8) as u8,
            seg[7] as u8,
        );
        return forbidden_v4(embedded);
    }
    // NAT64 well-known prefix 64:ff9b::/96.
    if seg[0] == 0x64 && seg[1] == 0xff9b && seg[2..6].iter().all(|s| *s == 0) {
        let embedded = Ipv4Addr::new(
            (seg[6] >> 8) as u8,
            seg[6] as u8,
            (seg[7] >> 8) as u8,
            seg[7] as u8,
        );
        return forbidden_v4(embedded);
    }
    if ip.is_multicast() {
        Some("multicast")
    } else if (seg[0] & 0xffc0) == 0xfe80 {
        Some("link-local")
    } else if (seg[0] & 0xffc0) == 0xfec0 {
        Some("site-local")
    } else if (seg[0] & 0xfe00) == 0xfc00 {
        Some("private")
    } else if seg[0] == 0x2001 && seg[1] == 0x0db8 {
        Some("documentation")
    } else {
        None
    }
}
