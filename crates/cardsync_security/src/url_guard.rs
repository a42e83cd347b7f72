//! SSRF protection for user-supplied server URLs.
//!
//! Every address the sync engine connects to must pass [`UrlGuard::validate`]
//! first. A host is rejected when it is, or resolves to, an address on the
//! local machine or a private network.

use crate::error::{UrlError, UrlResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use url::{Host, Url};

/// Resolves host names to IP addresses.
pub trait Resolver: Send + Sync {
    /// Returns every address `host` resolves to.
    fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

impl<R: Resolver + ?Sized> Resolver for std::sync::Arc<R> {
    fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        (**self).resolve(host, port)
    }
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        Ok((host, port).to_socket_addrs()?.map(|a| a.ip()).collect())
    }
}

/// A URL that passed validation, with the addresses it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    /// The parsed URL.
    pub url: Url,
    /// Public addresses the host resolved to at validation time.
    pub resolved: Vec<IpAddr>,
}

impl ValidatedUrl {
    /// Host name as written in the URL.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Socket addresses for pinning the connection to the validated IPs.
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        let port = self.url.port_or_known_default().unwrap_or(443);
        self.resolved
            .iter()
            .map(|ip| SocketAddr::new(*ip, port))
            .collect()
    }

    /// The URL as a string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Validates server URLs against SSRF.
#[derive(Debug, Clone, Default)]
pub struct UrlGuard<R = SystemResolver> {
    resolver: R,
}

impl UrlGuard<SystemResolver> {
    /// Creates a guard using the system resolver.
    pub fn new() -> Self {
        Self {
            resolver: SystemResolver,
        }
    }
}

impl<R: Resolver> UrlGuard<R> {
    /// Creates a guard with a custom resolver.
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }

    /// Validates a URL.
    ///
    /// Checks run in order: parse, scheme, local host names, literal
    /// addresses, then DNS resolution. Every resolved address must be public.
    pub fn validate(&self, raw: &str) -> UrlResult<ValidatedUrl> {
        let url = Url::parse(raw.trim()).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            tracing::warn!(scheme = url.scheme(), "rejected URL scheme");
            return Err(UrlError::DisallowedScheme(url.scheme().to_string()));
        }

        let resolved = match url.host() {
            None => return Err(UrlError::InvalidUrl("missing host".into())),
            Some(Host::Ipv4(ip)) => {
                check_address(IpAddr::V4(ip))?;
                vec![IpAddr::V4(ip)]
            }
            Some(Host::Ipv6(ip)) => {
                check_address(IpAddr::V6(ip))?;
                vec![IpAddr::V6(ip)]
            }
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if domain == "localhost" || domain.ends_with(".localhost") {
                    tracing::warn!(host = %domain, "rejected local host name");
                    return Err(UrlError::InternalAddress(domain));
                }
                self.resolve(&domain, url.port_or_known_default().unwrap_or(443))?
            }
        };

        tracing::debug!(
            host = url.host_str().unwrap_or_default(),
            addresses = resolved.len(),
            "URL validated"
        );
        Ok(ValidatedUrl { url, resolved })
    }

    fn resolve(&self, domain: &str, port: u16) -> UrlResult<Vec<IpAddr>> {
        let addrs = self
            .resolver
            .resolve(domain, port)
            .map_err(|e| UrlError::ResolutionFailed {
                host: domain.to_string(),
                reason: e.to_string(),
            })?;
        if addrs.is_empty() {
            return Err(UrlError::ResolutionFailed {
                host: domain.to_string(),
                reason: "no addresses".into(),
            });
        }
        for ip in &addrs {
            if is_internal(*ip) {
                tracing::warn!(host = %domain, address = %ip, "host resolves to internal address");
                return Err(UrlError::InternalAddress(format!("{domain} ({ip})")));
            }
        }
        Ok(addrs)
    }
}

fn check_address(ip: IpAddr) -> UrlResult<()> {
    if is_internal(ip) {
        tracing::warn!(address = %ip, "rejected internal address");
        return Err(UrlError::InternalAddress(ip.to_string()));
    }
    Ok(())
}

/// Whether an address is loopback, private, link-local or unspecified.
pub fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 0
        || a == 10
        || a == 127
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 169 && b == 254)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}
