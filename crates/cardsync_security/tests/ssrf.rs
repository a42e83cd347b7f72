//! URL validation against a scripted resolver.

use cardsync_security::{Resolver, UrlError, UrlGuard};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

#[derive(Default)]
struct FakeResolver {
    hosts: HashMap<&'static str, Vec<&'static str>>,
}

impl FakeResolver {
    fn with(mut self, host: &'static str, addrs: &[&'static str]) -> Self {
        self.hosts.insert(host, addrs.to_vec());
        self
    }
}

impl Resolver for FakeResolver {
    fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        match self.hosts.get(host) {
            Some(addrs) => Ok(addrs.iter().map(|a| a.parse().unwrap()).collect()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown host")),
        }
    }
}

fn guard() -> UrlGuard<FakeResolver> {
    UrlGuard::with_resolver(
        FakeResolver::default()
            .with("dav.example.com", &["93.184.216.34"])
            .with("dual.example.com", &["2606:2800:220:1::1", "93.184.216.34"])
            .with("rebind.example.com", &["93.184.216.34", "10.0.0.5"])
            .with("internal.example.com", &["192.168.0.10"])
            .with("empty.example.com", &[]),
    )
}

#[test]
fn accepts_public_hosts() {
    let guard = guard();

    let validated = guard.validate("https://dav.example.com/addressbooks/me/").unwrap();
    assert_eq!(validated.host(), "dav.example.com");
    assert_eq!(validated.resolved, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);

    let dual = guard.validate("http://dual.example.com:8443/").unwrap();
    assert_eq!(dual.resolved.len(), 2);
    assert!(dual.socket_addrs().iter().all(|a| a.port() == 8443));

    let literal = guard.validate("https://93.184.216.34/dav").unwrap();
    assert_eq!(literal.resolved.len(), 1);
}

#[test]
fn ssrf_table() {
    let guard = guard();
    let cases: &[(&str, fn(&UrlError) -> bool)] = &[
        ("not a url", |e| matches!(e, UrlError::InvalidUrl(_))),
        ("ftp://dav.example.com/", |e| matches!(e, UrlError::DisallowedScheme(_))),
        ("file:///etc/passwd", |e| matches!(e, UrlError::DisallowedScheme(_))),
        ("javascript:alert(1)", |e| matches!(e, UrlError::DisallowedScheme(_))),
        ("data:text/plain,hello", |e| matches!(e, UrlError::DisallowedScheme(_))),
        ("http://localhost:5232/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://LOCALHOST./", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://api.localhost/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://127.0.0.1/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://127.1/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://0.0.0.0/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://10.1.2.3/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://172.20.0.1/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://192.168.1.1/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://169.254.1.1/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://169.254.169.254/latest/meta-data", |e| {
            matches!(e, UrlError::InternalAddress(_))
        }),
        ("http://[::1]/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://[fd00::1]/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("http://[::ffff:192.168.0.1]/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("https://internal.example.com/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("https://rebind.example.com/", |e| matches!(e, UrlError::InternalAddress(_))),
        ("https://nowhere.example.com/", |e| {
            matches!(e, UrlError::ResolutionFailed { .. })
        }),
        ("https://empty.example.com/", |e| {
            matches!(e, UrlError::ResolutionFailed { .. })
        }),
    ];

    for (url, expected) in cases {
        let err = guard
            .validate(url)
            .expect_err(&format!("{url} should be rejected"));
        assert!(expected(&err), "{url}: unexpected error {err:?}");
    }
}

#[test]
fn public_neighbours_of_private_ranges_pass() {
    let guard = guard();
    for url in ["http://172.15.255.255/", "http://172.32.0.1/", "http://11.0.0.1/"] {
        assert!(guard.validate(url).is_ok(), "{url}");
    }
}
