//! [`HttpClient`] backed by blocking `reqwest`.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{CardDavAddressBook, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Connector, Credentials};
use cardsync_security::{ValidatedUrl, Zeroizing};
use reqwest::blocking::Client;
use reqwest::header::ETAG;
use reqwest::redirect::Policy;
use reqwest::Method;

/// Authenticated HTTP client for one connection.
///
/// Redirects are not followed: a redirect could point at an address the URL
/// guard never saw.
pub struct ReqwestClient {
    client: Client,
    username: String,
    password: Zeroizing<String>,
}

impl ReqwestClient {
    /// Builds a client for `target`, pinned to its validated addresses when
    /// the configuration asks for it.
    pub fn new(target: &ValidatedUrl, credentials: &Credentials, config: &SyncConfig) -> SyncResult<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none());
        if config.pin_resolved_addresses && !target.resolved.is_empty() {
            builder = builder.resolve_to_addrs(target.host(), &target.socket_addrs());
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }
}

fn method(method: HttpMethod) -> SyncResult<Method> {
    Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| SyncError::protocol(format!("invalid method {}: {e}", method.as_str())))
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::fatal(err.to_string())
    } else {
        SyncError::transient(err.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let mut builder = self
            .client
            .request(method(request.method)?, &request.url)
            .basic_auth(&self.username, Some(self.password.as_str()));
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().map_err(transport_error)?;
        tracing::trace!(method = request.method.as_str(), url = %request.url, status, "HTTP exchange");
        Ok(HttpResponse { status, etag, body })
    }
}

/// Connects to real CardDAV servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardDavConnector;

impl Connector for CardDavConnector {
    type Book = CardDavAddressBook<ReqwestClient>;

    fn connect(
        &self,
        target: &ValidatedUrl,
        credentials: &Credentials,
        config: &SyncConfig,
    ) -> SyncResult<Self::Book> {
        let client = ReqwestClient::new(target, credentials, config)?;
        Ok(CardDavAddressBook::new(target.url.clone(), client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_is_valid() {
        for m in [
            HttpMethod::Propfind,
            HttpMethod::Get,
            HttpMethod::Put,
            HttpMethod::Delete,
        ] {
            assert_eq!(method(m).unwrap().as_str(), m.as_str());
        }
    }

    #[test]
    fn builds_pinned_client() {
        let target = ValidatedUrl {
            url: "https://dav.example.com/ab/".parse().unwrap(),
            resolved: vec!["93.184.216.34".parse().unwrap()],
        };
        let credentials = Credentials {
            username: "ana".into(),
            password: Zeroizing::new("secret".into()),
        };
        assert!(ReqwestClient::new(&target, &credentials, &SyncConfig::default()).is_ok());
    }
}
