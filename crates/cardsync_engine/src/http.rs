//! CardDAV over HTTP.
//!
//! [`CardDavAddressBook`] speaks the small WebDAV subset a sync needs:
//! `PROPFIND` with `Depth: 1` to list ETags, then `GET`, `PUT` and `DELETE`
//! with `If-Match` / `If-None-Match` preconditions. The HTTP client is
//! abstracted so the protocol logic can be tested without a network.

use crate::error::{SyncError, SyncResult};
use crate::transport::{AddressBook, RemoteEntry, RemoteObject};
use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

/// HTTP methods used by CardDAV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// WebDAV property listing.
    Propfind,
    /// Fetch.
    Get,
    /// Create or replace.
    Put,
    /// Remove.
    Delete,
}

impl HttpMethod {
    /// Method token on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propfind => "PROPFIND",
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Extra headers.
    pub headers: Vec<(&'static str, String)>,
    /// Body, if any.
    pub body: Option<String>,
}

impl HttpRequest {
    fn new(method: HttpMethod, url: &Url) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Value of a header, if set.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// `ETag` header.
    pub etag: Option<String>,
    /// Body text.
    pub body: String,
}

/// HTTP client abstraction.
///
/// Implementations authenticate, apply timeouts and map transport
/// failures to [`SyncError::Transient`] or [`SyncError::Timeout`]. Non-2xx
/// statuses are returned as responses, not errors.
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getetag/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

const VCARD_CONTENT_TYPE: &str = "text/vcard; charset=utf-8";

/// An address book collection reached over HTTP.
///
/// Every request stays inside the collection: hrefs reported by the server
/// that resolve to another origin or outside the collection path are
/// refused, so credentials are only ever sent to the validated host.
pub struct CardDavAddressBook<C: HttpClient> {
    base: Url,
    client: C,
}

impl<C: HttpClient> CardDavAddressBook<C> {
    /// Creates an address book rooted at the collection URL `base`.
    pub fn new(mut base: Url, client: C) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base, client }
    }

    /// Collection URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolves `href` against the collection and checks it stays there.
    fn resolve(&self, href: &str) -> SyncResult<Url> {
        let url = self
            .base
            .join(href)
            .map_err(|e| SyncError::protocol(format!("invalid href '{href}': {e}")))?;
        let same_origin = url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default()
            && url.username() == self.base.username()
            && url.password() == self.base.password();
        if !same_origin || !url.path().starts_with(self.base.path()) {
            return Err(SyncError::protocol(format!(
                "href '{href}' points outside the address book"
            )));
        }
        Ok(url)
    }

    fn send(&self, request: HttpRequest, context: &str, accepted: &[u16]) -> SyncResult<HttpResponse> {
        let method = request.method;
        let result = self.client.execute(request).and_then(|response| {
            if accepted.contains(&response.status) {
                Ok(response)
            } else if (200..300).contains(&response.status) {
                Err(SyncError::protocol(format!(
                    "unexpected status {} for {} {context}",
                    response.status,
                    method.as_str()
                )))
            } else {
                Err(SyncError::from_status(response.status, context))
            }
        });
        if let Err(err) = &result {
            tracing::debug!(method = method.as_str(), context, error = %err, "CardDAV request failed");
        }
        result
    }
}

impl<C: HttpClient> AddressBook for CardDavAddressBook<C> {
    fn list(&self) -> SyncResult<Vec<RemoteEntry>> {
        let request = HttpRequest::new(HttpMethod::Propfind, &self.base)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY);
        let response = self.send(request, self.base.path(), &[207])?;
        let entries = parse_multistatus(&response.body)?
            .into_iter()
            .filter(|entry| !entry.collection)
            .filter(|entry| match self.resolve(&entry.href) {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!(href = %entry.href, error = %err, "ignoring listed object");
                    false
                }
            })
            .map(|entry| RemoteEntry::new(entry.href, entry.etag))
            .collect::<Vec<_>>();
        tracing::debug!(collection = %self.base, objects = entries.len(), "listed address book");
        Ok(entries)
    }

    fn fetch(&self, href: &str) -> SyncResult<RemoteObject> {
        let url = self.resolve(href)?;
        let response = self.send(HttpRequest::new(HttpMethod::Get, &url), href, &[200])?;
        Ok(RemoteObject {
            href: href.to_string(),
            etag: response.etag,
            body: response.body,
        })
    }

    fn create(&self, href: &str, body: &str) -> SyncResult<Option<String>> {
        let url = self.resolve(href)?;
        let request = HttpRequest::new(HttpMethod::Put, &url)
            .header("If-None-Match", "*")
            .header("Content-Type", VCARD_CONTENT_TYPE)
            .body(body);
        Ok(self.send(request, href, &[200, 201, 204])?.etag)
    }

    fn update(&self, href: &str, body: &str, etag: Option<&str>) -> SyncResult<Option<String>> {
        let url = self.resolve(href)?;
        let mut request = HttpRequest::new(HttpMethod::Put, &url)
            .header("Content-Type", VCARD_CONTENT_TYPE)
            .body(body);
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }
        Ok(self.send(request, href, &[200, 201, 204])?.etag)
    }

    fn delete(&self, href: &str, etag: Option<&str>) -> SyncResult<()> {
        let url = self.resolve(href)?;
        let mut request = HttpRequest::new(HttpMethod::Delete, &url);
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }
        self.send(request, href, &[200, 204]).map(|_| ())
    }

    fn new_href(&self, name: &str) -> String {
        match self.base.join(&format!("{name}.vcf")) {
            Ok(url) => url.path().to_string(),
            Err(_) => format!("{}{name}.vcf", self.base.path()),
        }
    }
}

/// One `<response>` of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropEntry {
    /// `<href>` text.
    pub href: String,
    /// `<getetag>` from a successful propstat.
    pub etag: Option<String>,
    /// Whether `<resourcetype>` contains `<collection/>`.
    pub collection: bool,
}

#[derive(Default)]
struct Propstat {
    etag: Option<String>,
    collection: bool,
    status: Option<String>,
}

impl Propstat {
    fn is_ok(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |status| status.split_whitespace().nth(1) == Some("200"))
    }
}

#[derive(Clone, Copy)]
enum TextField {
    Href,
    Etag,
    Status,
}

/// Parses a WebDAV `207 Multi-Status` body, matching elements by local name
/// so any namespace prefix works.
pub fn parse_multistatus(xml: &str) -> SyncResult<Vec<PropEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PropEntry> = None;
    let mut propstat = Propstat::default();
    let mut field: Option<TextField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(PropEntry::default()),
                b"propstat" => propstat = Propstat::default(),
                b"href" => field = Some(TextField::Href),
                b"getetag" => field = Some(TextField::Etag),
                b"status" => field = Some(TextField::Status),
                b"collection" => propstat.collection = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    propstat.collection = true;
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(target), Some(entry)) = (field, current.as_mut()) {
                    let text = t
                        .unescape()
                        .map_err(|e| SyncError::protocol(format!("invalid multistatus text: {e}")))?
                        .into_owned();
                    match target {
                        TextField::Href if entry.href.is_empty() => entry.href = text,
                        TextField::Href => {}
                        TextField::Etag => propstat.etag = Some(text),
                        TextField::Status => propstat.status = Some(text),
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"href" | b"getetag" | b"status" => field = None,
                b"propstat" => {
                    if let Some(entry) = current.as_mut() {
                        if propstat.is_ok() {
                            if propstat.etag.is_some() {
                                entry.etag = propstat.etag.take();
                            }
                            entry.collection |= propstat.collection;
                        }
                    }
                    propstat = Propstat::default();
                }
                b"response" => {
                    if let Some(entry) = current.take() {
                        if !entry.href.is_empty() {
                            entries.push(entry);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SyncError::protocol(format!(
                    "invalid multistatus XML at {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ScriptedClient {
        responses: Arc<Mutex<VecDeque<SyncResult<HttpResponse>>>>,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl ScriptedClient {
        fn respond(&self, status: u16, etag: Option<&str>, body: &str) -> &Self {
            self.responses.lock().push_back(Ok(HttpResponse {
                status,
                etag: etag.map(str::to_string),
                body: body.to_string(),
            }));
            self
        }

        fn last_request(&self) -> HttpRequest {
            self.requests.lock().last().cloned().unwrap()
        }
    }

    impl HttpClient for ScriptedClient {
        fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::transient("no scripted response")))
        }
    }

    fn book(client: &ScriptedClient) -> CardDavAddressBook<ScriptedClient> {
        let base = Url::parse("https://dav.example.com/addressbooks/ana/contacts").unwrap();
        CardDavAddressBook::new(base, client.clone())
    }

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>/addressbooks/ana/contacts/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/><card:addressbook/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/addressbooks/ana/contacts/a.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>"abc"</d:getetag><d:resourcetype/></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <D:response xmlns:D="DAV:">
    <D:href>/addressbooks/ana/contacts/b%20c.vcf</D:href>
    <D:propstat>
      <D:prop><D:getetag>&quot;def&quot;</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:getcontenttype/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</d:multistatus>"#;

    #[test]
    fn parses_multistatus() {
        let entries = parse_multistatus(MULTISTATUS).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].collection);
        assert_eq!(entries[1].href, "/addressbooks/ana/contacts/a.vcf");
        assert_eq!(entries[1].etag.as_deref(), Some("\"abc\""));
        assert_eq!(entries[2].href, "/addressbooks/ana/contacts/b%20c.vcf");
        assert_eq!(entries[2].etag.as_deref(), Some("\"def\""));
        assert!(!entries[2].collection);
    }

    #[test]
    fn malformed_xml_is_a_protocol_error() {
        assert!(matches!(
            parse_multistatus("<d:multistatus><d:response></d:oops>"),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn list_skips_the_collection() {
        let client = ScriptedClient::default();
        client.respond(207, None, MULTISTATUS);
        let entries = book(&client).list().unwrap();

        assert_eq!(entries.len(), 2);
        let request = client.last_request();
        assert_eq!(request.method, HttpMethod::Propfind);
        assert_eq!(request.url, "https://dav.example.com/addressbooks/ana/contacts/");
        assert_eq!(request.header_value("depth"), Some("1"));
    }

    #[test]
    fn writes_carry_preconditions() {
        let client = ScriptedClient::default();
        client
            .respond(201, Some("\"1\""), "")
            .respond(204, Some("\"2\""), "")
            .respond(204, None, "");
        let book = book(&client);

        let etag = book.create("/addressbooks/ana/contacts/x.vcf", "BEGIN:VCARD").unwrap();
        assert_eq!(etag.as_deref(), Some("\"1\""));
        assert_eq!(client.last_request().header_value("If-None-Match"), Some("*"));

        book.update("/addressbooks/ana/contacts/x.vcf", "BEGIN:VCARD", Some("\"1\""))
            .unwrap();
        assert_eq!(client.last_request().header_value("If-Match"), Some("\"1\""));

        book.delete("/addressbooks/ana/contacts/x.vcf", Some("\"2\"")).unwrap();
        let request = client.last_request();
        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.url, "https://dav.example.com/addressbooks/ana/contacts/x.vcf");
    }

    #[test]
    fn statuses_map_to_errors() {
        let client = ScriptedClient::default();
        client
            .respond(412, None, "")
            .respond(401, None, "")
            .respond(503, None, "")
            .respond(404, None, "")
            .respond(200, None, "");
        let book = book(&client);

        assert!(matches!(
            book.update("x.vcf", "", Some("\"1\"")),
            Err(SyncError::PreconditionFailed(_))
        ));
        assert!(matches!(book.list(), Err(SyncError::AuthenticationFailed(_))));
        assert!(matches!(book.fetch("x.vcf"), Err(SyncError::Transient(_))));
        assert!(matches!(book.fetch("x.vcf"), Err(SyncError::NotFound(_))));
        assert!(matches!(book.list(), Err(SyncError::Protocol(_))));
    }

    const FOREIGN_HREFS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>http://169.254.169.254/latest/meta-data</d:href>
    <d:propstat><d:prop><d:getetag>"1"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
  <d:response>
    <d:href>//intranet.local/addressbooks/ana/contacts/x.vcf</d:href>
    <d:propstat><d:prop><d:getetag>"2"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
  <d:response>
    <d:href>/addressbooks/bob/contacts/y.vcf</d:href>
    <d:propstat><d:prop><d:getetag>"3"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
  <d:response>
    <d:href>https://dav.example.com/addressbooks/ana/contacts/ok.vcf</d:href>
    <d:propstat><d:prop><d:getetag>"4"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn list_drops_hrefs_outside_the_collection() {
        let client = ScriptedClient::default();
        client.respond(207, None, FOREIGN_HREFS);
        let entries = book(&client).list().unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].href,
            "https://dav.example.com/addressbooks/ana/contacts/ok.vcf"
        );
    }

    #[test]
    fn requests_never_leave_the_collection() {
        let client = ScriptedClient::default();
        let book = book(&client);

        for href in [
            "http://169.254.169.254/latest/meta-data",
            "//intranet.local/addressbooks/ana/contacts/x.vcf",
            "https://dav.example.com:8443/addressbooks/ana/contacts/x.vcf",
            "https://evil@dav.example.com/addressbooks/ana/contacts/x.vcf",
            "/addressbooks/bob/contacts/y.vcf",
            "../../bob/contacts/y.vcf",
        ] {
            assert!(matches!(book.fetch(href), Err(SyncError::Protocol(_))), "{href}");
            assert!(matches!(book.update(href, "", None), Err(SyncError::Protocol(_))), "{href}");
            assert!(matches!(book.delete(href, None), Err(SyncError::Protocol(_))), "{href}");
            assert!(matches!(book.create(href, ""), Err(SyncError::Protocol(_))), "{href}");
        }
        assert!(client.requests.lock().is_empty());
    }

    #[test]
    fn new_href_lives_in_the_collection() {
        let client = ScriptedClient::default();
        assert_eq!(
            book(&client).new_href("4f1c"),
            "/addressbooks/ana/contacts/4f1c.vcf"
        );
    }
}
