//! Remote address book abstraction.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mapping::Mapping;
use cardsync_security::{ValidatedUrl, Zeroizing};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// One object in a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Object path.
    pub href: String,
    /// Current ETag, if the server reports one.
    pub etag: Option<String>,
}

impl RemoteEntry {
    /// Creates a listing entry.
    pub fn new(href: impl Into<String>, etag: Option<String>) -> Self {
        Self {
            href: href.into(),
            etag,
        }
    }
}

/// A fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object path.
    pub href: String,
    /// ETag of this version.
    pub etag: Option<String>,
    /// vCard text.
    pub body: String,
}

/// A CardDAV address book collection.
///
/// Writes are conditional: `create` must fail with
/// [`SyncError::PreconditionFailed`] if the href already exists, and
/// `update`/`delete` must fail the same way when `etag` no longer matches.
pub trait AddressBook: Send + Sync {
    /// Lists every object with its ETag.
    fn list(&self) -> SyncResult<Vec<RemoteEntry>>;

    /// Fetches one object.
    fn fetch(&self, href: &str) -> SyncResult<RemoteObject>;

    /// Creates an object that must not exist yet; returns its new ETag.
    fn create(&self, href: &str, body: &str) -> SyncResult<Option<String>>;

    /// Replaces an object if it still has `etag`; returns the new ETag.
    fn update(&self, href: &str, body: &str, etag: Option<&str>) -> SyncResult<Option<String>>;

    /// Deletes an object if it still has `etag`.
    fn delete(&self, href: &str, etag: Option<&str>) -> SyncResult<()>;

    /// Path for a new object named after `name`.
    fn new_href(&self, name: &str) -> String {
        format!("{name}.vcf")
    }
}

/// Decrypted account credentials, held only for the duration of a run.
#[derive(Clone)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Plaintext password.
    pub password: Zeroizing<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens address books.
pub trait Connector: Send + Sync {
    /// The address book type produced.
    type Book: AddressBook;

    /// Connects to the collection at `target`.
    fn connect(
        &self,
        target: &ValidatedUrl,
        credentials: &Credentials,
        config: &SyncConfig,
    ) -> SyncResult<Self::Book>;
}

/// Difference between a listing and the known mappings.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// An href no mapping knows about.
    Created {
        /// Object path.
        href: String,
        /// Listed ETag.
        etag: Option<String>,
    },
    /// A mapped object whose ETag changed or is unknown.
    Updated {
        /// The mapping as stored.
        mapping: Mapping,
        /// Listed ETag.
        etag: Option<String>,
    },
    /// A mapped object missing from the listing.
    Deleted {
        /// The mapping as stored.
        mapping: Mapping,
    },
}

/// Compares a listing with the mappings of one connection.
///
/// Unchanged objects are omitted. Creations and updates come first in
/// listing order, then deletions in mapping order.
pub fn diff(listing: &[RemoteEntry], mappings: &[Mapping]) -> Vec<RemoteChange> {
    let by_href: HashMap<&str, &Mapping> = mappings.iter().map(|m| (m.href.as_str(), m)).collect();
    let listed: HashSet<&str> = listing.iter().map(|e| e.href.as_str()).collect();

    let mut changes = Vec::new();
    for entry in listing {
        match by_href.get(entry.href.as_str()) {
            None => changes.push(RemoteChange::Created {
                href: entry.href.clone(),
                etag: entry.etag.clone(),
            }),
            Some(mapping) if entry.etag.is_none() || entry.etag != mapping.etag => {
                changes.push(RemoteChange::Updated {
                    mapping: (*mapping).clone(),
                    etag: entry.etag.clone(),
                })
            }
            Some(_) => {}
        }
    }
    for mapping in mappings {
        if !listed.contains(mapping.href.as_str()) {
            changes.push(RemoteChange::Deleted {
                mapping: mapping.clone(),
            });
        }
    }
    changes
}

type CallHook = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct BookState {
    objects: BTreeMap<String, (String, String)>,
    next_etag: u64,
    failures: VecDeque<SyncError>,
    calls: Vec<String>,
    credentials: Option<(String, String)>,
    reject_password: Option<String>,
}

impl BookState {
    fn bump(&mut self) -> String {
        self.next_etag += 1;
        format!("\"{}\"", self.next_etag)
    }
}

/// An address book kept in memory, for tests and demos.
///
/// Clones share the same collection, so a test can keep one handle while
/// the engine connects through another.
#[derive(Clone, Default)]
pub struct MemoryAddressBook {
    state: Arc<Mutex<BookState>>,
    hook: Arc<Mutex<Option<CallHook>>>,
}

impl fmt::Debug for MemoryAddressBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryAddressBook")
            .field("objects", &state.objects.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl MemoryAddressBook {
    /// Creates an empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object as if another client had written it; returns its
    /// new ETag.
    pub fn server_put(&self, href: &str, body: &str) -> String {
        let mut state = self.state.lock();
        let etag = state.bump();
        state
            .objects
            .insert(href.to_string(), (etag.clone(), body.to_string()));
        etag
    }

    /// Deletes an object as if another client had removed it.
    pub fn server_delete(&self, href: &str) -> bool {
        self.state.lock().objects.remove(href).is_some()
    }

    /// Current body of an object.
    pub fn body(&self, href: &str) -> Option<String> {
        self.state.lock().objects.get(href).map(|(_, b)| b.clone())
    }

    /// Current ETag of an object.
    pub fn etag(&self, href: &str) -> Option<String> {
        self.state.lock().objects.get(href).map(|(e, _)| e.clone())
    }

    /// All stored hrefs.
    pub fn hrefs(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    /// Makes the next calls fail with these errors, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = SyncError>) {
        self.state.lock().failures.extend(errors);
    }

    /// Rejects connections whose password is not `password`.
    pub fn require_password(&self, password: &str) {
        self.state.lock().reject_password = Some(password.to_string());
    }

    /// Calls made so far, as `"METHOD href"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls whose method is `method`.
    pub fn count_calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    /// Credentials seen by the last connect.
    pub fn last_credentials(&self) -> Option<(String, String)> {
        self.state.lock().credentials.clone()
    }

    /// Runs `hook` with the call description before every call.
    pub fn set_call_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    fn begin(&self, call: String) -> SyncResult<()> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(&call);
        }
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AddressBook for MemoryAddressBook {
    fn list(&self) -> SyncResult<Vec<RemoteEntry>> {
        self.begin("LIST".to_string())?;
        Ok(self
            .state
            .lock()
            .objects
            .iter()
            .map(|(href, (etag, _))| RemoteEntry::new(href.clone(), Some(etag.clone())))
            .collect())
    }

    fn fetch(&self, href: &str) -> SyncResult<RemoteObject> {
        self.begin(format!("GET {href}"))?;
        let state = self.state.lock();
        let (etag, body) = state
            .objects
            .get(href)
            .ok_or_else(|| SyncError::NotFound(href.to_string()))?;
        Ok(RemoteObject {
            href: href.to_string(),
            etag: Some(etag.clone()),
            body: body.clone(),
        })
    }

    fn create(&self, href: &str, body: &str) -> SyncResult<Option<String>> {
        self.begin(format!("CREATE {href}"))?;
        let mut state = self.state.lock();
        if state.objects.contains_key(href) {
            return Err(SyncError::PreconditionFailed(href.to_string()));
        }
        let etag = state.bump();
        state
            .objects
            .insert(href.to_string(), (etag.clone(), body.to_string()));
        Ok(Some(etag))
    }

    fn update(&self, href: &str, body: &str, etag: Option<&str>) -> SyncResult<Option<String>> {
        self.begin(format!("UPDATE {href}"))?;
        let mut state = self.state.lock();
        let current = match state.objects.get(href) {
            Some((current, _)) => current.clone(),
            None => return Err(SyncError::NotFound(href.to_string())),
        };
        if etag.is_some_and(|expected| expected != current) {
            return Err(SyncError::PreconditionFailed(href.to_string()));
        }
        let new_etag = state.bump();
        state
            .objects
            .insert(href.to_string(), (new_etag.clone(), body.to_string()));
        Ok(Some(new_etag))
    }

    fn delete(&self, href: &str, etag: Option<&str>) -> SyncResult<()> {
        self.begin(format!("DELETE {href}"))?;
        let mut state = self.state.lock();
        let current = match state.objects.get(href) {
            Some((current, _)) => current.clone(),
            None => return Err(SyncError::NotFound(href.to_string())),
        };
        if etag.is_some_and(|expected| expected != current) {
            return Err(SyncError::PreconditionFailed(href.to_string()));
        }
        state.objects.remove(href);
        Ok(())
    }
}

impl Connector for MemoryAddressBook {
    type Book = MemoryAddressBook;

    fn connect(
        &self,
        _target: &ValidatedUrl,
        credentials: &Credentials,
        _config: &SyncConfig,
    ) -> SyncResult<Self::Book> {
        let mut state = self.state.lock();
        state.credentials = Some((
            credentials.username.clone(),
            credentials.password.as_str().to_string(),
        ));
        if let Some(required) = &state.reject_password {
            if required.as_str() != credentials.password.as_str() {
                return Err(SyncError::AuthenticationFailed(format!(
                    "invalid password for {}",
                    credentials.username
                )));
            }
        }
        Ok(self.clone())
    }
}
