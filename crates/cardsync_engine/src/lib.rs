//! # CardSync Engine
//!
//! Two-way synchronization of local contacts with CardDAV address books.
//!
//! This crate provides:
//! - Connection management with encrypted credentials
//! - A per-connection sync run (pull, then push) with retry and cancellation
//! - Contact ↔ remote object mappings with content-hash change detection
//! - Conflict detection and manual or policy-based resolution
//! - Staged imports from servers and from uploaded `.vcf` files
//! - A CardDAV transport over any [`HttpClient`], with a `reqwest` client
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** model per connection:
//! 1. List the remote collection and diff it against the stored mappings
//! 2. Apply remote creates, updates and deletes locally
//! 3. Push local edits, deletes and (optionally) new contacts
//!
//! Local contacts live behind [`ContactStore`]; sync bookkeeping behind
//! [`SyncStore`]. Both have in-memory implementations, as does the remote
//! side ([`MemoryAddressBook`]).
//!
//! ## Key Invariants
//!
//! - At most one operation holds a connection at a time
//! - Pull always happens before push
//! - Every remote write is conditional on the last known ETag
//! - A contact is mapped at most once per connection
//! - One failing object never stops the rest of the run

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod connection;
mod engine;
mod error;
mod http;
mod ids;
mod import;
mod lock;
mod mapping;
mod reqwest_client;
mod retry;
mod state;
mod store;
mod transport;

pub use config::{OrphanPolicy, RetryConfig, SyncConfig};
pub use conflict::{Conflict, ConflictResolution, MergeChoice, LIST_FIELDS, TEXT_FIELDS};
pub use connection::{ConflictPolicy, Connection, ImportMode, NewConnection};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::{
    parse_multistatus, CardDavAddressBook, HttpClient, HttpMethod, HttpRequest, HttpResponse,
    PropEntry,
};
pub use ids::{ConflictId, ConnectionId, ContactId, PendingImportId};
pub use import::{ImportReport, ImportSource, PendingImport};
pub use lock::{ConnectionLocks, SyncLease};
pub use mapping::{contact_hash, Mapping};
pub use reqwest_client::{CardDavConnector, ReqwestClient};
pub use retry::RetryPolicy;
pub use state::{SyncReport, SyncState};
pub use store::{
    ContactStore, MemoryContactStore, MemorySyncStore, StoredContact, SyncSnapshot, SyncStore,
};
pub use transport::{
    diff, AddressBook, Connector, Credentials, MemoryAddressBook, RemoteChange, RemoteEntry,
    RemoteObject,
};
