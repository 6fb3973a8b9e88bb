//! Persistence contract consumed by the contact service.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::contact::Contact;

/// Ordering of the live contact list.
///
/// Both modes sort ascending by the store's native string ordering, which is
/// byte-wise and therefore case-sensitive ("Zed" sorts before "amy"). Ties are
/// broken by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    #[default]
    Name,
    Email,
}

impl SortMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(SortMode::Name),
            "email" => Some(SortMode::Email),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortMode::Name => "contact_name",
            SortMode::Email => "email",
        }
    }
}

/// How contact names are compared when looking for duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameMatch {
    /// Byte-for-byte equality; "Jon" and "jon" are different contacts.
    #[default]
    Exact,
    /// ASCII case folding; "Jon" and "jon" collide.
    IgnoreCase,
}

impl NameMatch {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(NameMatch::Exact),
            "ignore_case" => Some(NameMatch::IgnoreCase),
            _ => None,
        }
    }
}

/// Durable keyed collection of contacts.
///
/// Implementations serialize their own writers.
#[async_trait]
pub trait ContactStore: Send + Sync + 'static {
    /// Insert a new record and return it with its freshly assigned id.
    /// Any id already set on `contact` is ignored.
    async fn insert(&self, contact: &Contact) -> Result<Contact>;

    /// Remove the record with `contact.id`. Returns whether a record was removed.
    async fn delete(&self, contact: &Contact) -> Result<bool>;

    /// Remove `original` and insert `updated` with a fresh id as one unit.
    /// On error the store is left as it was.
    async fn replace(&self, original: &Contact, updated: &Contact) -> Result<Contact>;

    async fn find_by_name(&self, name: &str, matching: NameMatch) -> Result<Vec<Contact>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>>;

    async fn list_sorted(&self, mode: SortMode) -> Result<Vec<Contact>>;

    /// Subscribe to the ordered contact list. The feed yields the current list
    /// right away and again after every committed write.
    async fn observe_sorted(&self, mode: SortMode) -> Result<ContactFeed>;
}

/// Live ordered sequence of contacts. Dropping the feed unsubscribes.
pub struct ContactFeed {
    rx: mpsc::Receiver<Result<Vec<Contact>>>,
    pump: JoinHandle<()>,
}

impl ContactFeed {
    pub fn new(rx: mpsc::Receiver<Result<Vec<Contact>>>, pump: JoinHandle<()>) -> Self {
        Self { rx, pump }
    }

    /// Next snapshot, or `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<Result<Vec<Contact>>> {
        self.rx.recv().await
    }
}

impl Drop for ContactFeed {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
