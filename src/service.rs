//! Contact management service.
//!
//! A single task owns the [`ViewState`] and processes one message at a time:
//! user events arriving through a [`ServiceHandle`], snapshots from the active
//! sort feed, and banner expiry ticks. Every mutation republishes the state on
//! a watch channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::contact::{is_blank, is_valid_email, Contact, ContactField};
use crate::import::success_message;
use crate::search;
use crate::store::{ContactStore, NameMatch, SortMode};

pub const DUPLICATE_NAME_MESSAGE: &str = "A contact with this name already exists";
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Public types
// =============================================================================

/// User intents accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SetField(ContactField, String),
    ShowAddDialog,
    ShowEditDialog(Contact),
    HideDialog,
    SaveDraft,
    /// Save a complete contact without going through the form (import, bridge).
    SaveContact(Contact),
    /// Replace `original` by `updated`, outside the form.
    ReplaceContact { original: Contact, updated: Contact },
    DeleteContact(Contact),
    DeleteById(i64),
    SortBy(SortMode),
    Search(String),
    ShowDetails(Contact),
    HideDetails,
    ImportCompleted(usize),
}

/// What processing a single event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Saved(Contact),
    /// Precondition not met; state unchanged.
    Ignored,
    /// Validation or duplicate check refused the request.
    Rejected(String),
    /// The store reported an error.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

/// Transient message shown above the contact list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

/// Snapshot published after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub contacts: Vec<Contact>,
    pub filtered_contacts: Vec<Contact>,
    pub sort_mode: SortMode,
    pub search_query: String,
    pub draft: Contact,
    pub is_dialog_open: bool,
    /// Record being replaced while the dialog is in edit mode.
    pub editing: Option<Contact>,
    pub name_error: String,
    pub email_error: String,
    pub banner: Option<Banner>,
    pub selected_contact: Option<Contact>,
}

impl ViewState {
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }
}

/// What to do with the open form when the store fails during a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Leave the dialog open with the draft intact so the user can retry.
    #[default]
    KeepDraft,
    /// Close the dialog and drop the draft.
    DiscardDraft,
}

impl StoreFailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_draft" => Some(StoreFailurePolicy::KeepDraft),
            "discard_draft" => Some(StoreFailurePolicy::DiscardDraft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub banner_timeout: Duration,
    pub name_match: NameMatch,
    pub on_store_error: StoreFailurePolicy,
    pub initial_sort: SortMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            name_match: NameMatch::default(),
            on_store_error: StoreFailurePolicy::default(),
            initial_sort: SortMode::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("contact service has stopped")]
    Closed,
}

/// Result of [`ServiceHandle::dispatch`].
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub outcome: Outcome,
    pub state: ViewState,
}

// =============================================================================
// Handle
// =============================================================================

struct Command {
    event: Event,
    reply: Option<oneshot::Sender<Dispatched>>,
}

/// Cloneable entry point to a running service. Events from every clone are
/// processed in arrival order by the single owner task.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ViewState>,
}

impl ServiceHandle {
    /// Queue an event without waiting for it to be processed.
    pub fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.commands
            .send(Command { event, reply: None })
            .map_err(|_| ServiceError::Closed)
    }

    /// Queue an event and wait until it has been processed.
    pub async fn dispatch(&self, event: Event) -> Result<Dispatched, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command {
                event,
                reply: Some(reply),
            })
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Wait for the first published state satisfying `pred`.
    pub async fn wait_for<F>(&self, pred: F) -> Result<ViewState, ServiceError>
    where
        F: FnMut(&ViewState) -> bool,
    {
        let mut rx = self.state.clone();
        let state = rx.wait_for(pred).await.map_err(|_| ServiceError::Closed)?;
        Ok(state.clone())
    }
}

// =============================================================================
// Service
// =============================================================================

enum Internal {
    Contacts {
        generation: u64,
        result: Result<Vec<Contact>>,
    },
    FeedFailed {
        generation: u64,
        error: String,
    },
    ClearBanner {
        seq: u64,
    },
}

enum SaveResult {
    Saved(Contact),
    Duplicate,
}

pub struct ContactService {
    store: Arc<dyn ContactStore>,
    config: ServiceConfig,
    state: ViewState,
    publisher: watch::Sender<ViewState>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    feed_task: Option<JoinHandle<()>>,
    feed_generation: u64,
    banner_seq: u64,
}

impl ContactService {
    /// Start the service on the current tokio runtime.
    pub fn spawn(store: Arc<dyn ContactStore>, config: ServiceConfig) -> ServiceHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (service, state_rx) = Self::new(store, config, internal_tx);

        tokio::spawn(service.run(commands_rx, internal_rx));

        ServiceHandle {
            commands: commands_tx,
            state: state_rx,
        }
    }

    fn new(
        store: Arc<dyn ContactStore>,
        config: ServiceConfig,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> (Self, watch::Receiver<ViewState>) {
        let state = ViewState {
            sort_mode: config.initial_sort,
            ..ViewState::default()
        };
        let (publisher, state_rx) = watch::channel(state.clone());
        let service = Self {
            store,
            config,
            state,
            publisher,
            internal_tx,
            feed_task: None,
            feed_generation: 0,
            banner_seq: 0,
        };
        (service, state_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        self.subscribe_sorted(self.state.sort_mode);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(Command { event, reply }) = command else {
                        break;
                    };
                    let outcome = self.handle_event(event).await;
                    self.publish();
                    if let Some(reply) = reply {
                        let _ = reply.send(Dispatched {
                            outcome,
                            state: self.state.clone(),
                        });
                    }
                }
                Some(message) = internal.recv() => {
                    self.handle_internal(message);
                    self.publish();
                }
            }
        }

        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
        tracing::debug!("contact service stopped");
    }

    fn publish(&mut self) {
        if self.state.editing.is_some() && !self.state.is_dialog_open {
            tracing::warn!("edit mode without an open dialog; clearing edit mode");
            self.state.editing = None;
        }
        self.publisher.send_replace(self.state.clone());
    }

    async fn handle_event(&mut self, event: Event) -> Outcome {
        match event {
            Event::SetField(field, value) => self.set_field(field, value),
            Event::ShowAddDialog => {
                self.state.is_dialog_open = true;
                self.state.editing = None;
                self.reset_form_fields();
                Outcome::Applied
            }
            Event::ShowEditDialog(contact) => {
                self.state.is_dialog_open = true;
                self.state.draft = contact.clone();
                self.state.editing = Some(contact);
                self.state.name_error.clear();
                self.state.email_error.clear();
                Outcome::Applied
            }
            Event::HideDialog => {
                self.close_dialog();
                Outcome::Applied
            }
            Event::SaveDraft => self.save_draft().await,
            Event::SaveContact(contact) => self.save_contact(contact, None).await,
            Event::ReplaceContact { original, updated } => {
                self.save_contact(updated, Some(original)).await
            }
            Event::DeleteContact(contact) => self.delete_contact(&contact).await,
            Event::DeleteById(id) => self.delete_by_id(id).await,
            Event::SortBy(mode) => {
                if mode != self.state.sort_mode {
                    self.state.sort_mode = mode;
                    self.subscribe_sorted(mode);
                }
                Outcome::Applied
            }
            Event::Search(query) => {
                self.state.search_query = query;
                self.refilter();
                Outcome::Applied
            }
            Event::ShowDetails(contact) => {
                self.state.selected_contact = Some(contact);
                Outcome::Applied
            }
            Event::HideDetails => {
                self.state.selected_contact = None;
                Outcome::Applied
            }
            Event::ImportCompleted(count) => {
                self.set_banner(BannerKind::Success, success_message(count));
                Outcome::Applied
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Contacts { generation, .. } | Internal::FeedFailed { generation, .. }
                if generation != self.feed_generation =>
            {
                tracing::trace!(generation, "dropping snapshot from a cancelled feed");
            }
            Internal::Contacts {
                result: Ok(contacts),
                ..
            } => {
                self.state.contacts = contacts;
                self.refilter();
            }
            Internal::Contacts { result: Err(err), .. } => {
                tracing::warn!(error = %err, "failed to refresh contact list");
                self.set_banner(
                    BannerKind::Error,
                    format!("Could not load contacts: {}", err),
                );
            }
            Internal::FeedFailed { error, .. } => {
                tracing::warn!(%error, "failed to subscribe to contact list");
                self.set_banner(
                    BannerKind::Error,
                    format!("Could not load contacts: {}", error),
                );
            }
            Internal::ClearBanner { seq } => {
                if seq == self.banner_seq {
                    self.state.banner = None;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Form
    // -------------------------------------------------------------------------

    fn set_field(&mut self, field: ContactField, value: String) -> Outcome {
        if !self.state.is_dialog_open {
            tracing::debug!(?field, "ignoring field update while the dialog is closed");
            return Outcome::Ignored;
        }

        match field {
            ContactField::ContactName if !is_blank(&value) => self.state.name_error.clear(),
            ContactField::Email if !is_blank(&value) && is_valid_email(&value) => {
                self.state.email_error.clear()
            }
            _ => {}
        }
        self.state.draft.set(field, value);
        Outcome::Applied
    }

    fn reset_form_fields(&mut self) {
        self.state.draft = Contact::default();
        self.state.name_error.clear();
        self.state.email_error.clear();
    }

    fn close_dialog(&mut self) {
        self.state.is_dialog_open = false;
        self.state.editing = None;
        self.reset_form_fields();
    }

    async fn save_draft(&mut self) -> Outcome {
        if !self.state.is_dialog_open {
            tracing::debug!("ignoring save while the dialog is closed");
            return Outcome::Ignored;
        }

        let candidate = self.state.draft.without_id();
        let errors = candidate.validate();
        self.state.name_error = errors.name.clone().unwrap_or_default();
        self.state.email_error = errors.email.clone().unwrap_or_default();
        if !errors.is_empty() {
            return Outcome::Rejected(errors.summary());
        }

        let original = self.state.editing.clone();
        match self.persist(&candidate, original.as_ref()).await {
            Ok(SaveResult::Saved(stored)) => {
                self.close_dialog();
                Outcome::Saved(stored)
            }
            Ok(SaveResult::Duplicate) => {
                self.set_banner(BannerKind::Error, DUPLICATE_NAME_MESSAGE.to_string());
                Outcome::Rejected(DUPLICATE_NAME_MESSAGE.to_string())
            }
            Err(err) => {
                let outcome = self.store_failed("Could not save contact", err);
                if self.config.on_store_error == StoreFailurePolicy::DiscardDraft {
                    self.close_dialog();
                }
                outcome
            }
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    async fn save_contact(&mut self, contact: Contact, original: Option<Contact>) -> Outcome {
        let candidate = contact.without_id();
        let errors = candidate.validate();
        if !errors.is_empty() {
            let message = format!("Contact rejected: {}", errors.summary());
            tracing::warn!(name = %candidate.contact_name, "{}", message);
            self.set_banner(BannerKind::Error, message.clone());
            return Outcome::Rejected(message);
        }

        match self.persist(&candidate, original.as_ref()).await {
            Ok(SaveResult::Saved(stored)) => Outcome::Saved(stored),
            Ok(SaveResult::Duplicate) => {
                self.set_banner(BannerKind::Error, DUPLICATE_NAME_MESSAGE.to_string());
                Outcome::Rejected(DUPLICATE_NAME_MESSAGE.to_string())
            }
            Err(err) => self.store_failed("Could not save contact", err),
        }
    }

    /// Duplicate check, then insert, or replace `original` when given.
    async fn persist(&self, candidate: &Contact, original: Option<&Contact>) -> Result<SaveResult> {
        let existing = self
            .store
            .find_by_name(&candidate.contact_name, self.config.name_match)
            .await?;
        let conflict = existing
            .iter()
            .any(|found| original.map_or(true, |orig| orig.id != found.id));
        if conflict {
            tracing::info!(name = %candidate.contact_name, "refusing duplicate contact name");
            return Ok(SaveResult::Duplicate);
        }

        let stored = match original {
            Some(orig) => {
                let stored = self.store.replace(orig, candidate).await?;
                tracing::info!(replaced = orig.id, id = stored.id, "replaced contact");
                stored
            }
            None => self.store.insert(candidate).await?,
        };
        tracing::info!(id = stored.id, name = %stored.contact_name, "saved contact");
        Ok(SaveResult::Saved(stored))
    }

    async fn delete_contact(&mut self, contact: &Contact) -> Outcome {
        match self.store.delete(contact).await {
            Ok(true) => {
                tracing::info!(id = contact.id, "deleted contact");
                if self
                    .state
                    .selected_contact
                    .as_ref()
                    .is_some_and(|selected| selected.id == contact.id)
                {
                    self.state.selected_contact = None;
                }
                Outcome::Applied
            }
            Ok(false) => {
                tracing::debug!(id = contact.id, "contact to delete was not in the store");
                Outcome::Ignored
            }
            Err(err) => self.store_failed("Could not delete contact", err),
        }
    }

    async fn delete_by_id(&mut self, id: i64) -> Outcome {
        let found = self.store.find_by_id(id).await;
        match found {
            Ok(Some(contact)) => self.delete_contact(&contact).await,
            Ok(None) => Outcome::Rejected(format!("no contact with id {}", id)),
            Err(err) => self.store_failed("Could not delete contact", err),
        }
    }

    fn store_failed(&mut self, context: &str, err: anyhow::Error) -> Outcome {
        let message = format!("{}: {:#}", context, err);
        tracing::warn!("{}", message);
        self.set_banner(BannerKind::Error, message.clone());
        Outcome::Failed(message)
    }

    // -------------------------------------------------------------------------
    // Sorted feed
    // -------------------------------------------------------------------------

    /// Cancel the active feed and start one for `mode`. Snapshots still in
    /// flight from the previous feed carry an older generation and are dropped.
    fn subscribe_sorted(&mut self, mode: SortMode) {
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
        self.feed_generation += 1;

        let generation = self.feed_generation;
        let store = Arc::clone(&self.store);
        let tx = self.internal_tx.clone();

        self.feed_task = Some(tokio::spawn(async move {
            let mut feed = match store.observe_sorted(mode).await {
                Ok(feed) => feed,
                Err(err) => {
                    let _ = tx.send(Internal::FeedFailed {
                        generation,
                        error: format!("{:#}", err),
                    });
                    return;
                }
            };
            while let Some(result) = feed.next().await {
                if tx.send(Internal::Contacts { generation, result }).is_err() {
                    break;
                }
            }
            tracing::debug!(?mode, "contact feed ended");
        }));
    }

    fn refilter(&mut self) {
        self.state.filtered_contacts =
            search::filter_contacts(&self.state.contacts, &self.state.search_query);
    }

    // -------------------------------------------------------------------------
    // Banner
    // -------------------------------------------------------------------------

    fn set_banner(&mut self, kind: BannerKind, message: String) {
        self.banner_seq += 1;
        self.state.banner = Some(Banner { kind, message });

        let seq = self.banner_seq;
        let timeout = self.config.banner_timeout;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Internal::ClearBanner { seq });
        });
    }
}
