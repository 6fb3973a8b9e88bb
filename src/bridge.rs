//! JSON bridge for alternate front-ends.
//!
//! Commands arrive as JSON strings and are forwarded to the service without
//! waiting for them to complete. The contact list is pushed back out as a JSON
//! array whenever it changes.
//!
//! `delete_contact` addresses contacts by their position in the last pushed
//! list. That contract breaks if the front-end renders a stale list;
//! `delete_contact_by_id` is the stable alternative.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::contact::Contact;
use crate::service::{Event, ServiceError, ServiceHandle};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid contact JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no contact at index {index} (list has {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Serialize contacts in the bridge wire format.
pub fn contacts_to_json(contacts: &[Contact]) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(contacts)?)
}

pub struct Bridge {
    handle: ServiceHandle,
}

impl Bridge {
    pub fn new(handle: ServiceHandle) -> Self {
        Self { handle }
    }

    /// Create a contact. Goes through the same validation and duplicate-name
    /// checks as the form.
    pub fn create_new_contact(&self, json: &str) -> Result<(), BridgeError> {
        let contact: Contact = serde_json::from_str(json)?;
        tracing::debug!(name = %contact.contact_name, "bridge create");
        self.handle.send(Event::SaveContact(contact.without_id()))?;
        Ok(())
    }

    /// Update a contact. A non-zero `id` that matches a published contact
    /// replaces that record; anything else is saved as a new contact.
    pub fn update_contact(&self, json: &str) -> Result<(), BridgeError> {
        let updated: Contact = serde_json::from_str(json)?;
        let original = if updated.id == 0 {
            None
        } else {
            self.handle
                .state()
                .contacts
                .into_iter()
                .find(|contact| contact.id == updated.id)
        };

        let event = match original {
            Some(original) => Event::ReplaceContact { original, updated },
            None => {
                tracing::debug!(id = updated.id, "bridge update of unknown contact; creating");
                Event::SaveContact(updated.without_id())
            }
        };
        self.handle.send(event)?;
        Ok(())
    }

    /// Delete by position in the last published (sorted, unfiltered) list.
    pub fn delete_contact(&self, index: usize) -> Result<(), BridgeError> {
        let contacts = self.handle.state().contacts;
        let len = contacts.len();
        let contact = contacts
            .into_iter()
            .nth(index)
            .ok_or(BridgeError::IndexOutOfRange { index, len })?;
        self.handle.send(Event::DeleteContact(contact))?;
        Ok(())
    }

    pub fn delete_contact_by_id(&self, id: i64) -> Result<(), BridgeError> {
        self.handle.send(Event::DeleteById(id))?;
        Ok(())
    }

    /// Save every contact of a JSON array. Returns how many were queued.
    pub fn import_contacts(&self, json: &str) -> Result<usize, BridgeError> {
        let contacts: Vec<Contact> = serde_json::from_str(json)?;
        let count = contacts.len();
        for contact in contacts {
            self.handle.send(Event::SaveContact(contact.without_id()))?;
        }
        Ok(count)
    }

    pub fn contacts_json(&self) -> Result<String, BridgeError> {
        contacts_to_json(&self.handle.state().contacts)
    }

    /// Stream of JSON pushes, one per change of the published contact list.
    /// The current list is pushed first. Consecutive identical lists are
    /// coalesced, but receivers should still tolerate repeats.
    pub fn subscribe_pushes(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.handle.subscribe();

        tokio::spawn(async move {
            let mut last: Option<Vec<Contact>> = None;
            loop {
                let contacts = state.borrow_and_update().contacts.clone();
                if last.as_ref() != Some(&contacts) {
                    match contacts_to_json(&contacts) {
                        Ok(json) => {
                            if tx.send(json).is_err() {
                                break;
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to encode contact push"),
                    }
                    last = Some(contacts);
                }
                if state.changed().await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}
