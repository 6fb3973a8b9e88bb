pub mod xml;

use crate::contact::Contact;
use crate::service::{Event, Outcome, ServiceError, ServiceHandle};

pub use xml::parse_contacts_xml;

/// Result of parsing a bulk-import document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Success { count: usize, contacts: Vec<Contact> },
    /// Blank input, or a well-formed document without any valid record.
    EmptyFile,
    /// The `AddressBook` root element never appeared.
    InvalidFormat,
    Error { message: String },
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Success { .. })
    }

    /// Message shown to the user for this outcome.
    pub fn user_message(&self) -> String {
        match self {
            ImportOutcome::Success { count, .. } => success_message(*count),
            ImportOutcome::EmptyFile => {
                "The file is empty or contains no valid contacts".to_string()
            }
            ImportOutcome::InvalidFormat => {
                "Invalid XML format. Please check the file structure".to_string()
            }
            ImportOutcome::Error { message } => format!("Error: {}", message),
        }
    }
}

pub fn success_message(count: usize) -> String {
    format!("Successfully imported {} contacts", count)
}

/// Result of handing a parsed import to the contact service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub saved: usize,
    /// Contacts refused by the service (duplicate name or store failure).
    pub rejected: usize,
}

/// Save every contact of a successful import through the service, then
/// announce the completed import.
///
/// Non-success outcomes are left untouched and produce an empty summary.
pub async fn apply_import(
    handle: &ServiceHandle,
    outcome: &ImportOutcome,
) -> Result<ImportSummary, ServiceError> {
    let ImportOutcome::Success { contacts, .. } = outcome else {
        return Ok(ImportSummary::default());
    };

    let mut summary = ImportSummary::default();
    for contact in contacts {
        let dispatched = handle.dispatch(Event::SaveContact(contact.clone())).await?;
        match dispatched.outcome {
            Outcome::Saved(_) => summary.saved += 1,
            other => {
                tracing::warn!(
                    name = %contact.contact_name,
                    outcome = ?other,
                    "imported contact was not saved"
                );
                summary.rejected += 1;
            }
        }
    }

    handle
        .dispatch(Event::ImportCompleted(summary.saved))
        .await?;
    Ok(summary)
}
