use crate::contact::Contact;

/// Normalize a string for case-insensitive matching.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
}

pub fn normalize_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(normalize(trimmed))
    }
}

/// Substring match of an already-normalized query against name and email.
pub fn matches_query(contact: &Contact, normalized: &str) -> bool {
    normalize(&contact.contact_name).contains(normalized)
        || normalize(&contact.email).contains(normalized)
}

/// Narrow `contacts` to those matching `query`, keeping their order.
/// A blank query returns the input unchanged.
pub fn filter_contacts(contacts: &[Contact], query: &str) -> Vec<Contact> {
    match normalize_query(query) {
        None => contacts.to_vec(),
        Some(normalized) => contacts
            .iter()
            .filter(|contact| matches_query(contact, &normalized))
            .cloned()
            .collect(),
    }
}
