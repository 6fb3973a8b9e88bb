//! Streaming parser for the `<AddressBook>` bulk-contact format.
//!
//! The importer is lenient: records that fail validation are dropped and the
//! rest of the document is still imported. Only document-level problems
//! (blank input, missing root element, malformed XML) fail the whole batch.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ImportOutcome;
use crate::contact::{Contact, ContactField};

const ROOT_TAG: &str = "AddressBook";
const RECORD_TAG: &str = "Contact";

/// Parse a bulk-contact XML document into validated contacts.
pub fn parse_contacts_xml(content: &str) -> ImportOutcome {
    if content.trim().is_empty() {
        return ImportOutcome::EmptyFile;
    }

    match scan(content) {
        Ok(Scan {
            saw_root: false, ..
        }) => ImportOutcome::InvalidFormat,
        Ok(Scan { contacts, .. }) if contacts.is_empty() => ImportOutcome::EmptyFile,
        Ok(Scan { contacts, .. }) => ImportOutcome::Success {
            count: contacts.len(),
            contacts,
        },
        Err(message) => ImportOutcome::Error { message },
    }
}

struct Scan {
    saw_root: bool,
    contacts: Vec<Contact>,
}

fn scan(content: &str) -> Result<Scan, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut open: Vec<String> = Vec::new();
    let mut draft: Option<Contact> = None;
    let mut saw_root = false;
    let mut contacts = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("{} at position {}", err, reader.error_position()))?;

        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if name == ROOT_TAG {
                    saw_root = true;
                }
                if name == RECORD_TAG {
                    if draft.is_some() {
                        tracing::debug!("nested <Contact> restarts the open record");
                    }
                    draft = Some(Contact::default());
                }
                open.push(name);
            }
            Event::Empty(empty) => {
                let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                if name == ROOT_TAG {
                    saw_root = true;
                }
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(|err| err.to_string())?;
                assign_text(draft.as_mut(), open.last(), &value);
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                assign_text(draft.as_mut(), open.last(), &value);
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                open.pop();
                if name == RECORD_TAG {
                    if let Some(record) = draft.take() {
                        finish_record(record, &mut contacts);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(format!(
            "unexpected end of document: element <{}> is not closed",
            unclosed
        ));
    }

    tracing::debug!(count = contacts.len(), "finished scanning import document");
    Ok(Scan { saw_root, contacts })
}

fn assign_text(draft: Option<&mut Contact>, tag: Option<&String>, raw: &str) {
    let (Some(draft), Some(tag)) = (draft, tag) else {
        return;
    };
    let value = raw.trim();
    if value.is_empty() {
        return;
    }
    if let Some(field) = ContactField::from_tag(tag) {
        draft.set(field, value);
    }
}

fn finish_record(record: Contact, contacts: &mut Vec<Contact>) {
    if record.is_valid() {
        tracing::debug!(name = %record.contact_name, "accepted imported contact");
        contacts.push(record);
    } else {
        tracing::debug!(
            name = %record.contact_name,
            email = %record.email,
            "dropping invalid imported contact"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_xml(name: &str, email: &str) -> String {
        format!(
            "<Contact><ContactName>{}</ContactName><Email>{}</Email></Contact>",
            name, email
        )
    }

    #[test]
    fn blank_input_is_empty_file() {
        assert_eq!(parse_contacts_xml(""), ImportOutcome::EmptyFile);
        assert_eq!(parse_contacts_xml("  \n\t "), ImportOutcome::EmptyFile);
    }

    #[test]
    fn wrong_root_is_invalid_format() {
        assert_eq!(parse_contacts_xml("<Root></Root>"), ImportOutcome::InvalidFormat);
        let doc = format!("<People>{}</People>", contact_xml("Ann", "ann@example.com"));
        assert_eq!(parse_contacts_xml(&doc), ImportOutcome::InvalidFormat);
    }

    #[test]
    fn root_without_records_is_empty_file() {
        assert_eq!(
            parse_contacts_xml("<AddressBook></AddressBook>"),
            ImportOutcome::EmptyFile
        );
        assert_eq!(parse_contacts_xml("<AddressBook/>"), ImportOutcome::EmptyFile);
    }

    #[test]
    fn maps_every_field_by_tag_name() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<AddressBook>
  <Contact>
    <CustomerID>ALFKI</CustomerID>
    <CompanyName>Alfreds Futterkiste</CompanyName>
    <ContactName>Maria Anders</ContactName>
    <ContactTitle>Sales Representative</ContactTitle>
    <Address>Obere Str. 57</Address>
    <City>Berlin</City>
    <Email>maria@alfreds.de</Email>
    <PostalCode>12209</PostalCode>
    <Country>Germany</Country>
    <Phone>030-0074321</Phone>
    <Fax>030-0076545</Fax>
  </Contact>
</AddressBook>"#;

        let ImportOutcome::Success { count, contacts } = parse_contacts_xml(doc) else {
            panic!("expected success");
        };
        assert_eq!(count, 1);
        let maria = &contacts[0];
        assert_eq!(maria.customer_id, "ALFKI");
        assert_eq!(maria.company_name, "Alfreds Futterkiste");
        assert_eq!(maria.contact_name, "Maria Anders");
        assert_eq!(maria.contact_title, "Sales Representative");
        assert_eq!(maria.address, "Obere Str. 57");
        assert_eq!(maria.city, "Berlin");
        assert_eq!(maria.email, "maria@alfreds.de");
        assert_eq!(maria.postal_code, "12209");
        assert_eq!(maria.country, "Germany");
        assert_eq!(maria.phone, "030-0074321");
        assert_eq!(maria.fax, "030-0076545");
        assert_eq!(maria.id, 0);
    }

    #[test]
    fn counts_all_valid_records() {
        let doc = format!(
            "<AddressBook>{}{}{}</AddressBook>",
            contact_xml("Ann", "ann@example.com"),
            contact_xml("Bob", "bob@example.com"),
            contact_xml("Cid", "cid@example.com"),
        );
        match parse_contacts_xml(&doc) {
            ImportOutcome::Success { count, contacts } => {
                assert_eq!(count, 3);
                assert_eq!(contacts.len(), 3);
                assert_eq!(contacts[2].contact_name, "Cid");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn invalid_records_are_dropped_silently() {
        let doc = format!(
            "<AddressBook>{}<Contact><Email>nobody@example.com</Email></Contact>{}{}</AddressBook>",
            contact_xml("Ann", "ann@example.com"),
            contact_xml("Bad Email", "not-an-email"),
            contact_xml("Bob", "bob@example.com"),
        );
        match parse_contacts_xml(&doc) {
            ImportOutcome::Success { count, contacts } => {
                assert_eq!(count, 2);
                let names: Vec<_> = contacts.iter().map(|c| c.contact_name.as_str()).collect();
                assert_eq!(names, vec!["Ann", "Bob"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn only_invalid_records_is_empty_file() {
        let doc = "<AddressBook><Contact><ContactName>Ann</ContactName></Contact></AddressBook>";
        assert_eq!(parse_contacts_xml(doc), ImportOutcome::EmptyFile);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let doc = "<AddressBook><Contact><Nickname>Annie</Nickname><ContactName>Ann</ContactName>\
                   <Email>ann@example.com</Email><Birthday>1990-01-01</Birthday></Contact></AddressBook>";
        match parse_contacts_xml(doc) {
            ImportOutcome::Success { contacts, .. } => {
                assert_eq!(contacts[0], Contact::new("Ann", "ann@example.com"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn text_is_trimmed_and_unescaped() {
        let doc = "<AddressBook><Contact><ContactName>  Smith &amp; Sons  </ContactName>\
                   <Email><![CDATA[ops@smith.example]]></Email></Contact></AddressBook>";
        match parse_contacts_xml(doc) {
            ImportOutcome::Success { contacts, .. } => {
                assert_eq!(contacts[0].contact_name, "Smith & Sons");
                assert_eq!(contacts[0].email, "ops@smith.example");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn field_text_outside_a_record_is_ignored() {
        let doc = format!(
            "<AddressBook><ContactName>Stray</ContactName>{}</AddressBook>",
            contact_xml("Ann", "ann@example.com")
        );
        match parse_contacts_xml(&doc) {
            ImportOutcome::Success { count, contacts } => {
                assert_eq!(count, 1);
                assert_eq!(contacts[0].contact_name, "Ann");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn mismatched_tags_are_errors() {
        let doc = "<AddressBook><Contact><ContactName>Ann</Email></Contact></AddressBook>";
        assert!(matches!(parse_contacts_xml(doc), ImportOutcome::Error { .. }));
    }

    #[test]
    fn unclosed_structure_is_an_error() {
        let doc = "<AddressBook><Contact><ContactName>Ann</ContactName>";
        match parse_contacts_xml(doc) {
            ImportOutcome::Error { message } => assert!(message.contains("Contact")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn truncated_tag_is_an_error() {
        let doc = "<AddressBook><Contact";
        assert!(matches!(parse_contacts_xml(doc), ImportOutcome::Error { .. }));
    }
}
