//! Contact record and field-level validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NAME_REQUIRED: &str = "Name is required";
pub const EMAIL_REQUIRED: &str = "Email is required";
pub const EMAIL_INVALID: &str = "Invalid email format";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9+._%\-]{1,256}@[a-zA-Z0-9][a-zA-Z0-9\-]{0,64}(\.[a-zA-Z0-9][a-zA-Z0-9\-]{0,25})+$",
    )
    .expect("email pattern compiles")
});

/// A single address-book entry.
///
/// Serialized field names follow the bridge wire format (`contactName`,
/// `customerID`, ...). `id` is assigned by the store and is `0` until the
/// record has been persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    #[serde(rename = "contactName")]
    pub contact_name: String,
    #[serde(rename = "contactTitle")]
    pub contact_title: String,
    pub address: String,
    pub city: String,
    pub email: String,
    #[serde(rename = "postalCode")]
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub fax: String,
    pub id: i64,
}

impl Contact {
    pub fn new(contact_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            contact_name: contact_name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        is_valid_contact(self)
    }

    /// Check the required fields and report a message for each one that fails.
    pub fn validate(&self) -> FieldErrors {
        let name = if is_blank(&self.contact_name) {
            Some(NAME_REQUIRED.to_string())
        } else {
            None
        };

        let email = if is_blank(&self.email) {
            Some(EMAIL_REQUIRED.to_string())
        } else if !is_valid_email(&self.email) {
            Some(EMAIL_INVALID.to_string())
        } else {
            None
        };

        FieldErrors { name, email }
    }

    /// Copy of this contact with the store identity cleared.
    pub fn without_id(&self) -> Self {
        Self {
            id: 0,
            ..self.clone()
        }
    }

    pub fn get(&self, field: ContactField) -> &str {
        match field {
            ContactField::CustomerId => &self.customer_id,
            ContactField::CompanyName => &self.company_name,
            ContactField::ContactName => &self.contact_name,
            ContactField::ContactTitle => &self.contact_title,
            ContactField::Address => &self.address,
            ContactField::City => &self.city,
            ContactField::Email => &self.email,
            ContactField::PostalCode => &self.postal_code,
            ContactField::Country => &self.country,
            ContactField::Phone => &self.phone,
            ContactField::Fax => &self.fax,
        }
    }

    pub fn set(&mut self, field: ContactField, value: impl Into<String>) {
        let value = value.into();
        match field {
            ContactField::CustomerId => self.customer_id = value,
            ContactField::CompanyName => self.company_name = value,
            ContactField::ContactName => self.contact_name = value,
            ContactField::ContactTitle => self.contact_title = value,
            ContactField::Address => self.address = value,
            ContactField::City => self.city = value,
            ContactField::Email => self.email = value,
            ContactField::PostalCode => self.postal_code = value,
            ContactField::Country => self.country = value,
            ContactField::Phone => self.phone = value,
            ContactField::Fax => self.fax = value,
        }
    }
}

/// Validation messages for the required fields. `None` means the field passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }

    /// All messages joined into one line, name first.
    pub fn summary(&self) -> String {
        [self.name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The editable fields of a [`Contact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactField {
    CustomerId,
    CompanyName,
    ContactName,
    ContactTitle,
    Address,
    City,
    Email,
    PostalCode,
    Country,
    Phone,
    Fax,
}

impl ContactField {
    pub const ALL: [ContactField; 11] = [
        ContactField::CustomerId,
        ContactField::CompanyName,
        ContactField::ContactName,
        ContactField::ContactTitle,
        ContactField::Address,
        ContactField::City,
        ContactField::Email,
        ContactField::PostalCode,
        ContactField::Country,
        ContactField::Phone,
        ContactField::Fax,
    ];

    /// Element name used by the XML import format.
    pub fn tag(self) -> &'static str {
        match self {
            ContactField::CustomerId => "CustomerID",
            ContactField::CompanyName => "CompanyName",
            ContactField::ContactName => "ContactName",
            ContactField::ContactTitle => "ContactTitle",
            ContactField::Address => "Address",
            ContactField::City => "City",
            ContactField::Email => "Email",
            ContactField::PostalCode => "PostalCode",
            ContactField::Country => "Country",
            ContactField::Phone => "Phone",
            ContactField::Fax => "Fax",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.tag() == tag)
    }
}

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_PATTERN.is_match(s)
}

pub fn is_valid_contact(contact: &Contact) -> bool {
    !is_blank(&contact.contact_name) && !is_blank(&contact.email) && is_valid_email(&contact.email)
}
