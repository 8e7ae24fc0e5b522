//! Contacts, their delivery status, and phone number normalization
//!
//! A [`Contact`] keeps the number exactly as it appeared in the sheet. The
//! chat address is derived on demand through an [`AddressPolicy`], which
//! strips formatting and adds the country code when it is missing.
//!
//! ## Status Lifecycle
//!
//! ```text
//! Pending -> Processing -> { NotOnService | Sent | Failed }
//! ```
//!
//! Transitions only move forward within a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::ContentKind;

/// Country code prepended to numbers written without one
pub const DEFAULT_COUNTRY_CODE: &str = "91";

/// Digit count of a national number without country code
pub const DEFAULT_NATIONAL_NUMBER_LENGTH: usize = 10;

const CHAT_ID_SUFFIX: &str = "@c.us";

/// Delivery status of one contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Processing,
    /// The number has no account on the messaging service
    NotOnService,
    Sent,
    Failed,
}

impl ContactStatus {
    /// Whether no further transition is possible in this run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContactStatus::NotOnService | ContactStatus::Sent | ContactStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: ContactStatus) -> bool {
        use ContactStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, NotOnService) | (Processing, Sent) | (Processing, Failed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ContactStatus::Pending => "Pending",
            ContactStatus::Processing => "Processing",
            ContactStatus::NotOnService => "Not on WhatsApp",
            ContactStatus::Sent => "Sent",
            ContactStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized, service-ready chat address (international digits only)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatAddress {
    digits: String,
}

impl ChatAddress {
    pub fn from_digits(digits: impl Into<String>) -> Self {
        Self {
            digits: digits.into(),
        }
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Chat identifier in the `<digits>@c.us` form used by whatsapp-web
    pub fn chat_id(&self) -> String {
        format!("{}{}", self.digits, CHAT_ID_SUFFIX)
    }
}

impl fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.digits)
    }
}

/// How raw sheet numbers are turned into chat addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPolicy {
    /// Country code digits, without `+`
    pub country_code: String,
    /// Digits in a national number; longer numbers that already start with
    /// the country code are taken as international
    pub national_number_length: usize,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            national_number_length: DEFAULT_NATIONAL_NUMBER_LENGTH,
        }
    }
}

impl AddressPolicy {
    /// Normalize a raw number
    ///
    /// Non-digits are dropped. A leading `+` or `00` marks the number as
    /// already international. Otherwise the country code is prepended unless
    /// the digits are longer than a national number and already begin with it.
    /// Degenerate input (no digits) is not rejected; the gateway decides.
    ///
    /// ```rust
    /// use bulk_messenger_core::AddressPolicy;
    ///
    /// let policy = AddressPolicy::default();
    /// assert_eq!(policy.normalize("98765-43210").chat_id(), "919876543210@c.us");
    /// assert_eq!(policy.normalize("+91 98765 43210").digits(), "919876543210");
    /// ```
    pub fn normalize(&self, raw: &str) -> ChatAddress {
        let trimmed = raw.trim();
        let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

        let dialed_prefix = trimmed.starts_with("00");
        if dialed_prefix {
            digits.drain(..2);
        }

        let international = trimmed.starts_with('+')
            || dialed_prefix
            || (digits.len() > self.national_number_length
                && digits.starts_with(&self.country_code));

        if !international {
            digits.insert_str(0, &self.country_code);
        }

        ChatAddress { digits }
    }
}

/// What was delivered to a contact during its processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: Vec<ContentKind>,
    pub error: Option<String>,
}

/// One row of the contact sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    raw_number: String,
    status: ContactStatus,
    report: DeliveryReport,
}

impl Contact {
    pub fn new(raw_number: impl Into<String>) -> Self {
        Self {
            raw_number: raw_number.into(),
            status: ContactStatus::Pending,
            report: DeliveryReport::default(),
        }
    }

    pub fn raw_number(&self) -> &str {
        &self.raw_number
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    pub fn report(&self) -> &DeliveryReport {
        &self.report
    }

    pub fn address(&self, policy: &AddressPolicy) -> ChatAddress {
        policy.normalize(&self.raw_number)
    }

    /// Apply a forward transition; returns false and leaves the status
    /// unchanged when the transition is not allowed
    pub(crate) fn transition(&mut self, next: ContactStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn record_delivery(&mut self, kind: ContentKind) {
        self.report.delivered.push(kind);
    }

    pub(crate) fn record_error(&mut self, error: impl Into<String>) {
        self.report.error = Some(error.into());
    }

    /// Fresh copy for a new run
    pub(crate) fn reset(self) -> Self {
        Self::new(self.raw_number)
    }
}

/// Ordered contacts as loaded from a sheet, editable before a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactList {
    contacts: Vec<Contact>,
}

impl ContactList {
    pub fn from_numbers<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contacts: numbers.into_iter().map(Contact::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Contact> {
        self.contacts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn push(&mut self, raw_number: impl Into<String>) {
        self.contacts.push(Contact::new(raw_number));
    }

    /// Replace the number at `index`, resetting that contact to pending
    pub fn update_number(&mut self, index: usize, raw_number: impl Into<String>) -> bool {
        match self.contacts.get_mut(index) {
            Some(contact) => {
                *contact = Contact::new(raw_number);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Contact> {
        (index < self.contacts.len()).then(|| self.contacts.remove(index))
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }
}

impl From<Vec<Contact>> for ContactList {
    fn from(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

impl IntoIterator for ContactList {
    type Item = Contact;
    type IntoIter = std::vec::IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_national_number() {
        let policy = AddressPolicy::default();
        let address = policy.normalize("98765 43210");
        assert_eq!(address.digits(), "919876543210");
        assert_eq!(address.chat_id(), "919876543210@c.us");
        assert_eq!(address.to_string(), "+919876543210");
    }

    #[test]
    fn test_normalize_keeps_existing_prefix() {
        let policy = AddressPolicy::default();
        assert_eq!(policy.normalize("+91-98765-43210").digits(), "919876543210");
        assert_eq!(policy.normalize("919876543210").digits(), "919876543210");
        assert_eq!(policy.normalize("0091 98765 43210").digits(), "919876543210");
    }

    #[test]
    fn test_normalize_other_country() {
        let policy = AddressPolicy::default();
        assert_eq!(policy.normalize("+1 (555) 123-4567").digits(), "15551234567");
    }

    #[test]
    fn test_national_number_starting_with_country_code() {
        // ten digits that happen to begin with 91 are still national
        let policy = AddressPolicy::default();
        assert_eq!(policy.normalize("9198765432").digits(), "919198765432");
    }

    #[test]
    fn test_normalize_short_and_empty() {
        let policy = AddressPolicy::default();
        assert_eq!(policy.normalize("1234").digits(), "911234");
        assert_eq!(policy.normalize("n/a").digits(), "91");
    }

    #[test]
    fn test_custom_policy() {
        let policy = AddressPolicy {
            country_code: "44".to_string(),
            national_number_length: 10,
        };
        assert_eq!(policy.normalize("7700 900123").digits(), "447700900123");
    }

    #[test]
    fn test_status_transitions_forward_only() {
        use ContactStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Sent));
        assert!(Processing.can_transition_to(NotOnService));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Pending));
    }

    #[test]
    fn test_contact_transition() {
        let mut contact = Contact::new("9876543210");
        assert!(!contact.transition(ContactStatus::Sent));
        assert_eq!(contact.status(), ContactStatus::Pending);

        assert!(contact.transition(ContactStatus::Processing));
        assert!(contact.transition(ContactStatus::Sent));
        assert!(contact.status().is_terminal());
        assert!(!contact.transition(ContactStatus::Failed));
        assert_eq!(contact.status(), ContactStatus::Sent);
    }

    #[test]
    fn test_reset_clears_report() {
        let mut contact = Contact::new("1");
        contact.transition(ContactStatus::Processing);
        contact.record_delivery(ContentKind::Image);
        contact.record_error("boom");
        let fresh = contact.reset();
        assert_eq!(fresh.status(), ContactStatus::Pending);
        assert_eq!(fresh.report(), &DeliveryReport::default());
        assert_eq!(fresh.raw_number(), "1");
    }

    #[test]
    fn test_list_edits() {
        let mut list = ContactList::from_numbers(["111", "222", "333"]);
        assert_eq!(list.len(), 3);

        assert!(list.update_number(1, "999"));
        assert_eq!(list.get(1).map(Contact::raw_number), Some("999"));
        assert!(!list.update_number(7, "000"));

        let removed = list.remove(0).unwrap();
        assert_eq!(removed.raw_number(), "111");
        assert!(list.remove(5).is_none());

        let numbers: Vec<_> = list.iter().map(|c| c.raw_number().to_string()).collect();
        assert_eq!(numbers, vec!["999", "333"]);
    }

    #[test]
    fn test_status_label() {
        assert_eq!(ContactStatus::NotOnService.to_string(), "Not on WhatsApp");
        assert_eq!(ContactStatus::Pending.label(), "Pending");
    }
}
