//! User profile representation and helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Postal address stored on a directory account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailingAddress {
    /// First street line.
    pub street_line1: String,
    /// Second street line (text after the first line break).
    pub street_line2: String,
    /// Post office box.
    pub po_box: String,
    /// City (`l`).
    pub city: String,
    /// State or province (`st`).
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// Country name (`co`).
    pub country: String,
}

impl MailingAddress {
    /// Sets both street lines from a raw, possibly multi-line, street value.
    ///
    /// The value is split at the first line break; without one, line 2 is empty.
    #[must_use]
    pub fn with_street(mut self, street: &str) -> Self {
        let (line1, line2) = split_street(street);
        self.street_line1 = line1;
        self.street_line2 = line2;
        self
    }

    /// Returns true if no component is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn split_street(street: &str) -> (String, String) {
    match street.split_once('\n') {
        Some((first, rest)) => (
            first.strip_suffix('\r').unwrap_or(first).to_string(),
            rest.to_string(),
        ),
        None => (street.to_string(), String::new()),
    }
}

/// Representation of a directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account name (`sAMAccountName`).
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Primary email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Department.
    #[serde(default)]
    pub department: Option<String>,
    /// Telephone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Time the password was last set.
    #[serde(default)]
    pub password_last_set: Option<DateTime<Utc>>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<MailingAddress>,
    /// Group names the user belongs to, directly or through nesting.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserProfile {
    /// Creates a builder for a new profile.
    #[must_use]
    pub fn builder(username: impl Into<String>) -> UserProfileBuilder {
        UserProfileBuilder {
            username: username.into(),
            display_name: None,
            email: None,
            department: None,
            phone: None,
            password_last_set: None,
            address: None,
            groups: Vec::new(),
        }
    }

    /// Returns true if the user belongs to the provided group (case-insensitive).
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// Builder for [`UserProfile`].
#[derive(Debug)]
pub struct UserProfileBuilder {
    username: String,
    display_name: Option<String>,
    email: Option<String>,
    department: Option<String>,
    phone: Option<String>,
    password_last_set: Option<DateTime<Utc>>,
    address: Option<MailingAddress>,
    groups: Vec<String>,
}

impl UserProfileBuilder {
    /// Sets the display name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the department.
    #[must_use]
    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Sets the password-last-set timestamp.
    #[must_use]
    pub fn password_last_set(mut self, timestamp: DateTime<Utc>) -> Self {
        self.password_last_set = Some(timestamp);
        self
    }

    /// Sets the postal address.
    #[must_use]
    pub fn address(mut self, address: MailingAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Appends a group name unless it is already present (case-insensitive).
    #[must_use]
    pub fn add_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if !self.groups.iter().any(|g| g.eq_ignore_ascii_case(&group)) {
            self.groups.push(group);
        }
        self
    }

    /// Appends several group names, skipping duplicates.
    #[must_use]
    pub fn groups<I>(self, groups: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        groups.into_iter().fold(self, Self::add_group)
    }

    /// Finalises the builder and returns the [`UserProfile`].
    #[must_use]
    pub fn build(self) -> UserProfile {
        UserProfile {
            username: self.username,
            display_name: self.display_name,
            email: self.email,
            department: self.department,
            phone: self.phone,
            password_last_set: self.password_last_set,
            address: self.address,
            groups: self.groups,
        }
    }
}

/// Orders profiles by display name.
///
/// Profiles without a display name (absent or blank) come first and compare equal to each
/// other; named profiles compare byte-wise, so the order is case-sensitive.
#[must_use]
pub fn compare_users(a: &UserProfile, b: &UserProfile) -> Ordering {
    match (sort_name(a), sort_name(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => left.cmp(right),
    }
}

fn sort_name(profile: &UserProfile) -> Option<&str> {
    profile
        .display_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
}

/// Sorts profiles in place with [`compare_users`]; the sort is stable.
pub fn sort_users(users: &mut [UserProfile]) {
    users.sort_by(compare_users);
}
