//! Directory schema names used by the client.

/// Attribute names.
pub(crate) mod attrs {
    pub(crate) const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
    pub(crate) const COMMON_NAME: &str = "cn";
    pub(crate) const DISPLAY_NAME: &str = "displayName";
    pub(crate) const MAIL: &str = "mail";
    pub(crate) const COMPANY: &str = "company";
    pub(crate) const DEPARTMENT: &str = "department";
    pub(crate) const TELEPHONE_NUMBER: &str = "telephoneNumber";
    pub(crate) const OFFICE: &str = "physicalDeliveryOfficeName";
    pub(crate) const MEMBER_OF: &str = "memberOf";
    pub(crate) const PWD_LAST_SET: &str = "pwdLastSet";
    pub(crate) const LOCKOUT_TIME: &str = "lockoutTime";
    pub(crate) const UNICODE_PWD: &str = "unicodePwd";

    // Postal address
    pub(crate) const STREET_ADDRESS: &str = "streetAddress";
    pub(crate) const PO_BOX: &str = "postOfficeBox";
    pub(crate) const CITY: &str = "l";
    pub(crate) const STATE: &str = "st";
    pub(crate) const POSTAL_CODE: &str = "postalCode";
    pub(crate) const COUNTRY: &str = "co";

    pub(crate) const ADDRESS: &[&str] = &[STREET_ADDRESS, PO_BOX, CITY, STATE, POSTAL_CODE, COUNTRY];
}

/// Filter clauses.
pub(crate) mod filters {
    /// Person accounts.
    pub(crate) const PERSON: &str = "(&(objectCategory=person)(objectClass=user))";

    /// Accounts without the ACCOUNTDISABLE bit in `userAccountControl`.
    pub(crate) const ENABLED: &str = "(!(userAccountControl:1.2.840.113556.1.4.803:=2))";

    /// Group objects.
    pub(crate) const GROUP: &str = "(objectCategory=group)";

    /// Any object; used for base-scope reads.
    pub(crate) const ANY: &str = "(objectClass=*)";
}
