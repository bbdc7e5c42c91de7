//! Business identifiers: national identity numbers and organization numbers.
//!
//! Both are validated on construction and on deserialisation so that a
//! malformed upstream record fails at the decoding boundary rather than
//! creating an aggregate keyed by garbage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// An 11-digit national identity number. The aggregate's business key.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct PersonIdent(String);

impl PersonIdent {
  pub const LENGTH: usize = 11;

  pub fn new(value: impl Into<String>) -> Result<Self, Error> {
    let value = value.into();
    if value.len() == Self::LENGTH && value.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidPersonIdent(value))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for PersonIdent {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PersonIdent> for String {
  fn from(value: PersonIdent) -> Self { value.0 }
}

impl fmt::Display for PersonIdent {
  // Identity numbers are personal data; only the birth-date part is shown.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}*****", &self.0[..6])
  }
}

/// A 9-digit organization number. Immutable business key of an
/// [`OrgAssociation`](crate::status::OrgAssociation).
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationNumber(String);

impl OrganizationNumber {
  pub const LENGTH: usize = 9;

  pub fn new(value: impl Into<String>) -> Result<Self, Error> {
    let value = value.into();
    if value.len() == Self::LENGTH && value.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidOrganizationNumber(value))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for OrganizationNumber {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<OrganizationNumber> for String {
  fn from(value: OrganizationNumber) -> Self { value.0 }
}

impl fmt::Display for OrganizationNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn person_ident_requires_eleven_digits() {
    assert!(PersonIdent::new("12345678901").is_ok());
    assert!(PersonIdent::new("1234567890").is_err());
    assert!(PersonIdent::new("1234567890a").is_err());
  }

  #[test]
  fn person_ident_display_masks_suffix() {
    let ident = PersonIdent::new("01017012345").unwrap();
    assert_eq!(ident.to_string(), "010170*****");
  }

  #[test]
  fn person_ident_deserialises_with_validation() {
    let ok: PersonIdent = serde_json::from_str("\"01017012345\"").unwrap();
    assert_eq!(ok.as_str(), "01017012345");
    assert!(serde_json::from_str::<PersonIdent>("\"nope\"").is_err());
  }

  #[test]
  fn organization_number_requires_nine_digits() {
    assert!(OrganizationNumber::new("974600951").is_ok());
    assert!(OrganizationNumber::new("97460095").is_err());
  }
}
