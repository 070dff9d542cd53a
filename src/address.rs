//! Recipient address normalization

use crate::error::{SessiondError, SessiondResult};
use serde::Serialize;
use std::fmt;

/// Domain for individual accounts on the messaging network
pub const USER_DOMAIN: &str = "s.whatsapp.net";

/// Domain used by group conversations
pub const GROUP_DOMAIN: &str = "g.us";

/// A recipient in the network's internal addressing scheme (`user@domain`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalize caller input into a network address.
    ///
    /// Input that already carries a domain is passed through. Anything else
    /// is reduced to its digits; a bare 10-digit national number gets
    /// `country_code` prefixed when one is configured.
    pub fn normalize(input: &str, country_code: Option<&str>) -> SessiondResult<Self> {
        let trimmed = input.trim();

        if let Some((user, domain)) = trimmed.split_once('@') {
            if user.is_empty() || domain.is_empty() {
                return Err(SessiondError::InvalidAddress(input.to_string()));
            }
            return Ok(Self(trimmed.to_string()));
        }

        let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(SessiondError::InvalidAddress(input.to_string()));
        }

        if digits.len() == 10 {
            if let Some(code) = country_code {
                digits.insert_str(0, code);
            }
        }

        Ok(Self(format!("{}@{}", digits, USER_DOMAIN)))
    }

    /// Wrap an address received from the network without normalizing it
    pub fn from_network(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The part before `@` (a phone number for individual accounts)
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(&format!("@{}", GROUP_DOMAIN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
