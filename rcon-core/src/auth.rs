//! Recognising a successful login.
//!
//! The opcode variant has no structured success field: the server
//! answers the auth packet with free text, and a known phrase in that
//! text means the password was accepted. The phrase differs between
//! server configurations, so it is data, not a constant.

use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// The phrase stock servers reply with.
pub const DEFAULT_ACCEPT_PHRASE: &str = "Password Accepted";

/// Phrases seen from bridges and modded servers.
const LENIENT_PHRASES: &[&str] = &[
    "logged in",
    "authentication successful",
    "welcome",
    "admin logged in",
    "authenticated",
    "connected",
    "rcon authenticated",
    "password accepted",
];

/// Substring matcher applied to the body of the auth response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthMatcher {
    /// Any one of these appearing in the response means success.
    pub phrases: Vec<String>,
    /// Compare lower-cased.
    pub case_insensitive: bool,
}

impl Default for AuthMatcher {
    fn default() -> Self {
        Self::phrase(DEFAULT_ACCEPT_PHRASE)
    }
}

impl AuthMatcher {
    /// Match a single phrase, case-sensitively.
    pub fn phrase(phrase: impl Into<String>) -> Self {
        Self {
            phrases: vec![phrase.into()],
            case_insensitive: false,
        }
    }

    /// The broad indicator list, case-insensitive.
    pub fn lenient() -> Self {
        Self {
            phrases: LENIENT_PHRASES.iter().map(|s| s.to_string()).collect(),
            case_insensitive: true,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.case_insensitive {
            let text = text.to_lowercase();
            self.phrases
                .iter()
                .any(|p| text.contains(&p.to_lowercase()))
        } else {
            self.phrases.iter().any(|p| text.contains(p.as_str()))
        }
    }

    pub fn accepts(&self, packet: &Packet) -> bool {
        self.matches(&packet.text())
    }
}
