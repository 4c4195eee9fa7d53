//! Sub-type tags carried inside sendable bodies and contact entries.

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown tag value.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} tag: {value:?}")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

impl ParseTagError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How a user relates to the current user's contact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    /// A plain contact.
    Contact,
}

impl ContactType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
        }
    }
}

impl std::str::FromStr for ContactType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(Self::Contact),
            _ => Err(ParseTagError::new("contact", s)),
        }
    }
}

/// Sub-type of a delivery receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryReceiptType {
    /// The referenced message reached the recipient's device.
    Received,
    /// The referenced message was displayed to the recipient.
    Read,
}

impl DeliveryReceiptType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Read => "read",
        }
    }
}

impl std::str::FromStr for DeliveryReceiptType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "read" => Ok(Self::Read),
            _ => Err(ParseTagError::new("delivery receipt", s)),
        }
    }
}

/// Sub-type of a typing-state indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypingStateType {
    /// The sender started typing.
    #[serde(rename = "typing")]
    Typing,
    /// The sender stopped typing.
    #[serde(rename = "")]
    None,
}

impl TypingStateType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::None => "",
        }
    }
}

impl std::str::FromStr for TypingStateType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "typing" => Ok(Self::Typing),
            "" => Ok(Self::None),
            _ => Err(ParseTagError::new("typing state", s)),
        }
    }
}

/// Sub-type of a presence update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceType {
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "busy")]
    Busy,
    /// Away for an extended period.
    #[serde(rename = "xa")]
    ExtendedAway,
    #[serde(rename = "unavailable")]
    Unavailable,
}

impl PresenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::ExtendedAway => "xa",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::str::FromStr for PresenceType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "busy" => Ok(Self::Busy),
            "xa" => Ok(Self::ExtendedAway),
            "unavailable" => Ok(Self::Unavailable),
            _ => Err(ParseTagError::new("presence", s)),
        }
    }
}

/// Sub-type of an invitation.
///
/// Only `Chat` invitations are actionable today; unrecognised sub-tags on
/// the wire are accepted and ignored by the invitation handler, so this
/// enum intentionally stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationType {
    /// An invitation to join a group chat.
    Chat,
}

impl InvitationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
        }
    }
}

impl std::str::FromStr for InvitationType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            _ => Err(ParseTagError::new("invitation", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips() {
        assert_eq!("received".parse::<DeliveryReceiptType>().unwrap().as_str(), "received");
        assert_eq!("read".parse::<DeliveryReceiptType>().unwrap().as_str(), "read");
        assert_eq!("typing".parse::<TypingStateType>().unwrap(), TypingStateType::Typing);
        assert_eq!("".parse::<TypingStateType>().unwrap(), TypingStateType::None);
        assert_eq!("xa".parse::<PresenceType>().unwrap(), PresenceType::ExtendedAway);
        assert_eq!("chat".parse::<InvitationType>().unwrap(), InvitationType::Chat);
        assert_eq!("contact".parse::<ContactType>().unwrap(), ContactType::Contact);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!("group".parse::<InvitationType>().is_err());
        assert!("seen".parse::<DeliveryReceiptType>().is_err());
    }
}
