//! Caller identity.
//!
//! Every operation takes the caller explicitly. There is no ambient
//! "current user".

use std::collections::BTreeSet;

use crate::{ChatError, ParticipantId};

/// Who is calling into the chat core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// No signed-in user. Every operation fails with
    /// [`ChatError::NotAuthenticated`] before touching the store.
    Anonymous,
    /// A signed-in user.
    SignedIn(Caller),
}

impl Session {
    /// Session for a signed-in caller.
    pub fn signed_in(caller: Caller) -> Self {
        Self::SignedIn(caller)
    }

    /// The caller, or `NotAuthenticated`.
    pub fn caller(&self) -> Result<&Caller, ChatError> {
        match self {
            Self::SignedIn(caller) => Ok(caller),
            Self::Anonymous => Err(ChatError::NotAuthenticated),
        }
    }
}

/// A signed-in participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Participant id.
    pub id: ParticipantId,
    /// Profile display name.
    pub display_name: Option<String>,
    /// Account email.
    pub email: Option<String>,
    /// Participants this caller has blocked. Their messages are hidden.
    pub blocked: BTreeSet<ParticipantId>,
}

impl Caller {
    /// Caller with only an id.
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self { id: id.into(), display_name: None, email: None, blocked: BTreeSet::new() }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Block a participant.
    #[must_use]
    pub fn blocking(mut self, participant: impl Into<ParticipantId>) -> Self {
        self.blocked.insert(participant.into());
        self
    }

    /// Name shown to others: display name, else the email's local part, else
    /// `fallback`.
    pub fn nickname<'a>(&'a self, fallback: &'a str) -> &'a str {
        let display = self.display_name.as_deref().filter(|n| !n.trim().is_empty());
        let local_part = self
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty());
        display.or(local_part).unwrap_or(fallback)
    }
}
