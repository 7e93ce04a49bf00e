//! Tunables and user-facing strings.

use std::time::Duration;

/// Chat core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Subtracted from a participant's `joinedAt` when filtering messages.
    ///
    /// Absorbs skew between the moment a join is stamped and the server
    /// timestamp of a message sent in the same instant. Heuristic; tune
    /// against the deployment's observed clock skew.
    pub grace: Duration,

    /// Newest messages read by a message subscription.
    pub message_window: usize,

    /// Message ids remembered per reader and room to skip duplicate read
    /// receipts.
    pub read_cache_capacity: usize,

    /// Localized strings written into rooms and notifications.
    pub notices: Notices,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(1),
            message_window: 100,
            read_cache_capacity: 300,
            notices: Notices::default(),
        }
    }
}

/// Localized strings.
///
/// `{nick}` in a template is replaced with the acting participant's
/// nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notices {
    /// `lastMessage` of a freshly created room.
    pub room_opened: String,
    /// Sender name stored on system messages.
    pub system_name: String,
    /// Nickname of a caller with neither display name nor email.
    pub default_nickname: String,
    /// Title used in notifications for rooms without one.
    pub default_room_title: String,
    /// System message when a member leaves.
    pub member_left: String,
    /// Room preview when a member leaves.
    pub member_left_preview: String,
    /// System message (and preview) when the owner closes the room.
    pub owner_closed: String,
    /// Prefix of the preview for an image message with text.
    pub photo_prefix: String,
    /// Preview for an image message without text.
    pub photo_only: String,
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            room_opened: "Chat room opened.".to_string(),
            system_name: "System".to_string(),
            default_nickname: "user".to_string(),
            default_room_title: "Chat room".to_string(),
            member_left: "{nick} left the chat room.".to_string(),
            member_left_preview: "{nick} has left.".to_string(),
            owner_closed: "The host left the chat room. This chat has ended.".to_string(),
            photo_prefix: "📷".to_string(),
            photo_only: "📷 Sent a photo.".to_string(),
        }
    }
}

impl Notices {
    /// Fill `{nick}` in a template.
    pub fn render(template: &str, nick: &str) -> String {
        template.replace("{nick}", nick)
    }

    /// Room preview for a message.
    pub fn preview(&self, text: &str, has_image: bool) -> String {
        match (has_image, text.trim().is_empty()) {
            (false, _) => text.to_string(),
            (true, true) => self.photo_only.clone(),
            (true, false) => format!("{} {text}", self.photo_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.grace, Duration::from_secs(1));
        assert_eq!(config.message_window, 100);
        assert_eq!(config.read_cache_capacity, 300);
    }

    #[test]
    fn previews() {
        let notices = Notices::default();
        assert_eq!(notices.preview("hello", false), "hello");
        assert_eq!(notices.preview("look", true), "📷 look");
        assert_eq!(notices.preview("  ", true), "📷 Sent a photo.");
    }

    #[test]
    fn render_replaces_nick() {
        assert_eq!(Notices::render("{nick} has left.", "Mina"), "Mina has left.");
    }
}
