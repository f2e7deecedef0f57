//! Request DTOs
//!
//! Messages a page posts to the proxy outside the normal fetch flow.

use serde::Deserialize;

/// A message sent by a client page.
///
/// Tagged by `type`, e.g. `{"type": "prefetchImages", "url": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Warm the neighbors of an image the user is about to view
    PrefetchImages {
        /// Absolute URL of the observed image
        url: String,
    },
}

impl ClientMessage {
    /// Validates the message payload.
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match self {
            ClientMessage::PrefetchImages { url } if url.trim().is_empty() => {
                Some("url cannot be empty".to_string())
            }
            ClientMessage::PrefetchImages { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefetch_message_deserialize() {
        let json = r#"{"type": "prefetchImages", "url": "http://img.test/IMG_0001.JPG"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::PrefetchImages {
                url: "http://img.test/IMG_0001.JPG".to_string()
            }
        );
        assert!(msg.validate().is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type": "clearCache"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_missing_url_rejected() {
        let json = r#"{"type": "prefetchImages"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_validate_empty_url() {
        let msg = ClientMessage::PrefetchImages {
            url: "  ".to_string(),
        };
        assert!(msg.validate().is_some());
    }
}
