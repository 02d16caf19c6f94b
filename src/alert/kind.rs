//! Alert kind classification
//!
//! The closed set of notification-worthy conditions the engine detects.
//! Kinds are not mutually exclusive: one visit event may satisfy several
//! at once, and each match becomes its own alert row.

use serde::{Deserialize, Serialize};

/// Alert condition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Visitor's self-reported company matches the campaign target
    HighValueVisitor,
    /// Job title looks like a decision maker
    ExecutiveVisit,
    /// Five or more chat messages in one session
    MultipleChatMessages,
    /// Form submitted flag set
    FormSubmission,
    /// Call-to-action clicked flag set
    CtaClicked,
    /// Known visitor with meaningful prior engagement
    ReturningVisitor,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HighValueVisitor => "high_value_visitor",
            AlertKind::ExecutiveVisit => "executive_visit",
            AlertKind::MultipleChatMessages => "multiple_chat_messages",
            AlertKind::FormSubmission => "form_submission",
            AlertKind::CtaClicked => "cta_clicked",
            AlertKind::ReturningVisitor => "returning_visitor",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde_form() {
        let kinds = [
            AlertKind::HighValueVisitor,
            AlertKind::ExecutiveVisit,
            AlertKind::MultipleChatMessages,
            AlertKind::FormSubmission,
            AlertKind::CtaClicked,
            AlertKind::ReturningVisitor,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_deserialize_snake_case() {
        let kind: AlertKind = serde_json::from_str("\"executive_visit\"").unwrap();
        assert_eq!(kind, AlertKind::ExecutiveVisit);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", AlertKind::CtaClicked), "cta_clicked");
    }
}
