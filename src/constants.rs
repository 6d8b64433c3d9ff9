//! # System Constants
//!
//! Shared constants for conversation routing and user onboarding. Status
//! groups live here so SQL builders and the state machine agree on the same
//! string sets.

/// Inbound bodies that close a conversation immediately, matched
/// case-insensitively against the trimmed message body.
pub const STOP_KEYWORDS: &[&str] = &["stop", "quit", "cancel", "end"];

/// Acknowledgment sent when a stop keyword closes a conversation.
pub const STOP_ACKNOWLEDGMENT: &str = "Understood — thanks for your time! Take care.";

/// Clarification re-ask when a bounty reply cannot be read as accept or
/// decline and the provider did not supply its own message.
pub const BOUNTY_CLARIFICATION: &str = "Just checking — want to jump in? Reply 'go' to start!";

/// Demographic fields a user must have before they count as onboarded.
pub const REQUIRED_DEMOGRAPHIC_FIELDS: &[&str] = &["city", "age_range", "gender"];

/// Statuses from which a conversation can still receive inbound traffic.
pub mod status_groups {
    /// Conversation statuses with no further transitions.
    pub const TERMINAL_CONVERSATION_STATUSES: &[&str] =
        &["completed", "declined", "abandoned", "failed", "expired"];

    /// Conversation statuses the inbound router treats as live threads.
    pub const LIVE_CONVERSATION_STATUSES: &[&str] = &["outreach_sent", "active", "bounty_sent"];
}

/// Returns true when the trimmed, lowercased body is a stop keyword.
pub fn is_stop_keyword(body: &str) -> bool {
    let normalized = body.trim().to_lowercase();
    STOP_KEYWORDS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_keyword_matching_is_case_insensitive() {
        assert!(is_stop_keyword("STOP"));
        assert!(is_stop_keyword("Stop"));
        assert!(is_stop_keyword("  quit  "));
        assert!(is_stop_keyword("End"));
    }

    #[test]
    fn test_stop_keyword_requires_exact_match() {
        assert!(!is_stop_keyword("please stop"));
        assert!(!is_stop_keyword("stopping"));
        assert!(!is_stop_keyword(""));
    }

    #[test]
    fn test_terminal_and_live_groups_are_disjoint() {
        for status in status_groups::LIVE_CONVERSATION_STATUSES {
            assert!(!status_groups::TERMINAL_CONVERSATION_STATUSES.contains(status));
        }
    }
}
