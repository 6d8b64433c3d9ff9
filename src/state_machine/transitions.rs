//! Inbound routing decision.
//!
//! The webhook path resolves the user and their most recent live
//! conversation, then asks this table where the event goes. Keeping the
//! decision pure lets the routing policy be tested without a database.

use crate::state_machine::states::{ConversationStatus, UserStatus};

/// What the ingestion path knows at routing time.
#[derive(Debug, Clone, Copy)]
pub struct RoutingSnapshot {
    /// True when the user row was created by this event (first contact).
    pub user_created: bool,
    pub user_status: UserStatus,
    /// Most recently created live conversation, with campaign attachment.
    pub live_conversation: Option<(ConversationStatus, bool)>,
}

/// Handler an inbound event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundRoute {
    /// Resume or create the user's onboarding thread.
    Onboarding,
    /// Live campaign conversation awaiting or holding a two-way exchange.
    Campaign,
    /// Bounty notification awaiting accept/decline.
    Bounty,
    /// One-shot ad hoc thread for an onboarded user.
    General,
    /// No handler matches the (status, campaign) pair; degrade to general
    /// rather than failing the webhook path.
    GeneralFallback,
}

impl InboundRoute {
    /// Evaluate the routing policy in order: first contact forces
    /// onboarding; a live conversation dispatches by its (status, campaign
    /// presence) pair; otherwise the user's own status decides.
    pub fn decide(snapshot: RoutingSnapshot) -> Self {
        if snapshot.user_created {
            return Self::Onboarding;
        }

        match snapshot.live_conversation {
            Some((ConversationStatus::BountySent, true)) => Self::Bounty,
            Some((ConversationStatus::Active, true))
            | Some((ConversationStatus::OutreachSent, true)) => Self::Campaign,
            Some((ConversationStatus::Active, false)) => Self::Onboarding,
            Some(_) => Self::GeneralFallback,
            None => match snapshot.user_status {
                UserStatus::New | UserStatus::Onboarding => Self::Onboarding,
                UserStatus::Onboarded => Self::General,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        user_created: bool,
        user_status: UserStatus,
        live: Option<(ConversationStatus, bool)>,
    ) -> RoutingSnapshot {
        RoutingSnapshot {
            user_created,
            user_status,
            live_conversation: live,
        }
    }

    #[test]
    fn test_first_contact_forces_onboarding() {
        // Even with a live campaign conversation the force-route wins
        let route = InboundRoute::decide(snapshot(
            true,
            UserStatus::New,
            Some((ConversationStatus::Active, true)),
        ));
        assert_eq!(route, InboundRoute::Onboarding);
    }

    #[test]
    fn test_live_conversation_dispatch() {
        assert_eq!(
            InboundRoute::decide(snapshot(
                false,
                UserStatus::Onboarded,
                Some((ConversationStatus::BountySent, true)),
            )),
            InboundRoute::Bounty
        );
        assert_eq!(
            InboundRoute::decide(snapshot(
                false,
                UserStatus::Onboarded,
                Some((ConversationStatus::Active, true)),
            )),
            InboundRoute::Campaign
        );
        assert_eq!(
            InboundRoute::decide(snapshot(
                false,
                UserStatus::Onboarded,
                Some((ConversationStatus::OutreachSent, true)),
            )),
            InboundRoute::Campaign
        );
        assert_eq!(
            InboundRoute::decide(snapshot(
                false,
                UserStatus::Onboarding,
                Some((ConversationStatus::Active, false)),
            )),
            InboundRoute::Onboarding
        );
    }

    #[test]
    fn test_no_live_conversation_falls_back_to_user_status() {
        assert_eq!(
            InboundRoute::decide(snapshot(false, UserStatus::New, None)),
            InboundRoute::Onboarding
        );
        assert_eq!(
            InboundRoute::decide(snapshot(false, UserStatus::Onboarding, None)),
            InboundRoute::Onboarding
        );
        assert_eq!(
            InboundRoute::decide(snapshot(false, UserStatus::Onboarded, None)),
            InboundRoute::General
        );
    }

    #[test]
    fn test_unreachable_pair_degrades_to_general() {
        // A campaign-less bounty_sent conversation matches no handler
        let route = InboundRoute::decide(snapshot(
            false,
            UserStatus::Onboarded,
            Some((ConversationStatus::BountySent, false)),
        ));
        assert_eq!(route, InboundRoute::GeneralFallback);
    }
}
