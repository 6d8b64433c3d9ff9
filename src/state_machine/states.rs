use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation lifecycle states.
///
/// `Pending` conversations are queued but not yet contacted; the dispatcher
/// moves them to `OutreachSent` or `BountySent`, inbound processing moves
/// them through `Active` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Queued for outreach, not yet contacted
    Pending,
    /// Opening message delivered, awaiting first reply
    OutreachSent,
    /// Bounty notification delivered, awaiting accept/decline
    BountySent,
    /// Two-way exchange in progress
    Active,
    /// All data points collected
    Completed,
    /// Recipient declined the bounty
    Declined,
    /// Recipient sent a stop keyword
    Abandoned,
    /// Dispatch or processing raised an unrecoverable error
    Failed,
    /// Conversation aged out without completing
    Expired,
}

impl ConversationStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Declined | Self::Abandoned | Self::Failed | Self::Expired
        )
    }

    /// Check if inbound traffic can still be routed to this conversation
    pub fn is_live(&self) -> bool {
        matches!(self, Self::OutreachSent | Self::BountySent | Self::Active)
    }

    /// Whether the transition table permits moving to `next` from here.
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        use ConversationStatus::*;
        match (self, next) {
            (Pending, OutreachSent) | (Pending, BountySent) | (Pending, Failed) => true,
            (OutreachSent, Active) => true,
            (BountySent, Active) | (BountySent, Declined) => true,
            // Stop keywords close any live conversation
            (OutreachSent, Abandoned) | (BountySent, Abandoned) | (Active, Abandoned) => true,
            (Active, Completed) | (Active, Failed) | (Active, Expired) => true,
            (OutreachSent, Expired) | (BountySent, Expired) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::OutreachSent => "outreach_sent",
            Self::BountySent => "bounty_sent",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "outreach_sent" => Ok(Self::OutreachSent),
            "bounty_sent" => Ok(Self::BountySent),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "declined" => Ok(Self::Declined),
            "abandoned" => Ok(Self::Abandoned),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid conversation status: {s}")),
        }
    }
}

impl Default for ConversationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// User lifecycle states. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Created on first inbound contact, nothing collected yet
    New,
    /// Onboarding conversation in progress
    Onboarding,
    /// All required demographic fields collected
    Onboarded,
}

impl UserStatus {
    pub fn is_onboarded(&self) -> bool {
        matches!(self, Self::Onboarded)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Onboarding => "onboarding",
            Self::Onboarded => "onboarded",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "onboarding" => Ok(Self::Onboarding),
            "onboarded" => Ok(Self::Onboarded),
            _ => Err(format!("Invalid user status: {s}")),
        }
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Campaign lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    /// Launch is valid only from draft or paused.
    pub fn can_launch(&self) -> bool {
        matches!(self, Self::Draft | Self::Paused)
    }

    /// Pause is valid only from active.
    pub fn can_pause(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid campaign status: {s}")),
        }
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Outreach queue entry states. `Sent` doubles as the in-flight claim
/// marker; an entry is fully dispatched once `sent_at` is stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Sent,
    Paused,
    Failed,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Paused => "paused",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "paused" => Ok(Self::Paused),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid queue status: {s}")),
        }
    }
}

/// Message sender attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Agent,
}

impl fmt::Display for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for MessageSender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            _ => Err(format!("Invalid message sender: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_terminal_check() {
        assert!(ConversationStatus::Completed.is_terminal());
        assert!(ConversationStatus::Declined.is_terminal());
        assert!(ConversationStatus::Abandoned.is_terminal());
        assert!(ConversationStatus::Failed.is_terminal());
        assert!(ConversationStatus::Expired.is_terminal());
        assert!(!ConversationStatus::Pending.is_terminal());
        assert!(!ConversationStatus::Active.is_terminal());
        assert!(!ConversationStatus::BountySent.is_terminal());
    }

    #[test]
    fn test_live_statuses_route_inbound() {
        assert!(ConversationStatus::OutreachSent.is_live());
        assert!(ConversationStatus::BountySent.is_live());
        assert!(ConversationStatus::Active.is_live());
        assert!(!ConversationStatus::Pending.is_live());
        assert!(!ConversationStatus::Completed.is_live());
    }

    #[test]
    fn test_transition_table() {
        use ConversationStatus::*;
        assert!(Pending.can_transition_to(OutreachSent));
        assert!(Pending.can_transition_to(BountySent));
        assert!(OutreachSent.can_transition_to(Active));
        assert!(BountySent.can_transition_to(Active));
        assert!(BountySent.can_transition_to(Declined));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Abandoned));

        // No transitions out of terminal states
        assert!(!Completed.can_transition_to(Active));
        assert!(!Declined.can_transition_to(Active));
        // No skipping the opening message
        assert!(!Pending.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_campaign_lifecycle_guards() {
        assert!(CampaignStatus::Draft.can_launch());
        assert!(CampaignStatus::Paused.can_launch());
        assert!(!CampaignStatus::Active.can_launch());
        assert!(!CampaignStatus::Completed.can_launch());
        assert!(CampaignStatus::Active.can_pause());
        assert!(!CampaignStatus::Draft.can_pause());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(ConversationStatus::OutreachSent.to_string(), "outreach_sent");
        assert_eq!(
            "bounty_sent".parse::<ConversationStatus>().unwrap(),
            ConversationStatus::BountySent
        );
        assert_eq!("onboarded".parse::<UserStatus>().unwrap(), UserStatus::Onboarded);
        assert_eq!(QueueStatus::Paused.to_string(), "paused");
        assert_eq!("agent".parse::<MessageSender>().unwrap(), MessageSender::Agent);
        assert!("bogus".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let status = ConversationStatus::BountySent;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"bounty_sent\"");
        let parsed: ConversationStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
