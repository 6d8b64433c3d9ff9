//! Cross-module tests of the orchestration logic that is computable without
//! a live database: scheduling arithmetic, routing policy, demographic
//! monotonicity, and the bounty decision contract.

use proptest::prelude::*;

use mesh_core::agent::{AgentReply, BountyDecision};
use mesh_core::constants::is_stop_keyword;
use mesh_core::stagger_offset_seconds;
use mesh_core::{ConversationStatus, InboundRoute, RoutingSnapshot, UserStatus};

#[test]
fn launch_schedule_matches_rate_ceiling() {
    // rate=10/min and 25 recipients: entries 0-9 at +0..54s (6s apart),
    // 10-19 at +60..114s, 20-24 at +120..144s
    let offsets: Vec<i64> = (0..25).map(|i| stagger_offset_seconds(i, 10)).collect();

    assert_eq!(offsets[0], 0);
    assert_eq!(offsets[9], 54);
    assert_eq!(offsets[10], 60);
    assert_eq!(offsets[19], 114);
    assert_eq!(offsets[20], 120);
    assert_eq!(offsets[24], 144);

    for pair in offsets.windows(2) {
        assert_eq!(pair[1] - pair[0], 6);
    }

    // No minute ever carries more than the rate ceiling
    for minute in 0..3 {
        let in_minute = offsets
            .iter()
            .filter(|&&o| o >= minute * 60 && o < (minute + 1) * 60)
            .count();
        assert!(in_minute <= 10);
    }
}

#[test]
fn reactivated_entries_precede_new_ones_on_the_stagger() {
    // Resuming a paused campaign: 3 reactivated entries take positions 0-2,
    // new entries start at position 3 and never schedule earlier
    let reactivated: Vec<i64> = (0..3).map(|i| stagger_offset_seconds(i, 10)).collect();
    let fresh: Vec<i64> = (3..8).map(|i| stagger_offset_seconds(i, 10)).collect();

    let last_reactivated = *reactivated.last().unwrap();
    assert!(fresh.iter().all(|&o| o > last_reactivated));

    // Relative order within each group is preserved by position
    assert!(reactivated.windows(2).all(|w| w[0] <= w[1]));
    assert!(fresh.windows(2).all(|w| w[0] <= w[1]));
}

proptest! {
    #[test]
    fn stagger_is_monotone_in_position(rate in 1u32..240, positions in 1usize..500) {
        let mut last = -1i64;
        for position in 0..positions {
            let offset = stagger_offset_seconds(position, rate);
            prop_assert!(offset >= last);
            last = offset;
        }
    }

    #[test]
    fn stagger_never_exceeds_rate_per_minute(rate in 1u32..120) {
        let offsets: Vec<i64> = (0..(rate as usize * 3))
            .map(|i| stagger_offset_seconds(i, rate))
            .collect();
        for minute in 0..3i64 {
            let in_minute = offsets
                .iter()
                .filter(|&&o| o >= minute * 60 && o < (minute + 1) * 60)
                .count();
            prop_assert!(in_minute <= rate as usize);
        }
    }
}

#[test]
fn stop_keywords_close_from_any_case() {
    for body in ["STOP", "Stop", "stop", "QUIT", "Cancel", " end "] {
        assert!(is_stop_keyword(body), "{body:?} should stop");
    }
    for body in ["stop it", "no", "go", ""] {
        assert!(!is_stop_keyword(body), "{body:?} should not stop");
    }
}

#[test]
fn routing_covers_the_policy_table() {
    let decide = |user_created, user_status, live| {
        InboundRoute::decide(RoutingSnapshot {
            user_created,
            user_status,
            live_conversation: live,
        })
    };

    // (1)-(2): unknown sender is forced into onboarding
    assert_eq!(
        decide(true, UserStatus::New, None),
        InboundRoute::Onboarding
    );

    // (3)+(6): live conversation dispatches on (status, campaign presence)
    assert_eq!(
        decide(false, UserStatus::Onboarded, Some((ConversationStatus::BountySent, true))),
        InboundRoute::Bounty
    );
    assert_eq!(
        decide(false, UserStatus::Onboarded, Some((ConversationStatus::Active, true))),
        InboundRoute::Campaign
    );
    assert_eq!(
        decide(false, UserStatus::Onboarded, Some((ConversationStatus::OutreachSent, true))),
        InboundRoute::Campaign
    );
    assert_eq!(
        decide(false, UserStatus::Onboarding, Some((ConversationStatus::Active, false))),
        InboundRoute::Onboarding
    );

    // (4): no live thread, user still onboarding
    assert_eq!(
        decide(false, UserStatus::Onboarding, None),
        InboundRoute::Onboarding
    );

    // (5): no live thread, onboarded user gets the one-shot general mode
    assert_eq!(
        decide(false, UserStatus::Onboarded, None),
        InboundRoute::General
    );

    // Unreachable combination degrades instead of raising
    assert_eq!(
        decide(false, UserStatus::Onboarded, Some((ConversationStatus::BountySent, false))),
        InboundRoute::GeneralFallback
    );
}

#[test]
fn terminal_statuses_accept_no_transitions() {
    use ConversationStatus::*;
    let all = [
        Pending, OutreachSent, BountySent, Active, Completed, Declined, Abandoned, Failed, Expired,
    ];
    for from in all.iter().filter(|s| s.is_terminal()) {
        for to in &all {
            assert!(
                !from.can_transition_to(*to),
                "{from} must not transition to {to}"
            );
        }
    }
}

#[test]
fn bounty_flag_decodes_as_three_variants() {
    let reply = |flag: Option<bool>| AgentReply {
        message: "ok".to_string(),
        extracted_data_update: serde_json::Map::new(),
        user_demographics_update: serde_json::Map::new(),
        conversation_complete: false,
        bounty_accepted: flag,
    };

    assert_eq!(reply(Some(true)).bounty_decision(), BountyDecision::Accepted);
    assert_eq!(reply(Some(false)).bounty_decision(), BountyDecision::Declined);
    // Unset is ambiguity, never a decline
    assert_eq!(reply(None).bounty_decision(), BountyDecision::Ambiguous);
}

mod demographics {
    use chrono::Utc;
    use mesh_core::models::{DemographicsUpdate, User};
    use mesh_core::UserStatus;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn user(status: &str, fields: [Option<&str>; 4]) -> User {
        User {
            id: Uuid::new_v4(),
            phone_number: "+14155550100".to_string(),
            status: status.to_string(),
            city: fields[0].map(String::from),
            neighborhood: fields[1].map(String::from),
            age_range: fields[2].map(String::from),
            gender: fields[3].map(String::from),
            created_at: Utc::now(),
        }
    }

    fn opt_field() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z]{1,8}")
    }

    proptest! {
        #[test]
        fn merge_never_unsets_a_collected_field(
            city in opt_field(),
            age_range in opt_field(),
            gender in opt_field(),
        ) {
            let existing = user("onboarding", [Some("Dubai"), None, Some("25-34"), None]);
            let update = DemographicsUpdate { city, neighborhood: None, age_range, gender };
            let merge = update.merge_into(&existing);
            // Fields the user already had stay present whatever the update
            prop_assert!(merge.city.is_some());
            prop_assert!(merge.age_range.is_some());
        }

        #[test]
        fn onboarded_is_monotonic(
            city in opt_field(),
            age_range in opt_field(),
            gender in opt_field(),
        ) {
            let onboarded = user(
                "onboarded",
                [Some("Dubai"), None, Some("25-34"), Some("Female")],
            );
            let update = DemographicsUpdate { city, neighborhood: None, age_range, gender };
            let merge = update.merge_into(&onboarded);
            // No sequence of further updates reverts an onboarded user
            prop_assert_eq!(merge.status, UserStatus::Onboarded);
            prop_assert!(!merge.newly_onboarded);
        }
    }

    #[test]
    fn transition_fires_exactly_when_required_set_completes() {
        let existing = user("onboarding", [Some("Dubai"), None, Some("25-34"), None]);
        let update = DemographicsUpdate {
            gender: Some("Male".to_string()),
            ..Default::default()
        };
        let merge = update.merge_into(&existing);
        assert!(merge.newly_onboarded);
        assert_eq!(merge.status, UserStatus::Onboarded);
    }
}
