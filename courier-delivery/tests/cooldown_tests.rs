#![allow(clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use courier_common::{EmailType, RecipientHasher, mocks::MockClock};
use courier_delivery::{CooldownConfig, CooldownDecision, CooldownGate, MAX_COOLDOWN_SECS};
use courier_monitor::{EventLog, MonitorConfig, NewLogEntry};
use pretty_assertions::assert_eq;

fn gate_with(config: MonitorConfig) -> (CooldownGate, Arc<EventLog>, MockClock) {
    let clock = MockClock::default();
    let monitor = Arc::new(EventLog::new(config, Arc::new(clock.clone())).expect("valid config"));
    let gate = CooldownGate::new(
        &CooldownConfig::default(),
        monitor.clone(),
        RecipientHasher::default(),
        Arc::new(clock.clone()),
    );
    (gate, monitor, clock)
}

fn gate() -> (CooldownGate, Arc<EventLog>, MockClock) {
    gate_with(MonitorConfig::default())
}

#[test]
fn test_second_check_within_cooldown_is_refused() {
    let (gate, _, clock) = gate();

    assert!(gate.check("user-1", None));
    assert!(!gate.check("user-1", None));
    assert!(gate.check("user-2", None));

    clock.advance(Duration::from_secs(61));
    assert!(gate.check("user-1", None));
}

#[test]
fn test_keys_are_normalised_before_hashing() {
    let (gate, _, _) = gate();

    assert!(gate.check("Alice@Example.com", None));
    assert!(!gate.check("  alice@example.com ", None));
    assert_eq!(gate.len(), 1);
}

#[test]
fn test_refused_check_does_not_extend_cooldown() {
    let (gate, _, clock) = gate();

    assert!(gate.check("user-1", None));
    clock.advance(Duration::from_secs(30));
    assert!(!gate.check("user-1", None));

    clock.advance(Duration::from_secs(31));
    assert!(gate.check("user-1", None));
}

#[test]
fn test_remaining_seconds_rounds_up() {
    let (gate, _, clock) = gate();

    assert_eq!(gate.remaining_seconds("user-1"), 0);
    assert!(gate.check("user-1", None));
    assert_eq!(gate.remaining_seconds("user-1"), 60);

    clock.advance(Duration::from_millis(10_500));
    assert_eq!(gate.remaining_seconds("user-1"), 50);

    clock.advance(Duration::from_secs(50));
    assert_eq!(gate.remaining_seconds("user-1"), 0);
}

#[test]
fn test_detailed_reports_remaining() {
    let (gate, _, clock) = gate();

    assert_eq!(gate.check_detailed("user-1", None), CooldownDecision::Allowed);
    clock.advance(Duration::from_secs(45));
    assert_eq!(
        gate.check_detailed("user-1", None),
        CooldownDecision::CoolingDown {
            remaining: Duration::from_secs(15)
        }
    );
}

#[test]
fn test_user_quota_blocks_even_after_cooldown() {
    let (gate, monitor, clock) = gate_with(MonitorConfig {
        max_emails_per_user_per_hour: 2,
        ..MonitorConfig::default()
    });
    let hash = RecipientHasher::default().hash("user-1");

    for _ in 0..2 {
        monitor.record(NewLogEntry::success(EmailType::Reset, hash.clone()));
    }
    clock.advance(Duration::from_secs(120));

    assert_eq!(
        gate.check_detailed("user-1", Some(EmailType::Reset)),
        CooldownDecision::UserQuotaExceeded
    );
    assert!(gate.check("user-1", Some(EmailType::Invite)));
    assert_eq!(gate.remaining_seconds("user-1"), 60);
}

#[test]
fn test_type_quota_blocks() {
    let (gate, monitor, _) = gate_with(MonitorConfig {
        max_emails_per_type_per_hour: 3,
        ..MonitorConfig::default()
    });
    let hasher = RecipientHasher::default();

    for user in ["a", "b", "c"] {
        monitor.record(NewLogEntry::success(
            EmailType::Verification,
            hasher.hash(user),
        ));
    }

    assert_eq!(
        gate.check_detailed("d", Some(EmailType::Verification)),
        CooldownDecision::TypeQuotaExceeded
    );
    assert_eq!(gate.remaining_seconds("d"), 0);
    assert!(gate.check("d", None));
}

#[test]
fn test_cleanup_drops_stale_entries() {
    let (gate, _, clock) = gate();

    assert!(gate.check("old", None));
    clock.advance(Duration::from_secs(30 * 60));
    assert!(gate.check("recent", None));
    clock.advance(Duration::from_secs(31 * 60));

    assert_eq!(gate.cleanup(), 1);
    assert_eq!(gate.len(), 1);
    assert_eq!(gate.cleanup(), 0);
}

#[test]
fn test_oversized_cooldown_is_rejected() {
    let config = CooldownConfig {
        cooldown_secs: MAX_COOLDOWN_SECS + 1,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = CooldownConfig {
        cooldown_secs: MAX_COOLDOWN_SECS,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_unbounded_cooldown_refuses_without_overflow() {
    let clock = MockClock::default();
    let monitor = Arc::new(
        EventLog::new(MonitorConfig::default(), Arc::new(clock.clone())).expect("valid config"),
    );
    let gate = CooldownGate::new(
        &CooldownConfig {
            cooldown_secs: u64::MAX,
            ..Default::default()
        },
        monitor,
        RecipientHasher::default(),
        Arc::new(clock),
    );

    assert!(gate.check("a@x.com", None));
    assert!(!gate.check("a@x.com", None));
    assert!(gate.remaining_seconds("a@x.com") > 0);
}
