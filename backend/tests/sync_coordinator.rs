//! Sync coordinator behavior seen from the driver's side

use chrono::Utc;
use flux_progress::sync::{StageStatus, SyncCoordinator, SyncStage};
use proptest::prelude::*;

fn status_of(coordinator: &SyncCoordinator, stage: SyncStage) -> StageStatus {
    coordinator.state().stage_status(stage)
}

#[test]
fn stage_statuses_follow_current_stage() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.start_sync();
    coordinator.set_current_stage(SyncStage::Categories);
    coordinator.set_categories_count(12);
    coordinator.set_current_stage(SyncStage::Feeds);

    assert_eq!(status_of(&coordinator, SyncStage::Categories), StageStatus::Completed);
    assert_eq!(status_of(&coordinator, SyncStage::Feeds), StageStatus::Active);
    assert_eq!(status_of(&coordinator, SyncStage::Entries), StageStatus::Pending);
    assert_eq!(status_of(&coordinator, SyncStage::Cleanup), StageStatus::Pending);
}

#[test]
fn idle_and_completed_runs() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.start_sync();
    for stage in SyncStage::WORKING {
        assert_eq!(status_of(&coordinator, stage), StageStatus::Pending);
    }

    coordinator.set_current_stage(SyncStage::Cleanup);
    coordinator.complete_sync();
    for stage in SyncStage::WORKING {
        assert_eq!(status_of(&coordinator, stage), StageStatus::Completed);
    }
}

#[test]
fn complete_sync_stamps_time_after_the_call() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.start_sync();

    let before = Utc::now();
    coordinator.complete_sync();
    let state = coordinator.state();

    assert!(!state.syncing);
    assert_eq!(state.current_stage, SyncStage::Completed);
    assert!(state.last_synced_at.unwrap() >= before);
}

#[test]
fn fail_sync_sets_message_and_stage() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.start_sync();
    coordinator.fail_sync("server returned 502");

    let state = coordinator.state();
    assert!(!state.syncing);
    assert_eq!(state.error.as_deref(), Some("server returned 502"));
    assert_eq!(state.current_stage, SyncStage::Failed);
}

#[test]
fn restarting_after_failure_clears_error() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.start_sync();
    coordinator.set_entries_progress(5, 10);
    coordinator.fail_sync("boom");

    coordinator.start_sync();
    let state = coordinator.state();
    assert!(state.syncing);
    assert_eq!(state.error, None);
    assert_eq!(state.current_stage, SyncStage::Idle);
    assert_eq!(state.entries_progress, None);
}

#[derive(Debug, Clone)]
enum Op {
    Start,
    Stage(SyncStage),
    Categories(u64),
    Feeds(u64),
    Entries(u64, u64),
    Complete,
    Fail,
    SetError(Option<&'static str>),
}

fn arb_stage() -> impl Strategy<Value = SyncStage> {
    prop_oneof![
        Just(SyncStage::Idle),
        Just(SyncStage::Categories),
        Just(SyncStage::Feeds),
        Just(SyncStage::Entries),
        Just(SyncStage::Cleanup),
        Just(SyncStage::Completed),
        Just(SyncStage::Failed),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        arb_stage().prop_map(Op::Stage),
        (0u64..500).prop_map(Op::Categories),
        (0u64..500).prop_map(Op::Feeds),
        (0u64..5000, 0u64..5000).prop_map(|(pulled, total)| Op::Entries(pulled, total)),
        Just(Op::Complete),
        Just(Op::Fail),
        prop_oneof![Just(None), Just(Some("offline"))].prop_map(Op::SetError),
    ]
}

proptest! {
    #[test]
    fn entries_percentage_matches_formula(pulled in 0u64..100_000, total in 1u64..100_000) {
        let mut coordinator = SyncCoordinator::new();
        coordinator.start_sync();
        coordinator.set_entries_progress(pulled, total);

        let expected = (100.0 * pulled as f64 / total as f64).round().clamp(0.0, 100.0) as u8;
        let progress = coordinator.state().entries_progress.unwrap();
        prop_assert_eq!(progress.percentage, expected);
        prop_assert!(progress.percentage <= 100);
    }

    #[test]
    fn syncing_implies_no_error(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut coordinator = SyncCoordinator::new();

        for op in ops {
            match op {
                Op::Start => coordinator.start_sync(),
                Op::Stage(stage) => coordinator.set_current_stage(stage),
                Op::Categories(n) => coordinator.set_categories_count(n),
                Op::Feeds(n) => coordinator.set_feeds_count(n),
                Op::Entries(pulled, total) => coordinator.set_entries_progress(pulled, total),
                Op::Complete => coordinator.complete_sync(),
                Op::Fail => coordinator.fail_sync("failed"),
                Op::SetError(message) => coordinator.set_error(message.map(String::from)),
            }

            let state = coordinator.state();
            prop_assert!(!state.syncing || state.error.is_none());
        }
    }

    #[test]
    fn start_always_resets(ops in prop::collection::vec(arb_op(), 0..20)) {
        let mut coordinator = SyncCoordinator::new();
        for op in ops {
            match op {
                Op::Categories(n) => coordinator.set_categories_count(n),
                Op::Entries(pulled, total) => coordinator.set_entries_progress(pulled, total),
                Op::Fail => coordinator.fail_sync("failed"),
                Op::Stage(stage) => coordinator.set_current_stage(stage),
                _ => {}
            }
        }

        coordinator.start_sync();
        let state = coordinator.state();
        prop_assert!(state.syncing);
        prop_assert!(state.error.is_none());
        prop_assert_eq!(state.current_stage, SyncStage::Idle);
        prop_assert!(state.categories_count.is_none());
        prop_assert!(state.feeds_count.is_none());
        prop_assert!(state.entries_progress.is_none());
    }
}
