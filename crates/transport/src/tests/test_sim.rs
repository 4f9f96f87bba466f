use std::time::Duration;

use ddll_core::ddll::Mode;
use ddll_core::observer::NodeEvent;
use ddll_core::DdllConfig;
use ddll_core::RetryPolicy;

use super::key;
use super::keys;
use super::setup_tracing;
use super::EventLog;
use crate::sim::SimConfig;
use crate::sim::Simulator;

fn simulator(seed: u64) -> Simulator {
    Simulator::new(SimConfig::default().seed(seed), DdllConfig::default())
}

/// Build a list of `vs` one join at a time.
fn build(sim: &mut Simulator, vs: &[i64]) {
    sim.initial(key(vs[0])).unwrap();
    for v in &vs[1..] {
        sim.join(key(*v)).unwrap();
        sim.run_until_idle().unwrap();
    }
}

#[test]
fn test_sequential_joins_form_sorted_ring() {
    setup_tracing();
    let mut sim = simulator(1);
    build(&mut sim, &[0, 1, 2, 3, 4]);

    assert_eq!(sim.ring(&key(0)), keys(&[0, 1, 2, 3, 4]));
    assert_eq!(sim.ring(&key(3)), keys(&[3, 4, 0, 1, 2]));
    for n in sim.nodes() {
        assert_eq!(n.mode(), Mode::In);
    }
    sim.check_consistency().unwrap();
}

#[test]
fn test_joins_out_of_order() {
    let mut sim = simulator(2);
    build(&mut sim, &[50, 10, 90, 30, 70, 20]);
    assert_eq!(sim.ring(&key(10)), keys(&[10, 20, 30, 50, 70, 90]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_leave_relinks_neighbors() {
    let mut sim = simulator(3);
    build(&mut sim, &(0..10).collect::<Vec<_>>());

    sim.leave(&key(7)).unwrap();
    assert!(sim.pending_events() > 0);
    sim.run_until_idle().unwrap();
    assert_eq!(sim.pending_events(), 0);

    let n8 = sim.node(&key(8)).unwrap();
    let n6 = sim.node(&key(6)).unwrap();
    assert_eq!(n8.pred().key, key(6));
    assert_eq!(n6.succ().key, key(8));
    assert!(n8.neighbors().contains(&key(6)));
    assert_eq!(sim.node(&key(7)).unwrap().mode(), Mode::Out);
    assert_eq!(sim.events_of(&key(7)).last(), Some(&NodeEvent::Deleted));
    assert_eq!(sim.ring(&key(0)), keys(&[0, 1, 2, 3, 4, 5, 6, 8, 9]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_concurrent_join_and_leave() {
    let mut sim = simulator(4);
    build(&mut sim, &[0, 1, 2, 4, 5, 6]);

    sim.join(key(3)).unwrap();
    sim.leave(&key(5)).unwrap();
    sim.run_until_idle().unwrap();

    assert_eq!(sim.ring(&key(0)), keys(&[0, 1, 2, 3, 4, 6]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_join_races_leave_of_successor() {
    // 3 inserts in front of 4 while 4 leaves, both talk to 2.
    for seed in 0..8 {
        let mut sim = simulator(seed);
        build(&mut sim, &[0, 2, 4, 6]);

        sim.join(key(3)).unwrap();
        sim.leave(&key(4)).unwrap();
        sim.run_until_idle().unwrap();

        assert_eq!(sim.ring(&key(0)), keys(&[0, 2, 3, 6]), "seed {seed}");
        sim.check_consistency().unwrap();
    }
}

#[test]
fn test_adjacent_leaves() {
    let mut sim = simulator(5);
    build(&mut sim, &[10, 20, 30, 40, 50]);

    sim.leave(&key(30)).unwrap();
    sim.leave(&key(40)).unwrap();
    sim.run_until_idle().unwrap();

    assert_eq!(sim.ring(&key(10)), keys(&[10, 20, 50]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_concurrent_churn_with_duplicates() {
    setup_tracing();
    let config = SimConfig::default()
        .seed(42)
        .latency_ms(1, 20)
        .dup_rate(0.2);
    let mut sim = Simulator::new(config, DdllConfig::default());
    let log = EventLog::new();
    sim.add_observer(log.clone());

    let initial: Vec<i64> = (0..20).map(|v| v * 10).collect();
    build(&mut sim, &initial);

    // Joins land in every gap while every third member leaves.
    for v in (0..20).map(|v| v * 10 + 5) {
        sim.join(key(v)).unwrap();
    }
    for v in (0..20).filter(|v| v % 3 == 1).map(|v| v * 10) {
        sim.leave(&key(v)).unwrap();
    }
    sim.run_until_idle().unwrap();
    sim.check_consistency().unwrap();

    let mut expected: Vec<i64> = initial
        .iter()
        .copied()
        .filter(|v| (v / 10) % 3 != 1)
        .chain((0..20).map(|v| v * 10 + 5))
        .collect();
    expected.sort();
    assert_eq!(sim.ring(&key(0)), keys(&expected));
    assert_eq!(log.count(&NodeEvent::Deleted), 7);
    assert_eq!(log.count(&NodeEvent::Inserted), 40);
    let (sent, dropped) = sim.stats();
    assert!(sent > 0);
    assert_eq!(dropped, 0);
}

#[test]
fn test_rejoin_after_leave() {
    let mut sim = simulator(6);
    build(&mut sim, &[1, 2, 3]);

    sim.leave(&key(2)).unwrap();
    sim.run_until_idle().unwrap();
    assert_eq!(sim.ring(&key(1)), keys(&[1, 3]));

    sim.join(key(2)).unwrap();
    sim.run_until_idle().unwrap();

    assert_eq!(sim.ring(&key(1)), keys(&[1, 2, 3]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_last_member_leaves_alone() {
    let mut sim = simulator(7);
    sim.initial(key(1)).unwrap();
    sim.leave(&key(1)).unwrap();
    sim.run_until_idle().unwrap();
    assert_eq!(sim.node(&key(1)).unwrap().mode(), Mode::Out);
    assert_eq!(sim.events_of(&key(1)), vec![NodeEvent::Inserted, NodeEvent::Deleted]);
}

#[test]
fn test_duplicate_key_rejected() {
    let mut sim = simulator(8);
    sim.initial(key(1)).unwrap();
    assert!(sim.join(key(1)).is_err());
}

fn retry_sim(policy: RetryPolicy) -> Simulator {
    let mut sim = Simulator::new(
        SimConfig::default().seed(9),
        DdllConfig::default().join_retry(policy),
    );
    build(&mut sim, &[0, 10, 20]);
    sim
}

#[test]
fn test_use_hint_retries_with_hint() {
    let mut sim = retry_sim(RetryPolicy::UseHint);
    // 0 no longer links to 20, but 5 still belongs right of 0.
    sim.join_at(key(5), &key(0), &key(20)).unwrap();
    sim.run_until_idle().unwrap();

    let events = sim.events_of(&key(5));
    assert!(matches!(events[0], NodeEvent::JoinRetry { attempt: 1 }));
    assert_eq!(events[1], NodeEvent::Inserted);
    assert_eq!(sim.ring(&key(0)), keys(&[0, 5, 10, 20]));
    sim.check_consistency().unwrap();
}

#[test]
fn test_use_hint_resolves_again_elsewhere() {
    let mut sim = retry_sim(RetryPolicy::UseHint);
    // 15 belongs right of 10, the hint names another predecessor.
    sim.join_at(key(15), &key(0), &key(20)).unwrap();
    sim.run_until_idle().unwrap();

    let events = sim.events_of(&key(15));
    assert!(matches!(events[0], NodeEvent::JoinRetry { attempt: 1 }));
    assert_eq!(events[1], NodeEvent::Inserted);
    assert_eq!(sim.node(&key(15)).unwrap().pred().key, key(10));
    sim.check_consistency().unwrap();
}

#[test]
fn test_constant_delay_retry() {
    let mut sim = retry_sim(RetryPolicy::ConstantDelay { delay_ms: 500 });
    sim.join_at(key(15), &key(0), &key(20)).unwrap();
    sim.run_until_idle().unwrap();

    let records: Vec<_> = sim
        .records()
        .iter()
        .filter(|r| r.node.key == key(15))
        .collect();
    assert_eq!(records.len(), 2);
    assert!(records[1].at - records[0].at >= Duration::from_millis(500));
    assert_eq!(sim.ring(&key(0)), keys(&[0, 10, 15, 20]));
}

#[test]
fn test_immediate_retry() {
    let mut sim = retry_sim(RetryPolicy::Immediate);
    sim.join_at(key(15), &key(0), &key(20)).unwrap();
    sim.run_until_idle().unwrap();
    assert_eq!(sim.ring(&key(0)), keys(&[0, 10, 15, 20]));
    assert_eq!(sim.node(&key(15)).unwrap().join_attempts(), 1);
}
