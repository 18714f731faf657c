use super::*;
use crate::action::ActionId;
use crate::resource::{ResourceClass, ResourceId};

const EPS: f64 = 1e-9;

fn resource(i: usize) -> ResourceId {
    ResourceId::new(ResourceClass::Network, i)
}

fn action(i: u64) -> ActionId {
    ActionId::new(ResourceClass::Network, i)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ── Single constraint ─────────────────────────────────────────────────

#[test]
fn test_equal_weights_share_equally() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);

    sys.solve();
    assert!(close(sys.value(a), 50.0));
    assert!(close(sys.value(b), 50.0));
    assert!(close(sys.constraint_usage(c), 100.0));
}

#[test]
fn test_rate_proportional_to_weight() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 3.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);

    sys.solve();
    assert!(close(sys.value(a), 25.0));
    assert!(close(sys.value(b), 75.0));
}

#[test]
fn test_consumption_weight_scales_rate() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 10.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    sys.expand(c, a, 2.0);

    sys.solve();
    assert!(close(sys.value(a), 5.0));
    assert!(close(sys.constraint_usage(c), 10.0));
}

#[test]
fn test_expand_twice_accumulates_on_shared() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 12.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, a, 2.0);

    assert_eq!(sys.constraint(c).map(|c| c.variables().len()), Some(1));
    sys.solve();
    assert!(close(sys.value(a), 4.0));
}

// ── Fatpipe ───────────────────────────────────────────────────────────

#[test]
fn test_fatpipe_each_gets_full_capacity() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Fatpipe);
    let vars: Vec<_> = (0..3)
        .map(|i| {
            let v = sys.variable_new(action(i), 1.0, None);
            sys.expand(c, v, 1.0);
            v
        })
        .collect();

    sys.solve();
    for v in vars {
        assert!(close(sys.value(v), 100.0));
    }
    assert!(close(sys.constraint_usage(c), 100.0));
}

#[test]
fn test_fatpipe_respects_demand() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Fatpipe);
    let a = sys.variable_new(action(0), 1.0, Some(30.0));
    let b = sys.variable_new(action(1), 1.0, Some(300.0));
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);

    sys.solve();
    assert!(close(sys.value(a), 30.0));
    assert!(close(sys.value(b), 100.0));
}

// ── Bounds ────────────────────────────────────────────────────────────

#[test]
fn test_bounded_variable_releases_capacity() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, Some(10.0));
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);

    sys.solve();
    assert!(close(sys.value(a), 10.0));
    assert!(close(sys.value(b), 90.0));
}

#[test]
fn test_unconstrained_bounded_variable_gets_bound() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, Some(7.0));
    sys.expand(c, a, 0.0);

    sys.solve();
    assert!(close(sys.value(a), 7.0));
}

// ── Multiple constraints ──────────────────────────────────────────────

#[test]
fn test_bottleneck_propagates() {
    // a and b cross link 0 (capacity 10); b and c cross link 1 (capacity 100).
    let mut sys = System::new(true, 1e-5);
    let l0 = sys.constraint_new(resource(0), 10.0, SharingPolicy::Shared);
    let l1 = sys.constraint_new(resource(1), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    let c = sys.variable_new(action(2), 1.0, None);
    sys.expand(l0, a, 1.0);
    sys.expand(l0, b, 1.0);
    sys.expand(l1, b, 1.0);
    sys.expand(l1, c, 1.0);

    sys.solve();
    assert!(close(sys.value(a), 5.0));
    assert!(close(sys.value(b), 5.0));
    assert!(close(sys.value(c), 95.0));
}

#[test]
fn test_zero_capacity_freezes_variables() {
    let mut sys = System::new(true, 1e-5);
    let dead = sys.constraint_new(resource(0), 0.0, SharingPolicy::Shared);
    let alive = sys.constraint_new(resource(1), 50.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(dead, a, 1.0);
    sys.expand(alive, a, 1.0);
    sys.expand(alive, b, 1.0);

    sys.solve();
    assert_eq!(sys.value(a), 0.0);
    assert!(close(sys.value(b), 50.0));
}

#[test]
fn test_frozen_variable_takes_nothing() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 0.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);

    sys.solve();
    assert_eq!(sys.value(a), 0.0);
    assert!(close(sys.value(b), 100.0));
    assert!(sys.constraint_used(c));
}

// ── Incremental behavior ──────────────────────────────────────────────

#[test]
fn test_solve_is_idempotent() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    sys.expand(c, a, 1.0);

    assert_eq!(sys.solve(), vec![a]);
    assert!(!sys.is_modified());
    assert!(sys.solve().is_empty());
    assert_eq!(sys.solves(), 1);
    assert!(close(sys.value(a), 100.0));
}

#[test]
fn test_selective_update_skips_unrelated_component() {
    let mut sys = System::new(true, 1e-5);
    let c0 = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let c1 = sys.constraint_new(resource(1), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c0, a, 1.0);
    sys.expand(c1, b, 1.0);
    sys.solve();

    sys.update_constraint_bound(c1, 40.0);
    assert_eq!(sys.pending_variables(), vec![b]);
    assert_eq!(sys.solve(), vec![b]);
    assert!(close(sys.value(a), 100.0));
    assert!(close(sys.value(b), 40.0));
}

#[test]
fn test_full_update_covers_everything() {
    let mut sys = System::new(false, 1e-5);
    let c0 = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let c1 = sys.constraint_new(resource(1), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c0, a, 1.0);
    sys.expand(c1, b, 1.0);
    sys.solve();

    sys.update_constraint_bound(c1, 40.0);
    assert_eq!(sys.solve(), vec![a, b]);
}

#[test]
fn test_variable_free_returns_capacity() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 90.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 2.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);
    sys.solve();
    assert!(close(sys.value(a), 30.0));

    sys.variable_free(b);
    assert!(sys.variable(b).is_none());
    sys.solve();
    assert!(close(sys.value(a), 90.0));
    assert_eq!(sys.variable_count(), 1);
}

#[test]
fn test_freed_slot_is_recycled() {
    let mut sys = System::new(true, 1e-5);
    let a = sys.variable_new(action(0), 1.0, None);
    sys.variable_free(a);
    let b = sys.variable_new(action(1), 1.0, None);
    assert_eq!(a.raw(), b.raw());
    assert_eq!(sys.variable(b).map(|v| v.action()), Some(action(1)));
}

#[test]
fn test_weight_update_triggers_resolve() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 100.0, SharingPolicy::Shared);
    let a = sys.variable_new(action(0), 1.0, None);
    let b = sys.variable_new(action(1), 1.0, None);
    sys.expand(c, a, 1.0);
    sys.expand(c, b, 1.0);
    sys.solve();

    sys.update_variable_weight(b, 0.0);
    assert!(sys.is_modified());
    sys.solve();
    assert!(close(sys.value(a), 100.0));
    assert_eq!(sys.value(b), 0.0);

    // Same weight again is not a change.
    sys.update_variable_weight(b, 0.0);
    assert!(!sys.is_modified());
}

#[test]
fn test_summation_never_exceeds_bound() {
    let mut sys = System::new(true, 1e-5);
    let c = sys.constraint_new(resource(0), 1.0, SharingPolicy::Shared);
    let vars: Vec<_> = (0..7)
        .map(|i| {
            let v = sys.variable_new(action(i), 1.0 + i as f64, None);
            sys.expand(c, v, 0.5 + i as f64 / 3.0);
            v
        })
        .collect();
    sys.solve();

    let total: f64 = vars
        .iter()
        .map(|v| sys.value(*v) * sys.variable(*v).and_then(|x| x.consumption_on(c)).unwrap_or(0.0))
        .sum();
    assert!(total <= 1.0 + EPS);
    assert!(close(total, 1.0));
}
