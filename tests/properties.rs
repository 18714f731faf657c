//! Randomized checks of the sharing invariants on generated platforms.

use std::collections::BTreeMap;

use proptest::prelude::*;

use fairshare::{
    ActionHandle, ActionSpec, KernelConfig, ResourceId, ResourceSpec, SharingPolicy, Simulation,
    UpdateMode,
};

/// Links as `(capacity, fatpipe)`; actions as `(priority, demands by link index)`.
type Platform = (Vec<(f64, bool)>, Vec<(f64, BTreeMap<usize, f64>)>);

fn platform() -> impl Strategy<Value = Platform> {
    (1usize..5).prop_flat_map(|links| {
        let resources = prop::collection::vec((1.0f64..100.0, any::<bool>()), links);
        let actions = prop::collection::vec(
            (
                0.5f64..4.0,
                prop::collection::vec((0..links, 0.1f64..2.0), 1..=links)
                    .prop_map(|demands| demands.into_iter().collect::<BTreeMap<_, _>>()),
            ),
            1..8,
        );
        (resources, actions)
    })
}

struct Solved {
    sim: Simulation,
    links: Vec<(ResourceId, f64, SharingPolicy)>,
    actions: Vec<(ActionHandle, f64, BTreeMap<usize, f64>)>,
}

impl Solved {
    fn rate(&self, action: usize) -> f64 {
        self.sim.action_rate(self.actions[action].0.id()).unwrap()
    }

    /// Consumption on `link` computed from the rates, independently of the solver.
    fn load(&self, link: usize) -> f64 {
        let policy = self.links[link].2;
        let mut load: f64 = 0.0;
        for (i, (_, _, demands)) in self.actions.iter().enumerate() {
            if let Some(c) = demands.get(&link) {
                let consumed = c * self.rate(i);
                load = match policy {
                    SharingPolicy::Shared => load + consumed,
                    SharingPolicy::Fatpipe => load.max(consumed),
                };
            }
        }
        load
    }

    fn saturated(&self, link: usize) -> bool {
        let capacity = self.links[link].1;
        self.load(link) >= capacity - 1e-4 * capacity.max(1.0)
    }
}

/// Build the platform and solve it once without completing anything.
fn solve((resources, actions): Platform, mode: UpdateMode) -> Solved {
    let mut sim = Simulation::new(KernelConfig::default().with_update(mode)).unwrap();
    let links: Vec<(ResourceId, f64, SharingPolicy)> = resources
        .iter()
        .enumerate()
        .map(|(i, (capacity, fatpipe))| {
            let name = format!("l{}", i);
            let spec = if *fatpipe {
                ResourceSpec::fatpipe(name, *capacity)
            } else {
                ResourceSpec::link(name, *capacity)
            };
            let policy = if *fatpipe { SharingPolicy::Fatpipe } else { SharingPolicy::Shared };
            (sim.create_resource(spec).unwrap(), *capacity, policy)
        })
        .collect();

    let actions = actions
        .into_iter()
        .map(|(priority, demands)| {
            let mut spec = ActionSpec::new(1e12).priority(priority);
            for (link, consumption) in &demands {
                spec = spec.on(links[*link].0, *consumption);
            }
            (sim.create_action(spec).unwrap(), priority, demands)
        })
        .collect();

    sim.step_until(0.0);
    Solved { sim, links, actions }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_rates_are_non_negative(p in platform()) {
        let solved = solve(p, UpdateMode::Lazy);
        for i in 0..solved.actions.len() {
            prop_assert!(solved.rate(i) >= 0.0);
        }
    }

    #[test]
    fn prop_capacity_is_respected(p in platform()) {
        let solved = solve(p, UpdateMode::Lazy);
        for (link, (id, capacity, _)) in solved.links.iter().enumerate() {
            let load = solved.load(link);
            prop_assert!(load <= capacity + 1e-4 * capacity.max(1.0),
                "link {} carries {} over capacity {}", link, load, capacity);
            let reported = solved.sim.resource_usage(*id).unwrap();
            prop_assert!((reported - load).abs() <= 1e-6 * load.max(1.0));
        }
    }

    #[test]
    fn prop_every_action_has_a_bottleneck(p in platform()) {
        let solved = solve(p, UpdateMode::Full);
        for (i, (_, priority, demands)) in solved.actions.iter().enumerate() {
            let level = solved.rate(i) / priority;
            // Some saturated link on which no other action runs at a higher level.
            let bottlenecked = demands.keys().any(|&link| {
                solved.saturated(link)
                    && solved.actions.iter().enumerate().all(|(j, (_, w, d))| {
                        !d.contains_key(&link) || solved.rate(j) / w <= level * (1.0 + 1e-4) + 1e-9
                    })
            });
            prop_assert!(bottlenecked, "action {} at level {} has no bottleneck", i, level);
        }
    }

    #[test]
    fn prop_lazy_and_full_solve_alike(p in platform()) {
        let lazy = solve(p.clone(), UpdateMode::Lazy);
        let full = solve(p, UpdateMode::Full);
        for i in 0..lazy.actions.len() {
            let (l, f) = (lazy.rate(i), full.rate(i));
            prop_assert!((l - f).abs() <= 1e-7 * l.max(1.0));
        }
    }
}
