/// Fluent builder and serde scenario descriptions for simulation setup.
///
/// `PlatformBuilder` declares resources and timed resource changes by
/// name and resolves them to ids at build time. `Scenario` is the same
/// thing read from JSON, plus the actions to start at time zero.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::{ActionHandle, ActionSpec};
use crate::config::{KernelConfig, UpdateMode};
use crate::error::{KernelError, KernelResult};
use crate::model::ParallelTask;
use crate::resource::{ResourceClass, ResourceId, ResourceSpec, ResourceState};
use crate::simulation::Simulation;
use crate::solver::SharingPolicy;
use crate::trace::{Trace, TraceValue};

// ── PlatformBuilder ───────────────────────────────────────────────────

/// Fluent builder for a `Simulation` and its resources.
///
/// # Example
/// ```rust
/// use fairshare::dsl::PlatformBuilder;
/// use fairshare::ResourceClass;
///
/// let sim = PlatformBuilder::new()
///     .cpu("host0", 1e9)
///     .multicore("host1", 1e9, 4)
///     .link("backbone", 1.25e8, 1e-4)
///     .storage("disk", 5e7, 1e12)
///     .turn_off(ResourceClass::Cpu, "host0", 30.0)
///     .turn_on(ResourceClass::Cpu, "host0", 60.0)
///     .build()
///     .unwrap();
/// assert!(sim.resource_id(ResourceClass::Network, "backbone").is_some());
/// ```
pub struct PlatformBuilder {
    config: KernelConfig,
    resources: Vec<ResourceSpec>,
    changes: Vec<PlannedChange>,
}

struct PlannedChange {
    at: f64,
    class: ResourceClass,
    name: String,
    value: TraceValue,
}

impl PlatformBuilder {
    pub fn new() -> Self {
        PlatformBuilder {
            config: KernelConfig::default(),
            resources: Vec::new(),
            changes: Vec::new(),
        }
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the same update mode in every model.
    pub fn update(mut self, mode: UpdateMode) -> Self {
        self.config = self.config.with_update(mode);
        self
    }

    // ── Resources ─────────────────────────────────────────────

    /// Register a resource from a full spec.
    pub fn resource(mut self, spec: ResourceSpec) -> Self {
        self.resources.push(spec);
        self
    }

    pub fn cpu(self, name: &str, speed: f64) -> Self {
        self.resource(ResourceSpec::cpu(name, speed))
    }

    pub fn multicore(self, name: &str, speed: f64, cores: u32) -> Self {
        self.resource(ResourceSpec::cpu(name, speed).cores(cores))
    }

    /// A shared link.
    pub fn link(self, name: &str, bandwidth: f64, latency: f64) -> Self {
        self.resource(ResourceSpec::link(name, bandwidth).latency(latency))
    }

    /// A link whose flows do not compete with each other.
    pub fn fatpipe(self, name: &str, bandwidth: f64, latency: f64) -> Self {
        self.resource(ResourceSpec::fatpipe(name, bandwidth).latency(latency))
    }

    pub fn storage(self, name: &str, bandwidth: f64, size: f64) -> Self {
        self.resource(ResourceSpec::storage(name, bandwidth, size))
    }

    // ── Resource changes ──────────────────────────────────────

    pub fn turn_off(self, class: ResourceClass, name: &str, at: f64) -> Self {
        self.change(class, name, at, TraceValue::State(ResourceState::Off))
    }

    pub fn turn_on(self, class: ResourceClass, name: &str, at: f64) -> Self {
        self.change(class, name, at, TraceValue::State(ResourceState::On))
    }

    /// Set the availability factor of a resource at `at`.
    pub fn set_scale(self, class: ResourceClass, name: &str, at: f64, scale: f64) -> Self {
        self.change(class, name, at, TraceValue::Scale(scale))
    }

    fn change(mut self, class: ResourceClass, name: &str, at: f64, value: TraceValue) -> Self {
        self.changes.push(PlannedChange {
            at,
            class,
            name: name.to_string(),
            value,
        });
        self
    }

    // ── Build ─────────────────────────────────────────────────

    /// Create the simulation, its resources and its scheduled changes.
    pub fn build(self) -> KernelResult<Simulation> {
        let mut sim = Simulation::new(self.config)?;
        for spec in self.resources {
            sim.create_resource(spec)?;
        }
        for change in self.changes {
            let id = lookup(&sim, change.class, &change.name)?;
            sim.trace_mut().schedule(change.at, id, change.value);
        }
        Ok(sim)
    }
}

impl Default for PlatformBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup(sim: &Simulation, class: ResourceClass, name: &str) -> KernelResult<ResourceId> {
    sim.resource_id(class, name)
        .ok_or_else(|| KernelError::InvalidScenario(format!("unknown {} resource '{}'", class, name)))
}

// ── Scenario ──────────────────────────────────────────────────────────

/// A complete run described in JSON.
///
/// ```json
/// {
///   "config": { "cpu": { "update": "full" } },
///   "resources": [
///     { "name": "h0", "class": "cpu", "capacity": 10 },
///     { "name": "l0", "class": "network", "capacity": 100, "latency": 0.01 }
///   ],
///   "actions": [
///     { "name": "job", "type": "execute", "cpu": "h0", "amount": 100 },
///     { "name": "flow", "type": "communicate", "route": ["l0"], "size": 1000 }
///   ],
///   "events": [ { "at": 5, "class": "cpu", "resource": "h0", "state": "off" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: KernelConfig,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub events: Vec<EventDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    pub class: ResourceClass,
    /// Peak capacity (speed, bandwidth).
    pub capacity: f64,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(default)]
    pub policy: SharingPolicy,
    #[serde(default)]
    pub latency: f64,
    /// Disk size; storage only.
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub state: Option<ResourceState>,
    /// Scale trace in the text trace format.
    #[serde(default)]
    pub scale_trace: Option<String>,
    /// State trace in the text trace format.
    #[serde(default)]
    pub state_trace: Option<String>,
}

impl ResourceDecl {
    fn to_spec(&self) -> KernelResult<ResourceSpec> {
        let mut spec = ResourceSpec::new(self.class, self.name.clone(), self.capacity)
            .policy(self.policy)
            .latency(self.latency);
        if let Some(cores) = self.cores {
            spec = spec.cores(cores);
        }
        if let Some(size) = self.size {
            spec = spec.size(size);
        }
        if let Some(state) = self.state {
            spec = spec.state(state);
        }
        if let Some(text) = &self.scale_trace {
            spec = spec.scale_trace(Trace::parse(text)?);
        }
        if let Some(text) = &self.state_trace {
            spec = spec.state_trace(Trace::parse(text)?);
        }
        Ok(spec)
    }
}

/// Work started at time zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecl {
    pub name: String,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub max_duration: Option<f64>,
    #[serde(flatten)]
    pub work: Work,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Work {
    Execute {
        cpu: String,
        amount: f64,
    },
    Sleep {
        cpu: String,
        #[serde(default)]
        duration: Option<f64>,
    },
    Communicate {
        route: Vec<String>,
        size: f64,
        #[serde(default)]
        rate: Option<f64>,
    },
    Read {
        storage: String,
        size: f64,
    },
    Write {
        storage: String,
        size: f64,
    },
    /// Arbitrary demands on resources of one class.
    Generic {
        class: ResourceClass,
        amount: f64,
        demands: Vec<(String, f64)>,
    },
    /// Computations on cpus and transfers over routes, completing together.
    Parallel {
        #[serde(default)]
        computations: Vec<(String, f64)>,
        #[serde(default)]
        transfers: Vec<TransferDecl>,
        #[serde(default)]
        rate: Option<f64>,
    },
}

/// One transfer of a parallel task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDecl {
    pub route: Vec<String>,
    pub bytes: f64,
}

/// A one-off change of a resource's state or scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDecl {
    pub at: f64,
    pub class: ResourceClass,
    pub resource: String,
    #[serde(default)]
    pub state: Option<ResourceState>,
    #[serde(default)]
    pub scale: Option<f64>,
}

impl EventDecl {
    fn value(&self) -> KernelResult<TraceValue> {
        match (self.state, self.scale) {
            (Some(state), None) => Ok(TraceValue::State(state)),
            (None, Some(scale)) => Ok(TraceValue::Scale(scale)),
            _ => Err(KernelError::InvalidScenario(format!(
                "event on '{}' at {} needs exactly one of state or scale",
                self.resource, self.at
            ))),
        }
    }
}

/// A built scenario: the simulation and a handle per named action.
#[derive(Debug)]
pub struct ScenarioRun {
    pub simulation: Simulation,
    pub actions: BTreeMap<String, ActionHandle>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> KernelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Create the simulation, register the resources, start the actions
    /// and schedule the events.
    pub fn build(&self) -> KernelResult<ScenarioRun> {
        let mut sim = Simulation::new(self.config.clone())?;
        for decl in &self.resources {
            sim.create_resource(decl.to_spec()?)?;
        }

        let mut actions = BTreeMap::new();
        for decl in &self.actions {
            if actions.contains_key(&decl.name) {
                return Err(KernelError::InvalidScenario(format!(
                    "action '{}' declared twice",
                    decl.name
                )));
            }
            let handle = start(&mut sim, decl)?;
            actions.insert(decl.name.clone(), handle);
        }

        for event in &self.events {
            let id = lookup(&sim, event.class, &event.resource)?;
            let value = event.value()?;
            sim.trace_mut().schedule(event.at, id, value);
        }

        info!(
            resources = self.resources.len(),
            actions = actions.len(),
            events = self.events.len(),
            "scenario built"
        );
        Ok(ScenarioRun {
            simulation: sim,
            actions,
        })
    }
}

fn start(sim: &mut Simulation, decl: &ActionDecl) -> KernelResult<ActionHandle> {
    let handle = match &decl.work {
        Work::Execute { cpu, amount } => {
            let cpu = lookup(sim, ResourceClass::Cpu, cpu)?;
            sim.execute(cpu, *amount)?
        }
        Work::Sleep { cpu, duration } => {
            let cpu = lookup(sim, ResourceClass::Cpu, cpu)?;
            sim.sleep(cpu, *duration)?
        }
        Work::Communicate { route, size, rate } => {
            let links = route
                .iter()
                .map(|name| lookup(sim, ResourceClass::Network, name))
                .collect::<KernelResult<Vec<_>>>()?;
            sim.communicate(&links, *size, *rate)?
        }
        Work::Read { storage, size } => {
            let disk = lookup(sim, ResourceClass::Storage, storage)?;
            sim.read(disk, *size)?
        }
        Work::Write { storage, size } => {
            let disk = lookup(sim, ResourceClass::Storage, storage)?;
            sim.write(disk, *size)?
        }
        Work::Generic {
            class,
            amount,
            demands,
        } => {
            let mut spec = ActionSpec::new(*amount);
            for (name, demand) in demands {
                spec = spec.on(lookup(sim, *class, name)?, *demand);
            }
            sim.create_action(spec)?
        }
        Work::Parallel {
            computations,
            transfers,
            rate,
        } => {
            let mut task = ParallelTask::new();
            for (cpu, flops) in computations {
                task = task.compute(lookup(sim, ResourceClass::Cpu, cpu)?, *flops);
            }
            for transfer in transfers {
                let links = transfer
                    .route
                    .iter()
                    .map(|name| lookup(sim, ResourceClass::Network, name))
                    .collect::<KernelResult<Vec<_>>>()?;
                task = task.transfer(links, transfer.bytes);
            }
            if let Some(r) = rate {
                task = task.rate(*r);
            }
            sim.execute_parallel(&task)?
        }
    };

    let id = handle.id();
    if let Some(p) = decl.priority {
        sim.action_set_priority(id, p)?;
    }
    if decl.max_duration.is_some() {
        sim.action_set_max_duration(id, decl.max_duration)?;
    }
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionState;

    #[test]
    fn test_builder_basic() {
        let sim = PlatformBuilder::new()
            .cpu("h0", 10.0)
            .link("l0", 100.0, 0.5)
            .build()
            .unwrap();
        let cpu = sim.resource_id(ResourceClass::Cpu, "h0").unwrap();
        let link = sim.resource_id(ResourceClass::Network, "l0").unwrap();
        assert_eq!(sim.resource_capacity(cpu).unwrap(), 10.0);
        assert_eq!(sim.resource(link).unwrap().latency(), 0.5);
    }

    #[test]
    fn test_builder_multicore_capacity() {
        let sim = PlatformBuilder::new().multicore("quad", 2.0, 4).build().unwrap();
        let cpu = sim.resource_id(ResourceClass::Cpu, "quad").unwrap();
        assert_eq!(sim.resource_capacity(cpu).unwrap(), 8.0);
    }

    #[test]
    fn test_builder_update_mode() {
        let sim = PlatformBuilder::new().update(UpdateMode::Full).build().unwrap();
        assert_eq!(sim.config().cpu.update, UpdateMode::Full);
        assert_eq!(sim.config().network.update, UpdateMode::Full);
    }

    #[test]
    fn test_builder_turn_off() {
        let mut sim = PlatformBuilder::new()
            .cpu("h0", 10.0)
            .turn_off(ResourceClass::Cpu, "h0", 4.0)
            .build()
            .unwrap();
        let cpu = sim.resource_id(ResourceClass::Cpu, "h0").unwrap();
        let a = sim.execute(cpu, 100.0).unwrap();
        sim.run();
        assert_eq!(sim.action_get_state(a.id()).unwrap(), ActionState::Failed);
        assert_eq!(sim.action_finish_time(a.id()).unwrap(), Some(4.0));
    }

    #[test]
    fn test_builder_unknown_resource() {
        let err = PlatformBuilder::new()
            .turn_off(ResourceClass::Cpu, "ghost", 1.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidScenario(_)));
    }

    #[test]
    fn test_builder_set_scale() {
        let mut sim = PlatformBuilder::new()
            .cpu("h0", 10.0)
            .set_scale(ResourceClass::Cpu, "h0", 5.0, 0.5)
            .build()
            .unwrap();
        let cpu = sim.resource_id(ResourceClass::Cpu, "h0").unwrap();
        let a = sim.execute(cpu, 100.0).unwrap();
        sim.run();
        let finish = sim.action_finish_time(a.id()).unwrap().unwrap();
        assert!((finish - 15.0).abs() < 1e-6);
    }

    const SCENARIO: &str = r#"{
        "resources": [
            { "name": "h0", "class": "cpu", "capacity": 10 },
            { "name": "l0", "class": "network", "capacity": 100 },
            { "name": "d0", "class": "storage", "capacity": 10, "size": 1000 }
        ],
        "actions": [
            { "name": "job", "type": "execute", "cpu": "h0", "amount": 100 },
            { "name": "nap", "type": "sleep", "cpu": "h0", "duration": 3 },
            { "name": "flow", "type": "communicate", "route": ["l0"], "size": 1000, "priority": 2 },
            { "name": "save", "type": "write", "storage": "d0", "size": 50 }
        ],
        "events": [ { "at": 20, "class": "cpu", "resource": "h0", "state": "off" } ]
    }"#;

    #[test]
    fn test_scenario_parse() {
        let scenario = Scenario::from_json_str(SCENARIO).unwrap();
        assert_eq!(scenario.resources.len(), 3);
        assert_eq!(scenario.actions[2].priority, Some(2.0));
        assert!(matches!(scenario.actions[1].work, Work::Sleep { duration: Some(_), .. }));
        assert_eq!(scenario.events[0].state, Some(ResourceState::Off));
    }

    #[test]
    fn test_scenario_build_and_run() {
        let mut run = Scenario::from_json_str(SCENARIO).unwrap().build().unwrap();
        run.simulation.run();
        let sim = &run.simulation;
        let finish = |name: &str| sim.action_finish_time(run.actions[name].id()).unwrap();
        assert_eq!(finish("job"), Some(10.0));
        assert_eq!(finish("nap"), Some(3.0));
        assert_eq!(finish("flow"), Some(10.0));
        assert_eq!(finish("save"), Some(5.0));
        assert!(sim.is_finished());
    }

    #[test]
    fn test_scenario_duplicate_action() {
        let json = r#"{
            "resources": [ { "name": "h0", "class": "cpu", "capacity": 1 } ],
            "actions": [
                { "name": "a", "type": "execute", "cpu": "h0", "amount": 1 },
                { "name": "a", "type": "execute", "cpu": "h0", "amount": 1 }
            ]
        }"#;
        let err = Scenario::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(err, KernelError::InvalidScenario(_)));
    }

    #[test]
    fn test_scenario_event_needs_one_change() {
        let json = r#"{
            "resources": [ { "name": "h0", "class": "cpu", "capacity": 1 } ],
            "events": [ { "at": 1, "class": "cpu", "resource": "h0" } ]
        }"#;
        let err = Scenario::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(err, KernelError::InvalidScenario(_)));
    }

    #[test]
    fn test_scenario_trace_text() {
        let json = r#"{
            "resources": [
                { "name": "h0", "class": "cpu", "capacity": 10, "state_trace": "2 0\n4 1\n" }
            ],
            "actions": [ { "name": "a", "type": "execute", "cpu": "h0", "amount": 100 } ]
        }"#;
        let mut run = Scenario::from_json_str(json).unwrap().build().unwrap();
        run.simulation.run();
        let a = run.actions["a"].id();
        assert_eq!(run.simulation.action_get_state(a).unwrap(), ActionState::Failed);
        assert_eq!(run.simulation.action_finish_time(a).unwrap(), Some(2.0));
    }

    #[test]
    fn test_scenario_generic_demands() {
        let json = r#"{
            "resources": [
                { "name": "a", "class": "network", "capacity": 10 },
                { "name": "b", "class": "network", "capacity": 100 }
            ],
            "actions": [
                { "name": "x", "type": "generic", "class": "network", "amount": 100,
                  "demands": [["a", 1.0], ["b", 2.0]] }
            ]
        }"#;
        let mut run = Scenario::from_json_str(json).unwrap().build().unwrap();
        run.simulation.run();
        let x = run.actions["x"].id();
        assert_eq!(run.simulation.action_finish_time(x).unwrap(), Some(10.0));
    }

    #[test]
    fn test_scenario_parallel_task() {
        let json = r#"{
            "resources": [
                { "name": "h0", "class": "cpu", "capacity": 10 },
                { "name": "h1", "class": "cpu", "capacity": 5 },
                { "name": "l0", "class": "network", "capacity": 100 }
            ],
            "actions": [
                { "name": "p", "type": "parallel",
                  "computations": [["h0", 10.0], ["h1", 10.0]],
                  "transfers": [ { "route": ["l0"], "bytes": 50.0 } ] }
            ]
        }"#;
        let mut run = Scenario::from_json_str(json).unwrap().build().unwrap();
        run.simulation.run();
        let p = run.actions["p"].id();
        // h1 needs 2 s for its share; the link only 0.5 s.
        assert_eq!(run.simulation.action_finish_time(p).unwrap(), Some(2.0));
    }
}
