//! # Fairshare — Fair-Share Resource Contention Kernel
//!
//! A discrete-event kernel that decides how fast concurrent activities
//! progress when they compete for shared capacity. Processors, network
//! links and disks are resources; computations, transfers and I/O are
//! actions. A max-min fairness solver splits every resource between the
//! actions using it, and the main loop jumps from one completion or
//! resource state change to the next. No threads, no wall-clock time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     Simulation                          │ ← main loop, clock
//! │  ┌──────────┐ ┌────────────┐ ┌────────────┐ ┌────────┐  │
//! │  │ CpuModel │ │NetworkModel│ │StorageModel│ │ Ptask  │  │ ← ResourceModel
//! │  └────┬─────┘ └─────┬──────┘ └─────┬──────┘ └───┬────┘  │
//! │       └─────────────┴──────┬───────┴────────────┘       │
//! │  ┌─────────────────────────▼───────────────────────┐    │
//! │  │ ModelContext (one per model)                     │    │
//! │  │  Scheduler   ← completion min-heap               │    │
//! │  │  Resources / Actions ← arenas                    │    │
//! │  └─────────────────────────┬───────────────────────┘    │
//! │  ┌─────────────────────────▼───────────────────────┐    │
//! │  │ System ← max-min sharing solver, shared by all   │    │
//! │  └─────────────────────────────────────────────────┘    │
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │ TraceManager ← scale / state profiles            │    │
//! │  └─────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ```
//! use fairshare::{KernelConfig, ResourceSpec, Simulation};
//!
//! let mut sim = Simulation::new(KernelConfig::default()).unwrap();
//! let cpu = sim.create_resource(ResourceSpec::cpu("host", 10.0)).unwrap();
//! let job = sim.execute(cpu, 100.0).unwrap();
//! sim.run();
//! assert_eq!(sim.action_finish_time(job.id()).unwrap(), Some(10.0));
//! ```

pub mod action;
pub mod api;
pub mod config;
pub mod dsl;
pub mod error;
pub mod model;
pub mod resource;
pub mod scheduler;
pub mod simulation;
pub mod solver;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use action::{Action, ActionHandle, ActionId, ActionKind, ActionSpec, ActionState, ModelKind};
pub use api::{SimulationApi, Snapshot, StepResult};
pub use config::{CpuConfig, KernelConfig, NetworkConfig, PtaskConfig, StorageConfig, UpdateMode};
pub use dsl::{PlatformBuilder, Scenario};
pub use error::{KernelError, KernelResult};
pub use model::{
    CpuModel, DiskUsage, ModelContext, NetworkModel, ParallelTask, PtaskModel, ResourceModel,
    StorageModel,
};
pub use resource::{Resource, ResourceClass, ResourceId, ResourceSpec, ResourceState};
pub use scheduler::CompletionScheduler;
pub use simulation::Simulation;
pub use solver::{SharingPolicy, System};
pub use time::VirtualTime;
pub use trace::{Trace, TraceEvent, TraceKind, TraceManager, TraceSource, TraceValue};
