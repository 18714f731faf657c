//! Resource models: one per resource class, plus parallel tasks.
//!
//! Each model owns a [`ModelContext`] (its resources, actions, completion
//! heap and dirty set) and implements [`ResourceModel`], the interface the
//! main loop aggregates the models through. All models share one sharing
//! [`System`], solved once per step by [`share_all`]. The typed models add
//! the class-specific ways to create actions.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`context`] | [`ModelContext`] |
//! | [`traits`] | [`ResourceModel`] trait |
//! | [`cpu`] | [`CpuModel`]: executions and sleeps |
//! | [`network`] | [`NetworkModel`]: flows with latency |
//! | [`storage`] | [`StorageModel`]: reads, writes, disk space |
//! | [`ptask`] | [`PtaskModel`]: actions across several classes |

pub mod context;
pub mod cpu;
pub mod network;
pub mod ptask;
pub mod storage;
pub mod traits;

pub use context::ModelContext;
pub use cpu::CpuModel;
pub use network::NetworkModel;
pub use ptask::{ParallelTask, PtaskModel};
pub use storage::{DiskUsage, StorageModel};
pub use traits::ResourceModel;

use crate::action::ActionId;
use crate::solver::System;

/// Solve the shared system once and let every model account the result.
///
/// Returns the delay until the earliest completion any model predicts.
pub fn share_all(models: &mut [&mut dyn ResourceModel], sys: &mut System, now: f64) -> Option<f64> {
    for model in models.iter_mut() {
        model.context_mut().flush_dirty(sys);
    }
    let changed: Vec<(ActionId, f64)> = sys
        .pending_variables()
        .into_iter()
        .filter_map(|v| sys.variable(v).map(|var| (var.action(), var.value())))
        .collect();
    sys.solve();

    let mut min: Option<f64> = None;
    for model in models.iter_mut() {
        if let Some(delay) = model.share_resources(now, sys, &changed) {
            min = Some(min.map_or(delay, |m| m.min(delay)));
        }
    }
    min
}
