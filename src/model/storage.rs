//! `StorageModel`: reads and writes on disks of finite size.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::action::{ActionHandle, ActionId, ActionKind, ActionSpec, ActionState, ModelKind};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::resource::{ResourceId, ResourceSpec};
use crate::solver::System;

use super::context::ModelContext;
use super::traits::ResourceModel;

/// Space accounting of one storage resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskUsage {
    pub size: f64,
    pub used: f64,
}

impl DiskUsage {
    pub fn free(&self) -> f64 {
        (self.size - self.used).max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    disk: ResourceId,
    /// Remaining amount already charged to the disk.
    accounted: f64,
}

/// The storage model.
///
/// Written data is charged to the disk as the write progresses. Once the
/// disk is full, every write still in progress on it fails.
#[derive(Debug, Clone)]
pub struct StorageModel {
    ctx: ModelContext,
    disks: BTreeMap<ResourceId, DiskUsage>,
    writes: BTreeMap<ActionId, PendingWrite>,
}

impl StorageModel {
    pub fn new(config: &KernelConfig) -> Self {
        StorageModel {
            ctx: ModelContext::new(ModelKind::Storage, config.storage.update, config.precision),
            disks: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read `size` units from `storage`.
    pub fn read(&mut self, storage: ResourceId, size: f64, now: f64, sys: &mut System) -> KernelResult<ActionHandle> {
        let spec = ActionSpec::new(size).on(storage, 1.0).kind(ActionKind::Read);
        self.ctx.start_action(spec, now, sys)
    }

    /// Write `size` units to `storage`. Fails at once if the disk is full.
    pub fn write(&mut self, storage: ResourceId, size: f64, now: f64, sys: &mut System) -> KernelResult<ActionHandle> {
        let spec = ActionSpec::new(size).on(storage, 1.0).kind(ActionKind::Write);
        let handle = self.ctx.start_action(spec, now, sys)?;
        let id = handle.id();
        if self.ctx.action(id)?.state().is_live() {
            let full = self
                .disks
                .get(&storage)
                .is_some_and(|d| d.free() <= self.ctx.precision());
            if full {
                self.ctx.finish_action(id, ActionState::Failed, now, sys);
            } else {
                self.writes.insert(
                    id,
                    PendingWrite {
                        disk: storage,
                        accounted: size,
                    },
                );
            }
        }
        Ok(handle)
    }

    /// Space accounting of `storage`.
    pub fn usage(&self, storage: ResourceId) -> Option<DiskUsage> {
        self.disks.get(&storage).copied()
    }

    /// Charge write progress to the disks and fail writes on full disks.
    fn account_writes(&mut self, now: f64, sys: &mut System) {
        let precision = self.ctx.precision();
        let ids: Vec<ActionId> = self.writes.keys().copied().collect();
        for id in ids {
            self.ctx.sync_action(id, now, sys);
            let Ok(action) = self.ctx.action(id) else {
                self.writes.remove(&id);
                continue;
            };
            let remaining = action.remaining();
            let terminal = action.state().is_terminal();
            if let Some(write) = self.writes.get_mut(&id) {
                let progress = (write.accounted - remaining).max(0.0);
                write.accounted = remaining;
                if let Some(disk) = self.disks.get_mut(&write.disk) {
                    disk.used = (disk.used + progress).min(disk.size);
                }
            }
            if terminal {
                self.writes.remove(&id);
            }
        }

        let full: Vec<ResourceId> = self
            .disks
            .iter()
            .filter(|(_, d)| d.free() <= precision)
            .map(|(id, _)| *id)
            .collect();
        for disk in full {
            let victims: Vec<ActionId> = self
                .writes
                .iter()
                .filter(|(_, w)| w.disk == disk)
                .map(|(id, _)| *id)
                .collect();
            if !victims.is_empty() {
                info!(storage = %disk, failed = victims.len(), "storage full");
            }
            for id in victims {
                self.ctx.finish_action(id, ActionState::Failed, now, sys);
                self.writes.remove(&id);
            }
        }
    }
}

impl ResourceModel for StorageModel {
    fn context(&self) -> &ModelContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut ModelContext {
        &mut self.ctx
    }

    fn add_resource(&mut self, spec: &ResourceSpec, sys: &mut System) -> KernelResult<ResourceId> {
        let size = spec.size.unwrap_or(f64::INFINITY);
        if size.is_nan() || size < 0.0 {
            return Err(KernelError::InvalidCapacity {
                name: spec.name.clone(),
                capacity: size,
            });
        }
        let id = self.ctx.add_resource(spec, sys)?;
        self.disks.insert(id, DiskUsage { size, used: 0.0 });
        Ok(id)
    }

    /// Also bounds the step by the time until a disk fills up.
    fn share_resources(&mut self, now: f64, sys: &System, changed: &[(ActionId, f64)]) -> Option<f64> {
        let mut min = self.ctx.share_resources(now, sys, changed);
        for (disk, usage) in &self.disks {
            if !usage.size.is_finite() {
                continue;
            }
            let rate: f64 = self
                .writes
                .iter()
                .filter(|(_, w)| w.disk == *disk)
                .map(|(id, _)| self.ctx.rate(*id, sys))
                .sum();
            let until_full = usage.free() / rate;
            if rate > 0.0 && until_full.is_finite() {
                min = Some(min.map_or(until_full, |m| m.min(until_full)));
            }
        }
        min
    }

    fn update_actions_state(&mut self, now: f64, delta: f64, sys: &mut System) {
        self.ctx.update_actions_state(now, delta, sys);
        self.account_writes(now, sys);
    }
}
