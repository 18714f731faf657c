//! `CpuModel`: computation on (possibly multi-core) processors.

use crate::action::{ActionHandle, ActionKind, ActionSpec, ModelKind};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::resource::ResourceId;
use crate::solver::System;

use super::context::ModelContext;
use super::traits::ResourceModel;

/// The cpu model.
///
/// A cpu with `cores` cores has a constraint of `cores × peak × scale`;
/// a single execution can use at most one core.
#[derive(Debug, Clone)]
pub struct CpuModel {
    ctx: ModelContext,
}

impl CpuModel {
    pub fn new(config: &KernelConfig) -> Self {
        CpuModel {
            ctx: ModelContext::new(ModelKind::Cpu, config.cpu.update, config.precision)
                .with_core_bound(),
        }
    }

    /// Compute `amount` operations on `cpu`.
    pub fn execute(&mut self, cpu: ResourceId, amount: f64, now: f64, sys: &mut System) -> KernelResult<ActionHandle> {
        let spec = ActionSpec::new(amount).on(cpu, 1.0).kind(ActionKind::Execute);
        self.ctx.start_action(spec, now, sys)
    }

    /// Hold `cpu` busy-free for `duration` seconds, or forever with `None`.
    ///
    /// A sleep takes no capacity. It still fails if the cpu goes OFF.
    pub fn sleep(
        &mut self,
        cpu: ResourceId,
        duration: Option<f64>,
        now: f64,
        sys: &mut System,
    ) -> KernelResult<ActionHandle> {
        let mut spec = ActionSpec::new(1.0).on(cpu, 1.0).sleeping();
        if let Some(d) = duration {
            if !d.is_finite() || d < 0.0 {
                return Err(KernelError::InvalidAmount(d));
            }
            spec = spec.max_duration(d.max(self.ctx.precision()));
        }
        self.ctx.start_action(spec, now, sys)
    }
}

impl ResourceModel for CpuModel {
    fn context(&self) -> &ModelContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut ModelContext {
        &mut self.ctx
    }
}
