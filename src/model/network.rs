//! `NetworkModel`: flows over routes of links.

use tracing::trace;

use crate::action::{ActionHandle, ActionKind, ActionSpec, ModelKind};
use crate::config::{KernelConfig, NetworkConfig};
use crate::error::{KernelError, KernelResult};
use crate::resource::ResourceId;
use crate::solver::System;

use super::context::ModelContext;
use super::traits::ResourceModel;

/// The network model.
///
/// A flow crosses every link of its route with consumption 1. It waits
/// out the summed route latency at weight zero before it starts sharing
/// bandwidth.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    ctx: ModelContext,
    config: NetworkConfig,
}

impl NetworkModel {
    pub fn new(config: &KernelConfig) -> Self {
        NetworkModel {
            ctx: ModelContext::new(ModelKind::Network, config.network.update, config.precision)
                .with_capacity_factor(config.network.bandwidth_factor),
            config: config.network.clone(),
        }
    }

    /// Send `size` units along `route`, optionally capped at `rate`.
    ///
    /// The route is given explicitly; computing it is the caller's job.
    pub fn communicate(
        &mut self,
        route: &[ResourceId],
        size: f64,
        rate: Option<f64>,
        now: f64,
        sys: &mut System,
    ) -> KernelResult<ActionHandle> {
        if route.is_empty() {
            return Err(KernelError::EmptyDemands);
        }

        let mut latency = 0.0;
        for link in route {
            latency += self.ctx.resource(*link)?.latency();
        }
        latency *= self.config.latency_factor;

        let mut bound = rate;
        if let Some(gamma) = self.config.tcp_gamma {
            if latency > 0.0 {
                let window = gamma / (2.0 * latency);
                bound = Some(bound.map_or(window, |b| b.min(window)));
            }
        }

        let mut spec = ActionSpec::new(size)
            .kind(ActionKind::Communicate)
            .latency(latency);
        if let Some(b) = bound {
            spec = spec.rate_bound(b);
        }
        for link in route {
            spec = spec.on(*link, 1.0);
        }
        trace!(links = route.len(), size, latency, bound = ?bound, "communication requested");
        self.ctx.start_action(spec, now, sys)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl ResourceModel for NetworkModel {
    fn context(&self) -> &ModelContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut ModelContext {
        &mut self.ctx
    }
}
