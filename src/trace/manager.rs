/// Pending trace events, merged across every attached trace.
///
/// Uses a `BinaryHeap` with reversed `Ord` to act as a min-heap keyed by
/// `(date, seq)`. Each attached trace keeps exactly one pending entry (its
/// next point); popping it schedules the point after. Equal dates pop in
/// the order the entries were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::resource::ResourceId;

use super::event::{TraceEvent, TraceKind, TraceValue};
use super::profile::Trace;

/// What the main loop needs from a trace provider.
pub trait TraceSource {
    /// Date of the earliest pending event.
    fn next_event_date(&self) -> Option<f64>;

    /// Remove and return one pending event dated at or before `date`.
    fn pop_event_leq(&mut self, date: f64) -> Option<TraceEvent>;

    /// Attach `trace` to `resource`, its dates offset by `start`.
    fn attach(&mut self, resource: ResourceId, kind: TraceKind, trace: &Trace, start: f64);

    /// `true` if no event is pending.
    fn is_exhausted(&self) -> bool {
        self.next_event_date().is_none()
    }
}

#[derive(Debug, Clone)]
struct Binding {
    resource: ResourceId,
    kind: TraceKind,
    trace: Trace,
    start: f64,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Once(TraceValue, ResourceId),
    Cursor {
        binding: usize,
        index: usize,
        cycle: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    date: f64,
    seq: u64,
    source: Source,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so that BinaryHeap pops the *smallest* key first.
        other
            .date
            .total_cmp(&self.date)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The default trace provider.
#[derive(Debug, Clone, Default)]
pub struct TraceManager {
    queue: BinaryHeap<Pending>,
    bindings: Vec<Binding>,
    next_seq: u64,
}

impl TraceManager {
    pub fn new() -> Self {
        TraceManager {
            queue: BinaryHeap::new(),
            bindings: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedule a single event.
    pub fn schedule(&mut self, date: f64, resource: ResourceId, value: TraceValue) {
        self.push(date, Source::Once(value, resource));
    }

    /// Number of pending entries (one per live trace plus one-shot events).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, date: f64, source: Source) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Pending { date, seq, source });
    }

    fn push_cursor(&mut self, binding: usize, index: usize, cycle: u64) {
        let Some(b) = self.bindings.get(binding) else {
            return;
        };
        if let Some((date, _)) = b.trace.point(index, cycle) {
            let date = b.start + date;
            self.push(
                date,
                Source::Cursor {
                    binding,
                    index,
                    cycle,
                },
            );
        }
    }
}

impl TraceSource for TraceManager {
    fn next_event_date(&self) -> Option<f64> {
        self.queue.peek().map(|p| p.date)
    }

    fn pop_event_leq(&mut self, date: f64) -> Option<TraceEvent> {
        if self.queue.peek()?.date > date {
            return None;
        }
        let pending = self.queue.pop()?;
        let event = match pending.source {
            Source::Once(value, resource) => TraceEvent {
                date: pending.date,
                resource,
                value,
            },
            Source::Cursor {
                binding,
                index,
                cycle,
            } => {
                let b = self.bindings.get(binding)?;
                let (_, raw) = b.trace.point(index, cycle)?;
                let event = TraceEvent {
                    date: pending.date,
                    resource: b.resource,
                    value: TraceValue::from_raw(b.kind, raw),
                };
                if let Some((next, next_cycle)) = b.trace.next_index(index, cycle) {
                    self.push_cursor(binding, next, next_cycle);
                }
                event
            }
        };
        trace!(event = %event, "trace event due");
        Some(event)
    }

    fn attach(&mut self, resource: ResourceId, kind: TraceKind, trace: &Trace, start: f64) {
        if trace.is_empty() {
            return;
        }
        self.bindings.push(Binding {
            resource,
            kind,
            trace: trace.clone(),
            start,
        });
        self.push_cursor(self.bindings.len() - 1, 0, 0);
    }
}
