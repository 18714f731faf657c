/// Trace profiles and their text format.
///
/// ```text
/// # availability of host-1
/// PERIODICITY 10.0
/// 0.0 1.0
/// 4.0 0.5
/// 8.0 0.0
/// ```
///
/// Each non-comment line is `date value`, dates non-decreasing and relative
/// to the date the trace is attached at. An optional `PERIODICITY p` (or
/// `LOOPAFTER p`) header makes the profile repeat, the first point of the
/// next cycle coming `p` seconds after the last point of the previous one.

use std::path::Path;

use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    points: Vec<(f64, f64)>,
    periodicity: Option<f64>,
}

impl Trace {
    /// Build a trace from `(date, value)` points.
    pub fn from_points(points: Vec<(f64, f64)>, periodicity: Option<f64>) -> KernelResult<Self> {
        let mut trace = Trace {
            points: Vec::with_capacity(points.len()),
            periodicity: None,
        };
        for (i, (date, value)) in points.into_iter().enumerate() {
            trace.push(i + 1, date, value)?;
        }
        trace.set_periodicity(0, periodicity)?;
        Ok(trace)
    }

    /// Parse the text format.
    pub fn parse(text: &str) -> KernelResult<Self> {
        let mut trace = Trace::default();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(head) = parts.next() else {
                continue;
            };
            if head == "PERIODICITY" || head == "LOOPAFTER" {
                let period = parse_number(parts.next(), line_no, "period")?;
                trace.set_periodicity(line_no, Some(period))?;
            } else {
                let date = parse_number(Some(head), line_no, "date")?;
                let value = parse_number(parts.next(), line_no, "value")?;
                trace.push(line_no, date, value)?;
            }
            if let Some(extra) = parts.next() {
                return Err(KernelError::InvalidTrace {
                    line: line_no,
                    reason: format!("unexpected token '{}'", extra),
                });
            }
        }

        Ok(trace)
    }

    /// Read and parse a trace file.
    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn periodicity(&self) -> Option<f64> {
        self.periodicity
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Time between the first point of two consecutive cycles.
    pub fn cycle_length(&self) -> Option<f64> {
        let period = self.periodicity?;
        let first = self.points.first()?.0;
        let last = self.points.last()?.0;
        Some(last - first + period)
    }

    /// Date (relative to attach time) and value of point `index` in `cycle`.
    pub fn point(&self, index: usize, cycle: u64) -> Option<(f64, f64)> {
        let (date, value) = *self.points.get(index)?;
        let offset = match self.cycle_length() {
            Some(len) => len * cycle as f64,
            None if cycle == 0 => 0.0,
            None => return None,
        };
        Some((date + offset, value))
    }

    /// The point following `(index, cycle)`, wrapping around periodic traces.
    pub fn next_index(&self, index: usize, cycle: u64) -> Option<(usize, u64)> {
        if index + 1 < self.points.len() {
            Some((index + 1, cycle))
        } else if self.cycle_length().is_some() {
            Some((0, cycle + 1))
        } else {
            None
        }
    }

    fn push(&mut self, line: usize, date: f64, value: f64) -> KernelResult<()> {
        if !date.is_finite() || date < 0.0 {
            return Err(KernelError::InvalidTrace {
                line,
                reason: format!("invalid date {}", date),
            });
        }
        if let Some((last, _)) = self.points.last() {
            if date < *last {
                return Err(KernelError::InvalidTrace {
                    line,
                    reason: format!("date {} goes back before {}", date, last),
                });
            }
        }
        self.points.push((date, value));
        Ok(())
    }

    fn set_periodicity(&mut self, line: usize, period: Option<f64>) -> KernelResult<()> {
        match period {
            Some(p) if !p.is_finite() => Err(KernelError::InvalidTrace {
                line,
                reason: format!("invalid period {}", p),
            }),
            // A non-positive period means the trace does not loop.
            Some(p) if p <= 0.0 => {
                self.periodicity = None;
                Ok(())
            }
            other => {
                self.periodicity = other;
                Ok(())
            }
        }
    }
}

fn parse_number(token: Option<&str>, line: usize, what: &str) -> KernelResult<f64> {
    let token = token.ok_or_else(|| KernelError::InvalidTrace {
        line,
        reason: format!("missing {}", what),
    })?;
    token.parse::<f64>().map_err(|e| KernelError::InvalidTrace {
        line,
        reason: format!("bad {} '{}': {}", what, token, e),
    })
}
