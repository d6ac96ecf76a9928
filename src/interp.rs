// Time-ordered state buffering and interpolation

use std::collections::VecDeque;

use crate::constants::{INTERP_EPSILON_MS, RETENTION_WINDOW_MS};
use crate::telegram::EntityState;

/// Sliding window of state samples for one entity, ordered by sender
/// timestamp.
///
/// Appends enforce strictly increasing timestamps: a sample at or before
/// the newest buffered one is dropped. After each append the front is
/// trimmed until the window spans at most RETENTION_WINDOW_MS, so the
/// buffer holds about one second of history.
#[derive(Debug, Default)]
pub struct StateBuffer {
    buffer: VecDeque<EntityState>,
}

impl StateBuffer {
    pub fn new() -> Self {
        StateBuffer {
            buffer: VecDeque::new(),
        }
    }

    /// Append a sample. Returns true if it was kept.
    pub fn append(&mut self, state: EntityState) -> bool {
        if let Some(newest) = self.buffer.back() {
            if state.timestamp <= newest.timestamp {
                return false;
            }
        }
        self.buffer.push_back(state);

        let newest = state.timestamp;
        while let Some(front) = self.buffer.front() {
            if newest - front.timestamp > RETENTION_WINDOW_MS {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
        true
    }

    /// State at `render_time`, a timestamp on the sender's clock.
    ///
    /// Clamps to the buffered range: at or before the oldest sample the
    /// oldest is returned verbatim, at or past the newest the newest is
    /// returned verbatim. An empty buffer yields an all-zero state stamped
    /// with `render_time`. Between two samples every numeric field is
    /// blended linearly; angles get no wraparound treatment, so a heading
    /// crossing north sweeps the long way round for one interval.
    pub fn sample_at(&self, render_time: i64) -> EntityState {
        let (front, back) = match (self.buffer.front(), self.buffer.back()) {
            (Some(front), Some(back)) => (front, back),
            _ => return EntityState::zeroed(render_time),
        };

        if self.buffer.len() == 1 || render_time <= front.timestamp {
            return *front;
        }
        if render_time >= back.timestamp {
            return *back;
        }

        for i in 0..self.buffer.len() - 1 {
            let a = &self.buffer[i];
            let b = &self.buffer[i + 1];
            if a.timestamp <= render_time && render_time <= b.timestamp {
                return lerp(a, b, render_time);
            }
        }

        // Unreachable with an ordered buffer, but the newest sample is
        // always a safe answer.
        *back
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Sender timestamp of the newest sample, if any.
    pub fn newest_timestamp(&self) -> Option<i64> {
        self.buffer.back().map(|s| s.timestamp)
    }

    /// Sender timestamp of the oldest sample, if any.
    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.buffer.front().map(|s| s.timestamp)
    }
}

/// Linear blend of two samples at `render_time` between them. The result
/// is stamped with `render_time`. Intervals narrower than the epsilon
/// resolve to the older sample's values.
fn lerp(a: &EntityState, b: &EntityState, render_time: i64) -> EntityState {
    let total = (b.timestamp - a.timestamp) as f64;
    let portion = (render_time - a.timestamp) as f64;
    let t = if total > INTERP_EPSILON_MS {
        portion / total
    } else {
        0.0
    };

    EntityState {
        timestamp: render_time,
        lat: a.lat + (b.lat - a.lat) * t,
        lon: a.lon + (b.lon - a.lon) * t,
        el: a.el + (b.el - a.el) * t,
        pitch: a.pitch + (b.pitch - a.pitch) * t,
        roll: a.roll + (b.roll - a.roll) * t,
        heading: a.heading + (b.heading - a.heading) * t,
    }
}
