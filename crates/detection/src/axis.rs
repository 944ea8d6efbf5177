//! Dominant-axis selection over the three-axis motion stream.
//!
//! Keeps rolling 50-sample windows per axis and re-selects the axis of
//! maximum variance only on exact window boundaries; between boundaries the
//! previous selection holds.

use contracts::AxisTriple;
use tracing::debug;

const WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn label(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

#[derive(Debug)]
pub struct AxisVarianceTracker {
    windows: [Vec<f32>; 3],
    dominant: Axis,
}

impl Default for AxisVarianceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisVarianceTracker {
    pub fn new() -> Self {
        Self {
            windows: [
                Vec::with_capacity(WINDOW),
                Vec::with_capacity(WINDOW),
                Vec::with_capacity(WINDOW),
            ],
            dominant: Axis::X,
        }
    }

    /// Feed one scaled triple; returns the value of the currently dominant
    /// axis (re-selected first if this sample completes a window).
    pub fn push(&mut self, scaled: [f64; 3]) -> f32 {
        self.windows[0].push(scaled[0] as f32);
        self.windows[1].push(scaled[1] as f32);
        self.windows[2].push(scaled[2] as f32);

        if self.windows[0].len() == WINDOW {
            self.reselect();
            for w in &mut self.windows {
                w.clear();
            }
        }

        match self.dominant {
            Axis::X => scaled[0] as f32,
            Axis::Y => scaled[1] as f32,
            Axis::Z => scaled[2] as f32,
        }
    }

    /// Convenience for raw triples.
    pub fn push_triple(&mut self, t: AxisTriple) -> f32 {
        self.push(t.scaled())
    }

    pub fn dominant(&self) -> Axis {
        self.dominant
    }

    fn reselect(&mut self) {
        let vars = [
            variance(&self.windows[0]),
            variance(&self.windows[1]),
            variance(&self.windows[2]),
        ];
        let mut best = 0;
        for i in 1..3 {
            if vars[i] > vars[best] {
                best = i;
            }
        }
        let next = match best {
            0 => Axis::X,
            1 => Axis::Y,
            _ => Axis::Z,
        };
        if next != self.dominant {
            debug!(
                from = self.dominant.label(),
                to = next.label(),
                "dominant motion axis re-selected"
            );
        }
        self.dominant = next;
    }
}

fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_previous_axis_between_boundaries() {
        let mut tracker = AxisVarianceTracker::new();
        // 49 samples of wild Y motion must not flip the selection yet.
        for i in 0..(WINDOW - 1) {
            tracker.push([0.0, if i % 2 == 0 { 1.0 } else { -1.0 }, 0.0]);
        }
        assert_eq!(tracker.dominant(), Axis::X);
        // Sample 50 completes the window and triggers re-selection.
        tracker.push([0.0, 1.0, 0.0]);
        assert_eq!(tracker.dominant(), Axis::Y);
    }

    #[test]
    fn test_returns_dominant_axis_value() {
        let mut tracker = AxisVarianceTracker::new();
        for i in 0..WINDOW {
            tracker.push([0.0, 0.0, if i % 2 == 0 { 2.0 } else { -2.0 }]);
        }
        assert_eq!(tracker.dominant(), Axis::Z);
        let v = tracker.push([0.5, 0.25, 0.125]);
        assert_eq!(v, 0.125);
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[3.0, 3.0, 3.0]), 0.0);
        assert!((variance(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
    }
}
