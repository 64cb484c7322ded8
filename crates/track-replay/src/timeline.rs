//! Fixed-step timeline over a data range

use crate::error::ReplayError;

/// One timeline position: the window `[start, end]` shown at that moment
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Tick {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

/// Emits ticks from the data start to the data end
///
/// With a zero window every tick shows everything from the data start, otherwise
/// the trailing `window` seconds before the tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    start: f64,
    end: f64,
    step: f64,
    window: f64,
}

impl Timeline {
    pub fn new(start: f64, end: f64, step: f64, window: f64) -> Result<Self, ReplayError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(ReplayError::InvalidStep(step));
        }
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Ok(Self {
            start,
            end,
            step,
            window: window.max(0.0),
        })
    }

    /// Number of ticks; the last one always lands on the data end
    pub fn tick_count(&self) -> usize {
        (((self.end - self.start) / self.step).ceil() as usize).max(1)
    }

    pub fn ticks(&self) -> impl Iterator<Item = Tick> + '_ {
        (1..=self.tick_count()).map(move |index| {
            let end = (self.start + index as f64 * self.step).min(self.end);
            let start = if self.window > 0.0 {
                end - self.window
            } else {
                self.start
            };
            Tick {
                index: index - 1,
                start,
                end,
            }
        })
    }
}
