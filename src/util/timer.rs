//! Phase timing on the wall clock and the process CPU clock.

use cpu_time::ProcessTime;
use std::time::{Duration, Instant};

/// Wall-clock and CPU durations of one pipeline phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Elapsed {
    pub(crate) wall: Duration,
    pub(crate) cpu: Duration,
}

/// Measures one pipeline phase.
pub(crate) struct Timer {
    wall: Instant,
    cpu: ProcessTime,
}

impl Timer {
    pub(crate) fn start() -> Self {
        Self {
            wall: Instant::now(),
            cpu: ProcessTime::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Elapsed {
        Elapsed {
            wall: self.wall.elapsed(),
            cpu: self.cpu.elapsed(),
        }
    }
}
