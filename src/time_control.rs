use std::time::{Duration, Instant};

/// Wall-clock budget for one search.
pub struct TimeControl {
    start_time: Instant,
    allocated_time: Option<Duration>,
}

impl TimeControl {
    /// Think for exactly `allocated_ms` milliseconds.
    pub fn new(allocated_ms: u64) -> Self {
        TimeControl {
            start_time: Instant::now(),
            allocated_time: Some(Duration::from_millis(allocated_ms)),
        }
    }

    /// No time limit (`go infinite` and pondering).
    pub fn infinite() -> Self {
        TimeControl {
            start_time: Instant::now(),
            allocated_time: None,
        }
    }

    #[inline(always)]
    pub fn is_infinite(&self) -> bool {
        self.allocated_time.is_none()
    }

    #[inline(always)]
    pub fn should_stop(&self) -> bool {
        match self.allocated_time {
            Some(allocated) => self.start_time.elapsed() >= allocated,
            None => false,
        }
    }

    pub fn allocated_ms(&self) -> Option<u64> {
        self.allocated_time.map(|d| d.as_millis() as u64)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

/// Think time for a clock-based `go`: a fortieth of the remaining time plus
/// most of the increment, floored so a low clock still gets a real search.
pub fn think_time_ms(remaining_ms: u64, increment_ms: u64) -> u64 {
    let mut think = remaining_ms / 40;
    if remaining_ms > increment_ms * 2 {
        think += increment_ms * 8 / 10;
    }
    let min_think = 50.min(remaining_ms / 4);
    think.max(min_think)
}
