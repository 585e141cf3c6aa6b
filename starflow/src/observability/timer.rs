//! Wall-clock timing for task runs.

use std::time::Instant;

/// Times one node from its first attempt to its final outcome.
#[derive(Debug)]
pub struct TaskTimer {
    task: String,
    started: Instant,
}

impl TaskTimer {
    /// Starts timing `task`.
    #[must_use]
    pub fn start(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            started: Instant::now(),
        }
    }

    /// Milliseconds since [`TaskTimer::start`].
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// The timed task.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Stops the timer, logging and returning the elapsed milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(task = %self.task, duration_ms, "Task timer stopped");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_elapsed_time() {
        let timer = TaskTimer::start("Stage_songs");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.task(), "Stage_songs");
        assert!(timer.finish() >= 10.0);
    }
}
