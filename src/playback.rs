use std::panic;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLog {
    pub role: &'static str,
    pub message: &'static str,
}

pub const AGENT_LOGS: [AgentLog; 5] = [
    AgentLog {
        role: "IDENTITY DETECTED",
        message: "All agents on board..",
    },
    AgentLog {
        role: "MARKET ANALYST",
        message: "Calculating 1,000 market scenarios...",
    },
    AgentLog {
        role: "RISK ANALYSIS",
        message: "Stress-testing unit economics...",
    },
    AgentLog {
        role: "CUSTOMER AGENT",
        message: "Simulating target persona responses...",
    },
    AgentLog {
        role: "INVESTOR AGENT",
        message: "Scoring growth, defensibility, and runway...",
    },
];

/// Cancels a running playback from any thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `timeout` unless cancelled first. Returns true if cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// Agent activity shown while a simulation runs: the first entry at once,
/// then one entry per step.
pub struct LogPlayback {
    entries: Vec<AgentLog>,
    step: Duration,
}

impl LogPlayback {
    pub fn new(step: Duration) -> Self {
        Self::with_entries(AGENT_LOGS.to_vec(), step)
    }

    pub fn with_entries(entries: Vec<AgentLog>, step: Duration) -> Self {
        Self { entries, step }
    }

    /// Time the full playback takes when not cancelled
    pub fn min_duration(&self) -> Duration {
        self.step * self.entries.len().saturating_sub(1) as u32
    }

    /// Returns how many entries were shown.
    pub fn play<F: FnMut(usize, &AgentLog)>(&self, cancel: &CancelToken, mut on_entry: F) -> usize {
        let mut shown = 0;
        for (idx, entry) in self.entries.iter().enumerate() {
            let cancelled = if idx == 0 {
                cancel.is_cancelled()
            } else {
                cancel.wait(self.step)
            };
            if cancelled {
                tracing::debug!(shown, "Playback cancelled");
                break;
            }
            on_entry(idx, entry);
            shown += 1;
        }
        shown
    }
}

/// Run `work` on the calling thread while the playback runs beside it.
///
/// Returns only after both have finished, with the work's result and the
/// number of entries shown.
pub fn run_with_playback<T, F, W>(playback: &LogPlayback, cancel: &CancelToken, on_entry: F, work: W) -> (T, usize)
where
    F: FnMut(usize, &AgentLog) + Send,
    W: FnOnce() -> T,
{
    thread::scope(|scope| {
        let player = scope.spawn(move || playback.play(cancel, on_entry));
        let result = work();
        match player.join() {
            Ok(shown) => (result, shown),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}
