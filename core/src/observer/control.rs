use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Engine lifecycle: `running -> {paused, stopped, finished}`,
/// `paused -> {running, stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Running,
    Paused,
    Stopped,
    Finished,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Running => "running",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
            EngineState::Finished => "finished",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable pause/resume/stop handle. Requests take effect at the engine's
/// next task boundary.
#[derive(Debug, Clone)]
pub struct EngineControl {
    tx: Arc<watch::Sender<EngineState>>,
}

impl Default for EngineControl {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(EngineState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> EngineState {
        *self.tx.borrow()
    }

    /// Returns true when the state changed.
    pub fn pause(&self) -> bool {
        self.transition(|s| (s == EngineState::Running).then_some(EngineState::Paused))
    }

    pub fn resume(&self) -> bool {
        self.transition(|s| (s == EngineState::Paused).then_some(EngineState::Running))
    }

    pub fn stop(&self) -> bool {
        self.transition(|s| {
            matches!(s, EngineState::Running | EngineState::Paused).then_some(EngineState::Stopped)
        })
    }

    /// End of run. A pause with nothing left to run also finishes.
    pub(crate) fn finish(&self) -> bool {
        self.transition(|s| {
            matches!(s, EngineState::Running | EngineState::Paused).then_some(EngineState::Finished)
        })
    }

    /// Put a finished control back to running for another run. A pending
    /// stop or pause is kept.
    pub(crate) fn rearm(&self) {
        self.transition(|s| (s == EngineState::Finished).then_some(EngineState::Running));
    }

    /// Block while paused; returns the state that ended the wait.
    pub async fn wait_while_paused(&self) -> EngineState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| *s != EngineState::Paused).await {
            Ok(state) => *state,
            // sender lives as long as self
            Err(_) => self.state(),
        };
        state
    }

    fn transition<F>(&self, next: F) -> bool
    where
        F: FnOnce(EngineState) -> Option<EngineState>,
    {
        self.tx.send_if_modified(|state| match next(*state) {
            Some(new_state) => {
                *state = new_state;
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        let control = EngineControl::new();
        assert_eq!(control.state(), EngineState::Running);
        assert!(!control.resume());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.resume());
        assert!(control.stop());
        assert!(!control.resume());
        assert!(!control.finish());
        assert_eq!(control.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_while_paused_unblocks_on_resume() {
        let control = EngineControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        assert_eq!(waiter.await.unwrap(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_stop_while_paused() {
        let control = EngineControl::new();
        control.pause();
        let other = control.clone();
        tokio::spawn(async move { other.stop() });
        assert_eq!(control.wait_while_paused().await, EngineState::Stopped);
    }
}
