use std::sync::Arc;

use super::control::EngineControl;
use super::events::EngineEvent;

/// What an observer asks of the engine after seeing an event. Requests are
/// folded with `Stop > Pause > Continue`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControlRequest {
    #[default]
    Continue,
    Pause,
    Stop,
}

impl ControlRequest {
    pub fn merge(self, other: ControlRequest) -> ControlRequest {
        self.max(other)
    }
}

/// Receives engine events on the engine's own task.
pub trait EngineObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &EngineEvent) -> ControlRequest;
}

/// Per-engine set of observers. Control requests are applied to the
/// engine's [`EngineControl`].
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn EngineObserver>>,
    control: EngineControl,
}

impl ObserverRegistry {
    pub fn new(control: EngineControl) -> Self {
        Self {
            observers: Vec::new(),
            control,
        }
    }

    pub fn register(&mut self, observer: Arc<dyn EngineObserver>) {
        tracing::debug!(observer = observer.name(), "observer registered");
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn control(&self) -> &EngineControl {
        &self.control
    }

    /// Deliver `event` to every observer in registration order and apply the
    /// folded request.
    pub fn notify(&self, event: &EngineEvent) -> ControlRequest {
        let request = self
            .observers
            .iter()
            .map(|o| {
                let req = o.on_event(event);
                if req != ControlRequest::Continue {
                    tracing::info!(observer = o.name(), event = event.kind(), request = ?req, "observer requested engine control");
                }
                req
            })
            .fold(ControlRequest::Continue, ControlRequest::merge);

        match request {
            ControlRequest::Continue => {}
            ControlRequest::Pause => {
                self.control.pause();
            }
            ControlRequest::Stop => {
                self.control.stop();
            }
        }
        request
    }
}
