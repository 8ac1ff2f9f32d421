//! Per-turn typed event channel (§4.8): producers call [`EventStream::emit`], the SSE consumer
//! drains the paired receiver. An optional [`StepListener`] (the Skill Engine's observation
//! hook, §4.6) is invoked synchronously on every emit, before the event reaches the channel.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use stream_event::{StepEvent, StepKind};
use tokio::sync::mpsc;

pub trait StepListener: Send + Sync {
    fn on_step(&self, event: &StepEvent);
}

/// A turn's outbound event channel. Cheap to clone: every clone shares the same sender and
/// listener, so any task holding a clone can emit for this turn.
#[derive(Clone)]
pub struct EventStream {
    task_id: String,
    sender: mpsc::UnboundedSender<StepEvent>,
    listener: Option<Arc<dyn StepListener>>,
}

impl EventStream {
    /// Creates a stream for `task_id` and returns the receiver the SSE handler drains.
    pub fn new(task_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                task_id: task_id.into(),
                sender,
                listener: None,
            },
            receiver,
        )
    }

    pub fn with_listener(mut self, listener: Arc<dyn StepListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Non-blocking, thread-safe: never awaits, safe to call from any task that holds a clone.
    pub fn emit(&self, step: StepKind, data: Value) {
        let event = StepEvent::new(self.task_id.clone(), step, data, Utc::now());
        if let Some(listener) = &self.listener {
            listener.on_step(&event);
        }
        // Closed receiver (consumer gone) is not an error for the producer.
        let _ = self.sender.send(event);
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingListener(Mutex<Vec<StepKind>>);

    impl StepListener for RecordingListener {
        fn on_step(&self, event: &StepEvent) {
            self.0.lock().unwrap().push(event.step);
        }
    }

    #[test]
    fn emit_delivers_in_order_to_receiver() {
        let (stream, mut rx) = EventStream::new("task-1");
        stream.emit(StepKind::Confirmed, json!({}));
        stream.emit(StepKind::End, json!({"result": "ok"}));
        assert_eq!(rx.try_recv().unwrap().step, StepKind::Confirmed);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::End);
    }

    #[test]
    fn listener_observes_every_emit() {
        let listener = Arc::new(RecordingListener(Mutex::new(Vec::new())));
        let (stream, _rx) = EventStream::new("task-1");
        let stream = stream.with_listener(listener.clone());
        stream.emit(StepKind::Streaming, json!({"chunk": "a"}));
        assert_eq!(listener.0.lock().unwrap().as_slice(), &[StepKind::Streaming]);
    }
}
