use serde::Serialize;

/// Progress events emitted while a workflow executes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    NodeStarted {
        node_id: String,
        node_type: String,
        depth: usize,
    },
    NodeCompleted {
        node_id: String,
        elapsed_ms: u64,
    },
    /// A linked input was unavailable (e.g. an unselected branch).
    NodeSkipped { node_id: String },
    LoopIteration {
        node_id: String,
        iteration: usize,
        graph_nodes: usize,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(WorkflowEvent::NodeSkipped { node_id: "n".into() });
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(WorkflowEvent::NodeCompleted {
            node_id: "n1".into(),
            elapsed_ms: 3,
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            WorkflowEvent::NodeCompleted {
                node_id: "n1".into(),
                elapsed_ms: 3
            }
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::LoopIteration {
            node_id: "loop".into(),
            iteration: 2,
            graph_nodes: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loop_iteration");
        assert_eq!(json["iteration"], 2);
    }
}
