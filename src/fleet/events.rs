//! Events published by the fleet
//!
//! Everything a shell needs to render: per-bot log lines, state changes and
//! the aggregate flags that enable or disable bulk controls.

use super::bot::{BotId, BotSnapshot, BotState, LogLine};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default event channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Events emitted by the fleet controller
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Controller event loop started
    Started,

    /// Controller event loop stopped
    Stopped,

    /// Bot registered
    BotAdded { bot: BotSnapshot },

    /// Bot deregistered
    BotRemoved { bot: BotId },

    /// Line appended to a bot's log
    Line { bot: BotId, line: LogLine },

    /// Bot lifecycle state changed
    StateChanged { bot: BotId, state: BotState },

    /// Aggregate flags changed
    AggregateChanged { any_running: bool, any_stopped: bool },

    /// A command from the command channel could not be applied
    CommandRejected { target: String, reason: String },
}

/// Cloneable sender side of the event channel
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: broadcast::Sender<FleetEvent>,
    capacity: usize,
}

impl EventSink {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Send an event, logging when the channel is close to full
    pub(crate) fn send(&self, event: FleetEvent) {
        match self.tx.send(event) {
            Ok(_) => {
                let len = self.tx.len();
                if len > self.capacity * 80 / 100 {
                    tracing::warn!(
                        current = len,
                        capacity = self.capacity,
                        threshold_pct = 80,
                        "Event channel nearing capacity, slow subscribers will lag"
                    );
                }
            }
            Err(_) => {
                tracing::trace!("Event sent but no receivers subscribed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let sink = EventSink::new(8);
        sink.send(FleetEvent::Started);
    }

    #[test]
    fn test_subscriber_receives() {
        let sink = EventSink::new(8);
        let mut rx = sink.subscribe();

        sink.send(FleetEvent::AggregateChanged {
            any_running: true,
            any_stopped: false,
        });

        match rx.try_recv().unwrap() {
            FleetEvent::AggregateChanged {
                any_running,
                any_stopped,
            } => {
                assert!(any_running);
                assert!(!any_stopped);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = FleetEvent::StateChanged {
            bot: BotId(4),
            state: BotState::Running,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"state_changed","bot":"bot-4","state":"running"}"#);
    }
}
