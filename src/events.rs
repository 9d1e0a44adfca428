//! Real-time game events pushed to connected observers.

use crate::board::{Board, Winner};
use crate::game::GamePhase;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// Payload of a `phaseUpdated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseUpdate {
    /// Active phase.
    pub phase: GamePhase,
    /// Seconds left in the phase.
    pub time_left: u32,
}

/// Payload of a `winner` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerUpdate {
    /// Final result.
    pub winner: Winner,
}

/// Event sent over the broadcast channel, serialized as
/// `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GameEvent {
    /// A new board generation or snapshot.
    BoardUpdated(Board),
    /// Phase or timer change.
    PhaseUpdated(PhaseUpdate),
    /// Game result.
    Winner(WinnerUpdate),
}

/// Fan-out of [`GameEvent`]s. Delivery is best effort: with no subscribers
/// events are dropped, and slow subscribers skip what they missed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to every current subscriber.
    pub fn publish(&self, event: GameEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Event published"),
            Err(_) => debug!("Event dropped, no subscribers"),
        }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
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
    fn test_event_wire_format() {
        let event = GameEvent::PhaseUpdated(PhaseUpdate {
            phase: GamePhase::Placing,
            time_left: 12,
        });
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"event": "phaseUpdated", "data": {"phase": "placing", "timeLeft": 12}})
        );

        let winner = GameEvent::Winner(WinnerUpdate { winner: Winner::Tie });
        let json = serde_json::to_value(&winner).expect("serialize");
        assert_eq!(json, serde_json::json!({"event": "winner", "data": {"winner": "tie"}}));
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(GameEvent::BoardUpdated(Board::new()));
        bus.publish(GameEvent::Winner(WinnerUpdate { winner: Winner::Red }));
        assert!(matches!(rx.recv().await, Ok(GameEvent::BoardUpdated(_))));
        assert!(matches!(rx.recv().await, Ok(GameEvent::Winner(_))));
    }
}
