use crate::types::{Account, Candle, FillOrder, OrderResponse, Position};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Domain event delivered to the strategy consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Candle(Candle),
    Account(Account),
    /// Complete position set; replaces the previous one
    Positions(Vec<Position>),
    Fill(FillOrder),
    OrderResponse(OrderResponse),
}

/// Event discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Candle,
    Account,
    Positions,
    Fill,
    OrderResponse,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Candle(_) => EventKind::Candle,
            Event::Account(_) => EventKind::Account,
            Event::Positions(_) => EventKind::Positions,
            Event::Fill(_) => EventKind::Fill,
            Event::OrderResponse(_) => EventKind::OrderResponse,
        }
    }
}

/// Producer half of the delivery queue, one clone per channel listener
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Consumer half of the delivery queue
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the unbounded FIFO delivery queue
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus;

    fn response(id: &str) -> OrderResponse {
        OrderResponse {
            op: "order".to_string(),
            id: id.to_string(),
            status: OrderStatus::Ok,
            code: "0".to_string(),
            msg: String::new(),
            order_id: Some("1".to_string()),
            client_order_id: Some(id.to_string()),
        }
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(Event::Positions(vec![]).kind(), EventKind::Positions);
        assert_eq!(
            Event::OrderResponse(response("a")).kind(),
            EventKind::OrderResponse
        );
    }

    #[tokio::test]
    async fn test_queue_is_fifo_across_producers() {
        let (tx, mut rx) = event_queue();
        let other = tx.clone();

        tx.send(Event::OrderResponse(response("1"))).unwrap();
        other.send(Event::OrderResponse(response("2"))).unwrap();
        tx.send(Event::OrderResponse(response("3"))).unwrap();
        drop(tx);
        drop(other);

        let mut ids = Vec::new();
        while let Some(Event::OrderResponse(r)) = rx.recv().await {
            ids.push(r.id);
        }
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
