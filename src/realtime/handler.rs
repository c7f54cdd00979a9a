use crate::core::{signalled, Event, EventReceiver};
use crate::types::{Account, Candle, FillOrder, OrderResponse, Position};
use async_trait::async_trait;
use log::{debug, trace};
use tokio::sync::watch;

/// Callbacks a trading policy supplies to the runtime.
///
/// Every method defaults to a no-op, so a policy only overrides what it uses.
/// Handlers are invoked one at a time in queue order.
#[async_trait]
pub trait EventHandler: Send {
    async fn on_candle(&mut self, _candle: Candle) {}

    async fn on_account(&mut self, _account: Account) {}

    /// Complete position set, replacing the previous one
    async fn on_positions(&mut self, _positions: Vec<Position>) {}

    async fn on_fill(&mut self, _fill: FillOrder) {}

    async fn on_order_response(&mut self, _response: OrderResponse) {}
}

/// Handler that ignores everything
#[derive(Debug, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

/// Route one event to its handler method
pub async fn dispatch(handler: &mut (dyn EventHandler + '_), event: Event) {
    trace!("dispatching {:?}", event.kind());
    match event {
        Event::Candle(candle) => handler.on_candle(candle).await,
        Event::Account(account) => handler.on_account(account).await,
        Event::Positions(positions) => handler.on_positions(positions).await,
        Event::Fill(fill) => handler.on_fill(fill).await,
        Event::OrderResponse(response) => handler.on_order_response(response).await,
    }
}

/// Consumer loop: drain `receiver` into `handler` until the queue closes or
/// `shutdown` flips
pub async fn consume(
    mut receiver: EventReceiver,
    mut handler: Box<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = signalled(&mut shutdown) => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(handler.as_mut(), event).await;
    }
    debug!("Event consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_queue;
    use crate::types::datetime_from_ms;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn on_candle(&mut self, candle: Candle) {
            self.seen.lock().unwrap().push(format!("candle {}", candle.close));
        }

        async fn on_positions(&mut self, positions: Vec<Position>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("positions {}", positions.len()));
        }
    }

    fn candle(close: f64) -> Event {
        Event::Candle(Candle {
            inst_id: "BTC-USDT".to_string(),
            timeframe: "1m".to_string(),
            timestamp: datetime_from_ms(60_000).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
    }

    #[tokio::test]
    async fn test_consume_preserves_order() {
        let (tx, rx) = event_queue();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);

        tx.send(candle(1.0)).unwrap();
        tx.send(Event::Positions(vec![])).unwrap();
        tx.send(candle(3.0)).unwrap();
        drop(tx);

        consume(rx, Box::new(recorder), shutdown_rx).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["candle 1", "positions 0", "candle 3"]
        );
    }

    #[tokio::test]
    async fn test_default_handlers_ignore_events() {
        let mut handler = NoopHandler;
        dispatch(&mut handler, Event::Positions(vec![])).await;
        dispatch(&mut handler, candle(1.0)).await;
    }

    #[tokio::test]
    async fn test_consume_stops_on_shutdown() {
        let (_tx, rx) = event_queue();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(consume(rx, Box::new(NoopHandler), shutdown_rx));

        shutdown_tx.send_replace(true);
        tokio::time::timeout(std::time::Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
    }
}
