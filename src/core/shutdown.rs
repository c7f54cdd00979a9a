use tokio::sync::watch;

/// Resolves once `rx` reads true. A dropped sender never resolves.
pub async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_on_flip() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { signalled(&mut rx).await });
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_stays_pending() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let result = tokio::time::timeout(Duration::from_millis(50), signalled(&mut rx)).await;
        assert!(result.is_err());
    }
}
