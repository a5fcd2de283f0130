//! Outbound pump: the only writer of a chat socket

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::connection::PumpSettings;

/// Why an outbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// Queue closed; a close frame was attempted
    QueueClosed,
    /// Writing a queued frame failed or timed out
    WriteFailed,
    /// Sending the liveness probe failed or timed out
    PingFailed,
}

/// Drain `queue` into `sink` and probe the peer every `ping_period`
pub async fn write_pump<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<String>,
    session_id: Uuid,
    settings: PumpSettings,
) -> OutboundExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ticker = time::interval_at(Instant::now() + settings.ping_period, settings.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(text) = frame else {
                    if let Err(e) = write(&mut sink, Message::Close(None), &settings).await {
                        tracing::debug!(session_id = %session_id, error = %e, "Failed to send close frame");
                    }
                    return OutboundExit::QueueClosed;
                };

                if let Err(e) = write(&mut sink, Message::Text(text), &settings).await {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket write failed");
                    return OutboundExit::WriteFailed;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write(&mut sink, Message::Ping(Vec::new()), &settings).await {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket ping failed");
                    return OutboundExit::PingFailed;
                }
            }
        }
    }
}

async fn write<W>(sink: &mut W, message: Message, settings: &PumpSettings) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match time::timeout(settings.write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write timed out after {:?}", settings.write_wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;
    use std::time::Duration;

    fn settings() -> PumpSettings {
        PumpSettings::new(Duration::from_secs(1), Duration::from_secs(10), 1024, 8)
    }

    #[tokio::test]
    async fn test_frames_written_in_order_then_close() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(8);

        for frame in ["a", "b", "c"] {
            tx.try_send(frame.to_string()).unwrap();
        }
        drop(tx);

        let exit = write_pump(sink, rx, Uuid::new_v4(), settings()).await;
        assert_eq!(exit, OutboundExit::QueueClosed);

        let mut texts = Vec::new();
        while let Some(msg) = written.next().await {
            match msg {
                Message::Text(t) => texts.push(t),
                Message::Close(_) => {
                    texts.push("<close>".to_string());
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(texts, vec!["a", "b", "c", "<close>"]);
    }

    #[tokio::test]
    async fn test_write_failure_terminates_pump() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let (tx, rx) = mpsc::channel(8);
        tx.try_send("hello".to_string()).unwrap();

        let exit = write_pump(sink, rx, Uuid::new_v4(), settings()).await;
        assert_eq!(exit, OutboundExit::WriteFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_probe_sent_on_ping_period() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel::<String>(8);

        let pump = tokio::spawn(write_pump(sink, rx, Uuid::new_v4(), settings()));

        time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(written.next().await, Some(Message::Ping(_))));

        drop(tx);
        assert_eq!(pump.await.unwrap(), OutboundExit::QueueClosed);
    }
}
