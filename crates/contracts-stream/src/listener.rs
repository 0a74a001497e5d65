//! The change-notification listener (spec §4.4 "Change firehose",
//! "Reconnection"): a single long-lived connection dedicated to `LISTEN`,
//! wrapping `sqlx::postgres::PgListener` directly rather than reimplementing
//! connection/`LISTEN` management.

use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::notification::ChangeNotification;

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Spawn the listener task, returning a channel of parsed notifications.
/// The task treats every transport fault as transient (spec §4.4: "The
/// listener's transport end is treated as a transient fault") and
/// reconnects with bounded-exponential backoff, forever, until the
/// returned receiver is dropped.
pub fn spawn_listener(pool: PgPool, channel: String) -> mpsc::UnboundedReceiver<ChangeNotification> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut backoff = Backoff::new(BACKOFF_BASE, BACKOFF_CAP);
        loop {
            match PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(e) = listener.listen(&channel).await {
                        tracing::warn!(error = %e, "failed to LISTEN, retrying");
                        tokio::time::sleep(backoff.next_delay()).await;
                        continue;
                    }
                    backoff.reset();
                    loop {
                        match listener.recv().await {
                            Ok(notification) => match ChangeNotification::parse(notification.payload()) {
                                Ok(parsed) => {
                                    if tx.send(parsed).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => tracing::warn!(error = %e, "dropping malformed change notification"),
                            },
                            Err(e) => {
                                tracing::warn!(error = %e, "listener connection lost, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open listener connection, retrying");
                }
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    });
    rx
}
