//! # Catalog Synchronization
//!
//! Layer changes arrive as notifications on a Postgres channel. A single
//! task parses them and applies them one at a time, in arrival order.
//! Malformed payloads are logged and dropped; the stream keeps running.
//!
//! Notifications sent while the listener is disconnected are gone for
//! good, and so is an event whose apply failed on a transient error. Both
//! cases end in a full rescan of the registry ([`ApplyEvent::resync`]).

use std::time::Duration;

use futures_util::{pin_mut, Stream, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::catalog::ApplyEvent;
use super::errors::CatalogResult;
use super::event::CatalogEvent;
use crate::observability::Event;

/// Pause before retrying after the listener lost its connection
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Item of the change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Raw notification payload
    Payload(String),
    /// Events may have been missed; the whole catalog must be reloaded
    Resync,
}

/// Counters for one run of [`apply_stream`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub applied: u64,
    pub dropped: u64,
    pub failed: u64,
    /// Completed full reloads
    pub resyncs: u64,
}

/// Listener on the layer change channel
pub struct NotificationListener {
    listener: PgListener,
    channel: String,
}

impl NotificationListener {
    /// Attaches to the channel. Subscribe before the bootstrap scan so no
    /// change made during the scan is missed.
    pub async fn connect(pool: &PgPool, channel: &str) -> CatalogResult<Self> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        info!(event = %Event::CatalogSubscribed, channel, "listening for layer changes");

        Ok(Self {
            listener,
            channel: channel.to_string(),
        })
    }

    /// Endless stream of change messages.
    ///
    /// A lost connection is re-established (with LISTEN re-issued) before
    /// [`SyncMessage::Resync`] is yielded, so the rescan never races a
    /// missing subscription.
    pub fn into_messages(self) -> impl Stream<Item = SyncMessage> + Send {
        futures_util::stream::unfold(self, |mut this| async move {
            let message = this.next_message().await;
            Some((message, this))
        })
    }

    async fn next_message(&mut self) -> SyncMessage {
        match self.listener.try_recv().await {
            Ok(Some(notification)) => return SyncMessage::Payload(notification.payload().to_string()),
            Ok(None) => warn!(channel = %self.channel, "notification connection lost"),
            Err(e) => warn!(channel = %self.channel, error = %e, "notification listener error"),
        }
        self.reconnect().await;
        SyncMessage::Resync
    }

    /// Any statement on the listener reconnects it and re-subscribes every
    /// channel it listened on.
    async fn reconnect(&mut self) {
        loop {
            match sqlx::query("SELECT 1").execute(&mut self.listener).await {
                Ok(_) => {
                    info!(event = %Event::CatalogSubscribed, channel = %self.channel, "listening again after reconnect");
                    return;
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "reconnect failed, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}

/// Applies messages strictly in order until the stream ends.
///
/// A resync that fails is retried after the next message.
pub async fn apply_stream<A, S>(target: &A, messages: S) -> SyncStats
where
    A: ApplyEvent + ?Sized,
    S: Stream<Item = SyncMessage>,
{
    pin_mut!(messages);
    let mut stats = SyncStats::default();
    let mut resync_pending = false;

    while let Some(message) = messages.next().await {
        match message {
            SyncMessage::Resync => resync_pending = true,
            SyncMessage::Payload(payload) => {
                resync_pending |= apply_payload(target, &payload, &mut stats).await;
            }
        }

        if resync_pending {
            match target.resync().await {
                Ok(layers) => {
                    info!(event = %Event::CatalogResynced, layers, "catalog resynced");
                    stats.resyncs += 1;
                    resync_pending = false;
                }
                Err(e) => {
                    warn!(event = %Event::CatalogEventFailed, error = %e, "catalog resync failed");
                }
            }
        }
    }

    info!(
        event = %Event::CatalogStreamClosed,
        applied = stats.applied,
        dropped = stats.dropped,
        failed = stats.failed,
        resyncs = stats.resyncs
    );
    stats
}

/// Returns true when the failure may have left the catalog stale
async fn apply_payload<A>(target: &A, payload: &str, stats: &mut SyncStats) -> bool
where
    A: ApplyEvent + ?Sized,
{
    let event = match CatalogEvent::parse(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(event = %Event::CatalogEventDropped, payload = %payload, error = %e, "dropping catalog notification");
            stats.dropped += 1;
            return false;
        }
    };

    match target.apply(event).await {
        Ok(change) => {
            debug!(event = %Event::CatalogEventApplied, change = ?change, layer_id = %event.layer_id, kind = %event.kind);
            stats.applied += 1;
            false
        }
        Err(e) => {
            warn!(event = %Event::CatalogEventFailed, layer_id = %event.layer_id, error = %e, "catalog event failed");
            stats.failed += 1;
            e.is_retryable()
        }
    }
}
