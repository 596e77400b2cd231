use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::envelope::metadata_values;
use super::{Envelope, InMemoryQueue, Reply, QUEUE_TRANSPORT};
use crate::context::{new_id, ConquerorContext};
use crate::dispatch::{InboundRequest, Messaging};
use crate::error::MessagingError;
use crate::pipeline::TransportType;
use crate::transport::{CONTEXT_HEADER, MESSAGE_ID_HEADER, TRACE_ID_HEADER};

/// Statistics from a queue listener.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// Number of messages successfully handled.
    pub handled: usize,
    /// Number of messages that failed handling.
    pub failed: usize,
}

/// Handle to a background listener task. Drop or call `stop()` to shut down.
pub struct QueueHandle {
    stop: CancellationToken,
    handle: Option<JoinHandle<TransportStats>>,
}

impl QueueHandle {
    /// Stop taking new envelopes and wait for in-flight messages to finish.
    ///
    /// In-flight handlers are not cancelled; each still sends its reply.
    /// Returns stats.
    pub async fn stop(mut self) -> TransportStats {
        self.stop.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => TransportStats::default(),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Start consuming `queue` and dispatching envelopes to handlers in `messaging`.
///
/// Must be called from within a tokio runtime. Envelopes are handled
/// concurrently; each gets exactly one [`Reply`]. The listener counts as
/// attached to the queue until its task ends.
pub fn listen(messaging: Messaging, queue: InMemoryQueue) -> QueueHandle {
    let stop = CancellationToken::new();
    let token = stop.clone();
    let attached = queue.attach_listener();

    let handle = tokio::spawn(async move {
        let _attached = attached;
        let mut stats = TransportStats::default();
        let mut in_flight: JoinSet<bool> = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    record(&mut stats, done.unwrap_or(false));
                }
                next = queue.receive() => {
                    let Some((envelope, reply_to)) = next else { break };
                    let messaging = messaging.clone();
                    in_flight.spawn(async move {
                        let reply =
                            handle_envelope(&messaging, envelope, CancellationToken::new()).await;
                        let ok = reply.is_success();
                        let _ = reply_to.send(reply);
                        ok
                    });
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            record(&mut stats, done.unwrap_or(false));
        }

        tracing::debug!(handled = stats.handled, failed = stats.failed, "queue listener stopped");
        stats
    });

    QueueHandle {
        stop,
        handle: Some(handle),
    }
}

fn record(stats: &mut TransportStats, ok: bool) {
    if ok {
        stats.handled += 1;
    } else {
        stats.failed += 1;
    }
}

async fn handle_envelope(
    messaging: &Messaging,
    envelope: Envelope,
    cancellation: CancellationToken,
) -> Reply {
    let Some(registration) = messaging
        .registry()
        .registration_by_name(&envelope.message_type)
    else {
        return Reply::failure(&MessagingError::HandlerNotFound(envelope.message_type));
    };

    let context = match context_from_metadata(&envelope) {
        Ok(context) => context,
        Err(e) => return Reply::failure(&e),
    };

    let request = InboundRequest {
        conqueror_context: context.clone(),
        transport_type: TransportType::server(QUEUE_TRANSPORT),
        cancellation,
    };

    match registration
        .invoker()
        .invoke_binary(messaging, &envelope.payload, request)
        .await
    {
        Ok(payload) => {
            let reply = Reply::success(payload);
            match context.encode_upstream() {
                Some(encoded) => reply.with_metadata(CONTEXT_HEADER, encoded),
                None => reply,
            }
        }
        Err(e) => {
            tracing::warn!(
                message = %envelope.message_type,
                envelope_id = %envelope.id,
                trace_id = context.trace_id(),
                error = %e,
                "message failed"
            );
            Reply::failure(&e)
        }
    }
}

fn context_from_metadata(envelope: &Envelope) -> Result<ConquerorContext, MessagingError> {
    let context = match envelope.metadata_value(TRACE_ID_HEADER) {
        Some(trace_id) if !trace_id.is_empty() => ConquerorContext::with_trace_id(trace_id),
        _ => ConquerorContext::new(),
    };
    context.set_message_id(
        envelope
            .metadata_value(MESSAGE_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_id),
    );
    context.decode_into(metadata_values(&envelope.metadata, CONTEXT_HEADER))?;
    Ok(context)
}
