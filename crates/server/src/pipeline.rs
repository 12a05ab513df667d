//! Inbound persistence: writes what a handler produced, in order, with
//! duplicate suppression.

use tracing::{debug, warn};

use herald_core::{
    ChannelLog, Error, Msg, Result,
    backend::Backend,
    handler::HandlerOutput,
};

/// What the pipeline did with one request's output.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Messages actually persisted (with backend-assigned IDs).
    pub written_msgs: Vec<Msg>,
    /// Messages suppressed as duplicates within the dedup window.
    pub duplicates: usize,
    /// Statuses dropped because their target was unknown or an incoming
    /// message outside pending/handled.
    pub dropped_statuses: usize,
}

/// Persist handler output in order: msgs (each through the dedup layer),
/// then statuses, then events.
///
/// Dedup suppressions and unresolvable statuses are quietly absorbed — the
/// provider still gets its normal ack so it stops re-sending. Transient
/// backend failures propagate so the caller surfaces a 5xx and the provider
/// retries.
pub async fn write_handler_output(
    backend: &dyn Backend,
    output: HandlerOutput,
    clog: &mut ChannelLog,
) -> Result<WriteReport> {
    let mut report = WriteReport::default();

    for msg in output.msgs {
        let mut msg = backend.check_external_id_seen(msg).await;
        if msg.already_written {
            debug!(
                channel = %msg.channel_uuid,
                external_id = msg.external_id.as_deref().unwrap_or(""),
                "duplicate receive suppressed"
            );
            report.duplicates += 1;
            continue;
        }

        backend.write_msg(&mut msg, clog).await?;
        backend.write_external_id_seen(&msg).await;
        report.written_msgs.push(msg);
    }

    for status in output.statuses {
        match backend.write_msg_status(&status).await {
            Ok(()) => {},
            // The referenced message isn't ours (or not yet ours); the
            // provider must not be made to retry.
            Err(Error::MsgNotFound) => {
                debug!(
                    channel = %status.channel_uuid,
                    external_id = status.external_id.as_deref().unwrap_or(""),
                    "status for unknown message dropped"
                );
                report.dropped_statuses += 1;
            },
            Err(Error::WrongIncomingMsgStatus) => {
                debug!(msg_id = %status.msg_id, "status for incoming message dropped");
                report.dropped_statuses += 1;
            },
            Err(e) => {
                warn!(error = %e, "status write failed");
                return Err(e);
            },
        }
    }

    for event in output.events {
        backend.write_channel_event(&event, clog).await?;
    }

    Ok(report)
}
