//! Send-status recording: three independent best-effort writes.

use tracing::warn;

use herald_core::{ChannelLog, Msg, MsgStatus, backend::Backend};

/// Persist the outcome of one send attempt: the status row, the send-once
/// marker, and the channel log. Each write stands alone — a failure is
/// recorded but never unwinds the others.
pub async fn record(backend: &dyn Backend, msg: &Msg, status: MsgStatus, clog: &mut ChannelLog) {
    if let Err(e) = backend.write_msg_status(&status).await {
        warn!(msg_id = %msg.id, error = %e, "status write failed");
        clog.error(format!("status write failed: {e}"));
    }

    if let Err(e) = backend.mark_outgoing_msg_complete(msg, &status).await {
        warn!(msg_id = %msg.id, error = %e, "sent-marker write failed");
        clog.error(format!("sent-marker write failed: {e}"));
    }

    clog.end();
    if let Err(e) = backend.write_channel_log(clog).await {
        warn!(msg_id = %msg.id, error = %e, "channel log write failed");
    }
}
