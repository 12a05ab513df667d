//! Redis-backed atomic markers: the send-once guard and the receive dedup
//! set.
//!
//! Both are `SETNX` + TTL under the hood. The in-process mock backend keeps
//! equivalent state in maps for tests; production couriers scale
//! horizontally and must share these through Redis.

use std::time::Duration;

use redis::aio::ConnectionManager;

use herald_core::{ChannelUuid, MsgId};

/// Send-once markers: one key per outgoing msg ID.
pub struct SentMarkers {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl SentMarkers {
    /// Markers outlive any reasonable redelivery horizon; 24h mirrors the
    /// upstream platform's retry window.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(conn: ConnectionManager, prefix: &str, ttl: Duration) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            ttl,
        }
    }

    fn key(&self, id: MsgId) -> String {
        format!("{}:sent:{id}", self.prefix)
    }

    pub async fn was_sent(&self, id: MsgId) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    /// Atomically set the marker. Returns whether this call was the first to
    /// set it, so callers can detect a lost race.
    pub async fn mark_sent(&self, id: MsgId) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(self.key(id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    pub async fn clear_sent(&self, id: MsgId) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Receive dedup: `(channel, external_id)` pairs seen within the window.
pub struct SeenExternalIds {
    conn: ConnectionManager,
    prefix: String,
    window: Duration,
}

impl SeenExternalIds {
    pub fn new(conn: ConnectionManager, prefix: &str, window: Duration) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            window,
        }
    }

    fn key(&self, channel: ChannelUuid, external_id: &str) -> String {
        format!("{}:seen:{channel}:{external_id}", self.prefix)
    }

    pub async fn seen(&self, channel: ChannelUuid, external_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key(channel, external_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    pub async fn record(&self, channel: ChannelUuid, external_id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: Option<String> = redis::cmd("SET")
            .arg(self.key(channel, external_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.window.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
