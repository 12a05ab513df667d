//! In-memory channel cache in front of the backend.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    backend::Backend,
    channel::Channel,
    error::Result,
    ids::{ChannelAddress, ChannelType, ChannelUuid},
};

const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CachedChannel {
    channel: Arc<Channel>,
    fetched_at: Instant,
}

/// Read-mostly cache of channel configs, keyed by `(type, uuid)` and by
/// `(type, address)`, falling back to the backend on miss or expiry.
///
/// Readers clone out `Arc<Channel>` snapshots; a single writer refreshes
/// entries on invalidation.
pub struct ChannelRegistry {
    backend: Arc<dyn Backend>,
    ttl: Duration,
    by_uuid: RwLock<HashMap<(ChannelType, ChannelUuid), CachedChannel>>,
    by_address: RwLock<HashMap<(ChannelType, ChannelAddress), CachedChannel>>,
}

impl ChannelRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_ttl(backend, DEFAULT_TTL)
    }

    pub fn with_ttl(backend: Arc<dyn Backend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            by_uuid: RwLock::new(HashMap::new()),
            by_address: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a channel by type and UUID, from cache when fresh.
    pub async fn get_channel(
        &self,
        channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Arc<Channel>> {
        let key = (channel_type.clone(), *uuid);
        if let Some(hit) = self.fresh(&self.by_uuid, &key) {
            return Ok(hit);
        }

        let channel = self.backend.get_channel(channel_type, uuid).await?;
        debug!(channel = %uuid, "channel cache refresh");
        self.by_uuid.write().expect("registry lock poisoned").insert(
            key,
            CachedChannel {
                channel: Arc::clone(&channel),
                fetched_at: Instant::now(),
            },
        );
        Ok(channel)
    }

    /// Resolve a channel by type and provider-side address.
    pub async fn get_channel_by_address(
        &self,
        channel_type: &ChannelType,
        address: &ChannelAddress,
    ) -> Result<Arc<Channel>> {
        let key = (channel_type.clone(), address.clone());
        if let Some(hit) = self.fresh(&self.by_address, &key) {
            return Ok(hit);
        }

        let channel = self
            .backend
            .get_channel_by_address(channel_type, address)
            .await?;
        self.by_address
            .write()
            .expect("registry lock poisoned")
            .insert(
                key,
                CachedChannel {
                    channel: Arc::clone(&channel),
                    fetched_at: Instant::now(),
                },
            );
        Ok(channel)
    }

    /// Drop all cached entries; the next lookup refetches.
    pub fn invalidate(&self) {
        self.by_uuid.write().expect("registry lock poisoned").clear();
        self.by_address
            .write()
            .expect("registry lock poisoned")
            .clear();
    }

    fn fresh<K: std::hash::Hash + Eq>(
        &self,
        cache: &RwLock<HashMap<K, CachedChannel>>,
        key: &K,
    ) -> Option<Arc<Channel>> {
        let cache = cache.read().expect("registry lock poisoned");
        cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.channel))
    }
}

