use std::{sync::Arc, time::Duration};

use herald_core::{Backend, ChannelAddress, ChannelRegistry, ChannelType, ChannelUuid, Error};
use herald_testkit::{MockBackend, mock_channel};
use serde_json::json;

const CHANNEL_UUID: &str = "8eb23e93-5ecb-45ba-b726-3b064e0c56ab";

fn backend() -> Arc<MockBackend> {
    let backend = MockBackend::new();
    backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));
    Arc::new(backend)
}

#[tokio::test]
async fn caches_until_ttl() {
    let backend = backend();
    let registry =
        ChannelRegistry::with_ttl(Arc::clone(&backend) as Arc<dyn Backend>, Duration::from_secs(60));

    let ct = ChannelType::new("BS");
    let uuid: ChannelUuid = CHANNEL_UUID.parse().unwrap();
    let first = registry.get_channel(&ct, &uuid).await.unwrap();
    let second = registry.get_channel(&ct, &uuid).await.unwrap();
    assert_eq!(first.uuid, second.uuid);
    assert_eq!(backend.channel_fetches(), 1);
}

#[tokio::test]
async fn expired_entries_refetch() {
    let backend = backend();
    let registry = ChannelRegistry::with_ttl(Arc::clone(&backend) as Arc<dyn Backend>, Duration::ZERO);

    let ct = ChannelType::new("BS");
    let uuid: ChannelUuid = CHANNEL_UUID.parse().unwrap();
    registry.get_channel(&ct, &uuid).await.unwrap();
    registry.get_channel(&ct, &uuid).await.unwrap();
    assert_eq!(backend.channel_fetches(), 2);
}

#[tokio::test]
async fn missing_channel_propagates() {
    let registry = ChannelRegistry::new(backend() as Arc<dyn Backend>);

    let err = registry
        .get_channel(&ChannelType::new("BS"), &ChannelUuid::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelNotFound));
}

#[tokio::test]
async fn lookup_by_address() {
    let backend = backend();
    let registry = ChannelRegistry::new(Arc::clone(&backend) as Arc<dyn Backend>);

    let channel = registry
        .get_channel_by_address(&ChannelType::new("BS"), &ChannelAddress::new("2020"))
        .await
        .unwrap();
    assert_eq!(channel.address.as_str(), "2020");

    // Cached on the address key too.
    registry
        .get_channel_by_address(&ChannelType::new("BS"), &ChannelAddress::new("2020"))
        .await
        .unwrap();
    assert_eq!(backend.channel_fetches(), 1);
}

#[tokio::test]
async fn invalidate_clears_cache() {
    let backend = backend();
    let registry = ChannelRegistry::new(Arc::clone(&backend) as Arc<dyn Backend>);

    let ct = ChannelType::new("BS");
    let uuid: ChannelUuid = CHANNEL_UUID.parse().unwrap();
    registry.get_channel(&ct, &uuid).await.unwrap();
    registry.invalidate();
    registry.get_channel(&ct, &uuid).await.unwrap();
    assert_eq!(backend.channel_fetches(), 2);
}
