use crate::*;

#[tokio::test]
async fn register_announces_to_existing_peers_only() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;

    let reply = a.register("alpha", &["inference"], &[]).await?;
    assert_eq!(reply["peer_count"], 1);
    assert!(reply["timestamp"].as_u64().is_some());

    let reply = b.register("beta", &["memory_sharing"], &["nlp"]).await?;
    assert_eq!(reply["peer_count"], 2);

    let joined = a.recv_kind("peer_joined").await?;
    assert_eq!(joined["peer"]["device_id"], "beta");
    assert_eq!(joined["peer"]["status"], "online");
    assert_eq!(joined["online_peers"], 2);
    assert!(b.is_quiet().await, "registering peer must not hear its own join");
    Ok(())
}

#[tokio::test]
async fn bad_frames_keep_the_session_open() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;

    a.send_raw("{ definitely not json").await?;
    assert_eq!(a.recv_kind("error").await?["code"], "malformed_message");

    a.send(json!({"type": "teleport", "device_id": "alpha"})).await?;
    assert_eq!(a.recv_kind("error").await?["code"], "unknown_message_kind");

    a.send(json!({"type": "register", "device_id": ""})).await?;
    assert_eq!(a.recv_kind("error").await?["code"], "malformed_message");

    a.send_binary(vec![0xff, 0xfe, 0x00]).await?;
    assert_eq!(a.recv_kind("error").await?["code"], "malformed_message");

    a.register("alpha", &[], &[]).await?;
    Ok(())
}

#[tokio::test]
async fn binary_json_frames_are_accepted() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;

    let frame = json!({"type": "register", "device_id": "alpha", "peer_info": {}});
    a.send_binary(frame.to_string().into_bytes()).await?;
    assert_eq!(a.recv_kind("registered").await?["peer_count"], 1);
    Ok(())
}

#[tokio::test]
async fn actions_before_register_are_rejected() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;

    for frame in [
        json!({"type": "discover"}),
        json!({"type": "heartbeat"}),
        json!({"type": "announce_capability", "capabilities": ["x"]}),
        json!({"type": "signal", "target_device_id": "beta", "signaling_data": {}}),
    ] {
        a.send(frame).await?;
        assert_eq!(a.recv_kind("error").await?["code"], "not_registered");
    }
    Ok(())
}

#[tokio::test]
async fn heartbeat_is_acknowledged_with_online_count() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    b.register("beta", &[], &[]).await?;

    a.send(json!({"type": "heartbeat", "available_resources": {"cpu": 0.5}})).await?;
    let ack = a.recv_kind("heartbeat_ack").await?;
    assert_eq!(ack["online_peers"], 2);
    assert!(ack["timestamp"].as_u64().is_some());
    Ok(())
}

#[tokio::test]
async fn discovery_filters_by_capability_and_specialization() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    let mut c = Client::connect(&server).await?;
    a.register("a", &["x"], &[]).await?;
    b.register("b", &["x", "y"], &["y"]).await?;
    c.register("c", &["y"], &["y"]).await?;

    a.send(json!({"type": "discover", "filters": {"required_capabilities": ["x"]}})).await?;
    let result = a.recv_kind("discovery_result").await?;
    assert_eq!(discovered_ids(&result), vec!["b"]);
    assert_eq!(result["count"], 1);

    c.send(json!({"type": "discover", "filters": {"specializations": ["y"]}})).await?;
    let result = c.recv_kind("discovery_result").await?;
    assert_eq!(discovered_ids(&result), vec!["b"]);

    b.send(json!({"type": "discover"})).await?;
    let result = b.recv_kind("discovery_result").await?;
    assert_eq!(discovered_ids(&result), vec!["a", "c"]);
    Ok(())
}

#[tokio::test]
async fn capability_announcement_reaches_other_peers() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    b.register("beta", &[], &[]).await?;

    b.send(json!({
        "type": "announce_capability",
        "capabilities": ["gpu"],
        "cluster_specializations": ["vision"],
        "resources": {"vram_gb": 24},
    }))
    .await?;

    let updated = a.recv_kind("peer_updated").await?;
    assert_eq!(updated["peer"]["device_id"], "beta");
    assert_eq!(updated["peer"]["capabilities"], json!(["gpu"]));
    assert_eq!(updated["peer"]["specializations"], json!(["vision"]));

    a.send(json!({"type": "discover", "filters": {"required_capabilities": ["gpu"]}})).await?;
    let result = a.recv_kind("discovery_result").await?;
    assert_eq!(discovered_ids(&result), vec!["beta"]);
    Ok(())
}

#[tokio::test]
async fn oversized_frame_is_rejected_without_ending_the_session() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;

    let padding = "x".repeat(2 << 20);
    a.send(json!({"type": "heartbeat", "available_resources": {"padding": padding}})).await?;
    assert_eq!(a.recv_kind("error").await?["code"], "malformed_message");

    a.send(json!({"type": "heartbeat"})).await?;
    assert_eq!(a.recv_kind("heartbeat_ack").await?["online_peers"], 1);
    server.wait_for_online(1).await?;
    Ok(())
}

/// Peer entry as a connecting client reads it back from discovery.
#[derive(Debug, serde::Deserialize)]
struct ClientPeer {
    device_id: String,
    ip_address: String,
    port: u16,
    public_key: String,
    capabilities: Vec<String>,
    reputation_score: f64,
    last_seen: f64,
    cluster_specializations: Vec<String>,
}

#[tokio::test]
async fn discovered_peers_carry_declared_address_fields() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;

    b.send(json!({
        "type": "register",
        "device_id": "beta",
        "peer_info": {
            "device_id": "beta",
            "ip_address": "192.0.2.7",
            "port": 8765,
            "public_key": "pk-beta",
            "capabilities": ["inference"],
            "reputation_score": 0.75,
            "last_seen": 0.0,
            "cluster_specializations": ["vision"],
        },
    }))
    .await?;
    b.recv_kind("registered").await?;

    a.send(json!({"type": "discover"})).await?;
    let result = a.recv_kind("discovery_result").await?;
    let peers: Vec<ClientPeer> = serde_json::from_value(result["peers"].clone())?;
    assert_eq!(peers.len(), 1);

    let beta = &peers[0];
    assert_eq!(beta.device_id, "beta");
    assert_eq!(beta.ip_address, "192.0.2.7");
    assert_eq!(beta.port, 8765);
    assert_eq!(beta.public_key, "pk-beta");
    assert_eq!(beta.capabilities, vec!["inference"]);
    assert_eq!(beta.reputation_score, 0.75);
    assert_eq!(beta.cluster_specializations, vec!["vision"]);
    assert!(beta.last_seen > 0.0, "server stamps last_seen");
    Ok(())
}
