use crate::*;

#[tokio::test]
async fn signal_payload_passes_through_unchanged() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    b.register("beta", &[], &[]).await?;
    a.recv_kind("peer_joined").await?;

    let payload = json!({
        "type": "offer",
        "offer": "{\"sdp\":\"v=0\\r\\no=- 0 0 IN IP4 127.0.0.1\"}",
        "nested": {"candidates": [1, 2.5, null, "x"]},
    });
    a.send(json!({"type": "signal", "target_device_id": "beta", "signaling_data": payload})).await?;

    let signal = b.recv_kind("webrtc_signal").await?;
    assert_eq!(signal["from_device_id"], "alpha");
    assert_eq!(signal["signaling_data"], payload);
    assert!(a.is_quiet().await, "sender must not receive an error");
    Ok(())
}

#[tokio::test]
async fn signal_to_unknown_peer_is_unreachable() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;

    a.send(json!({"type": "signal", "target_device_id": "ghost", "signaling_data": {}})).await?;
    let error = a.recv_kind("error").await?;
    assert_eq!(error["code"], "target_unreachable");
    assert!(error["message"].as_str().unwrap_or_default().contains("ghost"));
    Ok(())
}

#[tokio::test]
async fn signal_to_disconnected_peer_is_unreachable() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    b.register("beta", &[], &[]).await?;
    b.close().await?;
    a.recv_kind("peer_left").await?;

    a.send(json!({"type": "signal", "target_device_id": "beta", "signaling_data": {}})).await?;
    assert_eq!(a.recv_kind("error").await?["code"], "target_unreachable");
    Ok(())
}
