use crate::*;

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let server = TestServer::start().await?;
    let health = server.get("/health").await?;
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_secs"].is_number());
    Ok(())
}

#[tokio::test]
async fn status_lists_online_peers() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    a.register("alpha", &["inference"], &["nlp"]).await?;

    let status = server.get("/status").await?;
    assert_eq!(status["total_peers"], 1);
    assert_eq!(status["online_peers"], 1);
    assert_eq!(status["connections"], 1);
    assert!(status["uptime_secs"].is_number());

    let peer = &status["peers"][0];
    assert_eq!(peer["device_id"], "alpha");
    assert_eq!(peer["capabilities"], json!(["inference"]));
    assert_eq!(peer["specializations"], json!(["nlp"]));
    assert!(peer["last_seen"].is_number());
    Ok(())
}

#[tokio::test]
async fn disconnect_demotes_and_lowers_online_count() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    let mut b = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    b.register("beta", &[], &[]).await?;
    server.wait_for_online(2).await?;

    b.close().await?;

    let left = a.recv_kind("peer_left").await?;
    assert_eq!(left["device_id"], "beta");
    assert_eq!(left["online_peers"], 1);
    assert_eq!(left["reason"], "disconnect");

    let status = server.wait_for_online(1).await?;
    assert_eq!(status["total_peers"], 2);

    let peers = server.get("/peers").await?;
    let beta = peers["peers"]
        .as_array()
        .and_then(|all| all.iter().find(|p| p["device_id"] == "beta"))
        .context("beta missing from /peers")?;
    assert_eq!(beta["status"], "offline");
    Ok(())
}

#[tokio::test]
async fn reregistration_reactivates_the_record() -> Result<()> {
    let server = TestServer::start().await?;
    let mut a = Client::connect(&server).await?;
    a.register("alpha", &[], &[]).await?;
    a.close().await?;
    server.wait_for_online(0).await?;

    let mut again = Client::connect(&server).await?;
    let reply = again.register("alpha", &["x"], &[]).await?;
    assert_eq!(reply["peer_count"], 1);

    let status = server.wait_for_online(1).await?;
    assert_eq!(status["total_peers"], 1);
    Ok(())
}
