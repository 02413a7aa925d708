use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis connection manager; it reconnects on its own after connection loss.
///
/// Used by the test-send rate limiter.
pub async fn create_redis_manager(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = client.get_connection_manager().await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
