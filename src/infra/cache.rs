use anyhow::Result;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    /// Lazy handle with no reachability check; callers that need the server
    /// up front use `connect`.
    pub fn open(redis_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(redis_url)?,
        })
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Atomic test-and-set: true only if the key was absent and is now set.
    pub async fn add(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Batch membership probe: returns the subset of `keys` that are present.
    pub async fn get_multi(&self, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        let values: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|_| key.clone()))
            .collect())
    }

    /// Mark a batch of keys, each with its own value and a shared TTL.
    pub async fn set_multi(&self, entries: &HashMap<String, String>, ttl_seconds: u64) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_seconds)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
