use anyhow::Result;
use futures::Stream;
use redis::{AsyncCommands, Client};

/// Redis pub/sub channel per collection, used to wake live queries after writes.
#[derive(Clone)]
pub struct ChangeFeed {
    client: Client,
}

impl ChangeFeed {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn publish(&self, collection: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel(collection), "changed").await?;
        Ok(())
    }

    /// Stream of change pings for `collection`. Subscribed before it is returned.
    pub async fn listen(&self, collection: &str) -> Result<impl Stream<Item = redis::Msg>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel(collection)).await?;
        Ok(pubsub.into_on_message())
    }
}

fn channel(collection: &str) -> String {
    format!("changes:{}", collection)
}
