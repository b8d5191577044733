use crate::models::{RedisQResponse, ZkData};
use reqwest::Client;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Long-poll listener for the zKillboard RedisQ feed. Each `listen` call
/// blocks server-side until a killmail arrives or the poll times out with
/// an empty package.
pub struct RedisQListener {
    client: Client,
    url: String,
}

impl RedisQListener {
    pub fn new(base_url: &Url, queue_id: &str) -> Self {
        let mut url = base_url.clone();
        url.query_pairs_mut().append_pair("queueID", queue_id);
        let url = url.to_string();
        info!("Listening to RedisQ at: {}", url);
        RedisQListener {
            client: Client::new(),
            url,
        }
    }

    pub async fn listen(&self) -> Result<Option<ZkData>, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(60)) // prevent indefinite hangs
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Received non-success status: {}", response.status()).into());
        }

        let text = response.text().await?;
        if text.contains("<!DOCTYPE html>") {
            return Err("Received HTML response instead of JSON".to_string().into());
        }

        let wrapper: RedisQResponse = serde_json::from_str(&text)
            .map_err(|e| format!("JSON parsing error: {}. Response text: '{}'", e, text))?;

        Ok(wrapper.package)
    }
}
