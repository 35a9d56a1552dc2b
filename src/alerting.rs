//! Alerting (spec.md §6): `AlertError` is called at most once per per-shard
//! tick failure. `SMTP` delivery and templating are out of scope; this
//! module only specifies the `Alerter` boundary and two simple
//! implementations plus a fan-out composite.

use async_trait::async_trait;
use tracing::error;

use crate::error::AlertError;

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert_error(&self, shard: &str, err: &eyre::Report) -> Result<(), AlertError>;
}

/// Logs the error at error level with the shard as a structured field.
/// Suitable as the default/fallback alerter.
pub struct LoggingAlerter;

#[async_trait]
impl Alerter for LoggingAlerter {
    async fn alert_error(&self, shard: &str, err: &eyre::Report) -> Result<(), AlertError> {
        error!(shard = %shard, error = %err, "tick failed");
        Ok(())
    }
}

/// Posts a JSON payload to a webhook URL.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn alert_error(&self, shard: &str, err: &eyre::Report) -> Result<(), AlertError> {
        let body = serde_json::json!({
            "shard": shard,
            "error": err.to_string(),
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(eyre::eyre!(e)))?
            .error_for_status()
            .map_err(|e| AlertError::Delivery(eyre::eyre!(e)))?;
        Ok(())
    }
}

/// Fans the same alert out to every alerter in the chain. The first
/// alerter's failure is what the caller sees; the rest still run so a
/// broken webhook can't suppress the log alert.
pub struct CompositeAlerter {
    alerters: Vec<Box<dyn Alerter>>,
}

impl CompositeAlerter {
    pub fn new(alerters: Vec<Box<dyn Alerter>>) -> Self {
        Self { alerters }
    }
}

#[async_trait]
impl Alerter for CompositeAlerter {
    async fn alert_error(&self, shard: &str, err: &eyre::Report) -> Result<(), AlertError> {
        let mut first: Option<AlertError> = None;
        for alerter in &self.alerters {
            if let Err(e) = alerter.alert_error(shard, err).await {
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_alerter_never_fails() {
        let alerter = LoggingAlerter;
        let err = eyre::eyre!("boom");
        assert!(alerter.alert_error("shard1", &err).await.is_ok());
    }

    #[tokio::test]
    async fn composite_alerter_runs_every_member_even_if_one_fails() {
        struct AlwaysFails;
        #[async_trait]
        impl Alerter for AlwaysFails {
            async fn alert_error(&self, _: &str, _: &eyre::Report) -> Result<(), AlertError> {
                Err(AlertError::Delivery(eyre::eyre!("unreachable")))
            }
        }

        let composite = CompositeAlerter::new(vec![Box::new(AlwaysFails), Box::new(LoggingAlerter)]);
        let err = eyre::eyre!("boom");
        assert!(composite.alert_error("shard1", &err).await.is_err());
    }
}
