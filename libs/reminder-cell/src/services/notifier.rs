// libs/reminder-cell/src/services/notifier.rs
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::ReminderError;

/// Outbound notification seam. Delivery may fail independently per call;
/// callers must treat a failure as non-fatal to the surrounding operation.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: Value,
    ) -> Result<(), ReminderError>;
}

/// Sends templated email through the clinic's edge function.
pub struct EmailNotificationService {
    client: reqwest::Client,
    function_url: String,
    anon_key: String,
}

impl EmailNotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            function_url: config.email_function_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }
}

#[async_trait]
impl NotificationSender for EmailNotificationService {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: Value,
    ) -> Result<(), ReminderError> {
        if self.function_url.is_empty() {
            return Err(ReminderError::DeliveryFailure(
                "Email function URL is not configured".to_string(),
            ));
        }

        debug!("Dispatching '{}' email to {}", template, recipient);

        let body = json!({
            "to": recipient,
            "template": template,
            "data": data,
        });

        let response = self
            .client
            .post(&self.function_url)
            .bearer_auth(&self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReminderError::DeliveryFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Email function error ({}): {}", status, error_text);
            return Err(ReminderError::DeliveryFailure(format!(
                "Email function returned {}",
                status
            )));
        }

        Ok(())
    }
}
