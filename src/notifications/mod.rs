use async_trait::async_trait;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::entities::order::{Model as OrderModel, OrderStatus};

/// Templated transactional email addressed to an order owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum OrderEmail {
    OrderConfirmation {
        to: String,
        order_id: Uuid,
        total_price: Decimal,
        item_count: u32,
    },
    StatusUpdate {
        to: String,
        order_id: Uuid,
        status: OrderStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waybill: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl OrderEmail {
    pub fn confirmation(order: &OrderModel) -> Self {
        OrderEmail::OrderConfirmation {
            to: order.email.clone(),
            order_id: order.id,
            total_price: order.total_price,
            item_count: order.total_quantity(),
        }
    }

    pub fn status_update(order: &OrderModel) -> Self {
        let waybill = order
            .shipment_details
            .as_ref()
            .and_then(|details| details.waybills.first().cloned());
        OrderEmail::StatusUpdate {
            to: order.email.clone(),
            order_id: order.id,
            status: order.status,
            waybill,
            reason: order.cancel_reason.clone(),
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            OrderEmail::OrderConfirmation { to, .. } | OrderEmail::StatusUpdate { to, .. } => to,
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEmail::OrderConfirmation { order_id, .. }
            | OrderEmail::StatusUpdate { order_id, .. } => *order_id,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            OrderEmail::OrderConfirmation { order_id, .. } => {
                format!("Order {} confirmed", order_id)
            }
            OrderEmail::StatusUpdate {
                order_id, status, ..
            } => format!("Order {} is now {}", order_id, status),
        }
    }
}

/// Email dispatch errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Email transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Email API rejected message with status {0}")]
    Rejected(u16),
}

/// Email dispatch collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OrderEmail) -> Result<(), NotificationError>;
}

/// Sends an email after a commit; failures are logged and swallowed
#[instrument(skip(mailer, email), fields(order_id = %email.order_id()))]
pub async fn send_best_effort(mailer: &dyn Mailer, email: OrderEmail) {
    match mailer.send(email).await {
        Ok(()) => {
            counter!("storefront.emails.sent", 1);
        }
        Err(e) => {
            counter!("storefront.emails.failed", 1);
            warn!(error = %e, "Order email failed; continuing");
        }
    }
}

/// Mailer used when no email API is configured
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OrderEmail) -> Result<(), NotificationError> {
        info!(
            to = email.recipient(),
            subject = %email.subject(),
            "Email dispatch not configured; logging message"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    payload: &'a OrderEmail,
}

/// JSON email API client
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OrderEmail) -> Result<(), NotificationError> {
        let body = EmailRequest {
            from: &self.from,
            to: email.recipient(),
            subject: email.subject(),
            payload: &email,
        };
        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Builds the mailer selected by configuration
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>, NotificationError> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from_address.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
