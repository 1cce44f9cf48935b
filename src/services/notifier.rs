/// Push delivery seam
use crate::clients::{PushGatewayClient, SendOutcome};
use crate::domain::{DispatchReport, PushMessage};
use crate::errors::ApiResult;
use crate::repo::EventStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Delivers a message to every endpoint registered for a user.
///
/// Delivery is best-effort. Endpoints the transport reports as permanently
/// unusable come back in `dead_endpoints` so the caller can forget them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, message: &PushMessage) -> ApiResult<DispatchReport>;
}

/// Used when no push gateway is configured
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, message: &PushMessage) -> ApiResult<DispatchReport> {
        info!(
            "push skipped (no gateway) user={} title={:?} body={:?}",
            user_id, message.title, message.body
        );
        Ok(DispatchReport::default())
    }
}

pub struct GatewayNotifier {
    client: PushGatewayClient,
    store: Arc<dyn EventStore>,
}

impl GatewayNotifier {
    pub fn new(client: PushGatewayClient, store: Arc<dyn EventStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl Notifier for GatewayNotifier {
    async fn notify(&self, user_id: &str, message: &PushMessage) -> ApiResult<DispatchReport> {
        let tokens = self.store.push_tokens(user_id).await?;
        let mut report = DispatchReport::default();

        for token in tokens {
            match self.client.send(&token, message).await {
                Ok(SendOutcome::Delivered) => report.delivered += 1,
                Ok(SendOutcome::Unusable) => report.dead_endpoints.push(token),
                // Transient: keep the token for the next attempt
                Err(e) => error!("push to user {} failed: {}", user_id, e),
            }
        }

        Ok(report)
    }
}

/// Notify a user and drop any endpoints reported dead.
///
/// Once `notify` returns Ok the message is out, so a failed token removal is
/// logged and the report still returned. The token is retried on the next
/// dispatch that reports it dead.
pub async fn deliver(
    store: &dyn EventStore,
    notifier: &dyn Notifier,
    user_id: &str,
    message: &PushMessage,
) -> ApiResult<DispatchReport> {
    let report = notifier.notify(user_id, message).await?;
    for token in &report.dead_endpoints {
        warn!("removing unusable push token for user {}", user_id);
        if let Err(e) = store.remove_push_token(token).await {
            error!("could not remove push token for user {}: {}", user_id, e);
        }
    }
    Ok(report)
}
