//! Notification boundary.
//!
//! The core informs users about penalty charges and the like through this
//! seam; actual delivery (SMTP, push, ...) lives outside the crate. Delivery
//! failures never abort the money movement that triggered them.

use async_trait::async_trait;
use uuid::Uuid;

/// External collaborator delivering user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, subject: &str, body: &str);
}

/// Stub notifier that logs instead of delivering. Used in tests and as a
/// default wiring until a real transport is plugged in.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: Uuid, subject: &str, body: &str) {
        tracing::info!(%user_id, subject, body, "notification");
    }
}
