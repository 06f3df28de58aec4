use std::sync::Arc;

use async_trait::async_trait;
use hive_core::{ContentId, ContentKey, ScopeId, UserId};
use serde::Serialize;

/// Event handed to the notification collaborator after an engagement-producing
/// action has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    CommentCreated {
        hive_id: ScopeId,
        post_id: ContentId,
        comment_id: ContentId,
        author_id: UserId,
        post_author_id: UserId,
    },
    UpVoted {
        hive_id: ScopeId,
        content: ContentKey,
        voter_id: UserId,
        content_author_id: UserId,
    },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(notification).map_err(|error| NotifyError(error.to_string()))?;
        tracing::info!(%payload, "notification");
        Ok(())
    }
}

/// Delivers in the background. Failures are logged and never reach the caller.
pub(crate) fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(error) = notifier.notify(&notification).await {
            tracing::warn!(error = %error, ?notification, "notification failed");
        }
    });
}
