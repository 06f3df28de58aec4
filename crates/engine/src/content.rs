use hive_auth::{Caller, Role};
use hive_core::validation::{validate_body, validate_tag_count, MAX_TAGS_PER_ITEM};
use hive_core::{ContentId, ContentItem, ContentKey, ContentKind, CounterDelta, ScopeId, TagId};

use crate::notify::{dispatch, Notification};
use crate::{Engine, EngineError, EngineResult, Target};

impl Engine {
    pub async fn create_post(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        body: String,
        tags: Vec<TagId>,
    ) -> EngineResult<ContentItem> {
        self.authorize(caller, hive_id).await?;
        validate_body(&body)?;
        validate_tag_count(tags.len(), MAX_TAGS_PER_ITEM)?;

        let post = ContentItem::new_post(hive_id, caller.user_id.clone(), body, self.clock.now())
            .with_tags(tags);
        self.call(self.storage.put_content(&post)).await?;
        tracing::info!(hive = %hive_id, post = %post.content_id, "post created");
        Ok(post)
    }

    /// Adds a comment under `post_id`. Bumping the post's comment count and
    /// activity time is best effort and never fails the comment.
    pub async fn create_comment(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        post_id: ContentId,
        body: String,
    ) -> EngineResult<ContentItem> {
        self.authorize(caller, hive_id).await?;
        validate_body(&body)?;
        let post = self
            .load_target(Target::new(hive_id, ContentKey::new(hive_id, post_id)))
            .await?;
        if post.kind != ContentKind::Post {
            return Err(EngineError::BadRequest(
                "comments can only be added to posts".to_owned(),
            ));
        }

        let comment = ContentItem::new_comment(
            hive_id,
            post_id,
            caller.user_id.clone(),
            body,
            self.clock.now(),
        );
        self.call(self.storage.put_content(&comment)).await?;
        tracing::info!(
            hive = %hive_id,
            post = %post_id,
            comment = %comment.content_id,
            "comment created"
        );

        self.reconcile_or_log(post.key(), CounterDelta::comments(1), "comment created")
            .await;
        if let Err(error) = self
            .call(self.storage.touch_activity(post.key(), comment.created_at))
            .await
        {
            tracing::warn!(post = %post_id, error = %error, "post activity update failed");
        }
        dispatch(
            &self.notifier,
            Notification::CommentCreated {
                hive_id,
                post_id,
                comment_id: comment.content_id,
                author_id: caller.user_id.clone(),
                post_author_id: post.author_id,
            },
        );
        Ok(comment)
    }

    pub async fn get_content(&self, caller: &Caller, target: Target) -> EngineResult<ContentItem> {
        self.authorize(caller, target.hive_id).await?;
        self.load_target(target).await
    }

    /// Moderator outcome: the item stops being obfuscated and can no longer
    /// be reported.
    pub async fn mark_reviewed(&self, caller: &Caller, target: Target) -> EngineResult<ContentItem> {
        self.authorize_role(caller, target.hive_id, Role::Moderator)
            .await?;
        self.load_target(target).await?;
        let item = self.call(self.storage.mark_reviewed(target.content)).await?;
        tracing::info!(content = %target.content.content_id, "content reviewed");
        Ok(item)
    }

    pub async fn set_pinned(
        &self,
        caller: &Caller,
        target: Target,
        pinned: bool,
    ) -> EngineResult<ContentItem> {
        self.authorize_role(caller, target.hive_id, Role::Moderator)
            .await?;
        let current = self.load_target(target).await?;
        if current.pinned == pinned {
            return Err(EngineError::NoOp);
        }
        Ok(self
            .call(self.storage.set_pinned(target.content, pinned))
            .await?)
    }

    /// Reads the addressed item and checks it belongs to the target's hive.
    pub(crate) async fn load_target(&self, target: Target) -> EngineResult<ContentItem> {
        let item = self.call(self.storage.get_content(target.content)).await?;
        if item.hive_id != target.hive_id {
            return Err(EngineError::NotFound);
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use hive_core::validation::MAX_BODY_LEN;
    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{fixture, member};
    use crate::{Notifier, NotifyError};

    struct Recorder(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            let _ = self.0.send(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn comment_bumps_post_and_notifies() {
        let fixture = fixture().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = fixture
            .engine
            .clone()
            .with_notifier(Arc::new(Recorder(tx)));
        let post = engine
            .create_post(&fixture.owner, fixture.hive, "hello".to_owned(), vec![])
            .await
            .expect("post");
        let bob = member(&fixture, "bob").await;

        let comment = engine
            .create_comment(&bob, fixture.hive, post.content_id, "hi".to_owned())
            .await
            .expect("comment");
        assert_eq!(comment.scope_id, ScopeId::from(post.content_id));

        let post = engine
            .get_content(&bob, Target::new(fixture.hive, post.key()))
            .await
            .expect("get post");
        assert_eq!(post.comment_count, 1);
        assert_eq!(post.last_activity_at, comment.created_at);

        match rx.recv().await.expect("notification") {
            Notification::CommentCreated { comment_id, .. } => {
                assert_eq!(comment_id, comment.content_id);
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[tokio::test]
    async fn comments_cannot_nest() {
        let fixture = fixture().await;
        let post = fixture
            .engine
            .create_post(&fixture.owner, fixture.hive, "p".to_owned(), vec![])
            .await
            .expect("post");
        let comment = fixture
            .engine
            .create_comment(&fixture.owner, fixture.hive, post.content_id, "c".to_owned())
            .await
            .expect("comment");

        let nested = fixture
            .engine
            .create_comment(&fixture.owner, fixture.hive, comment.content_id, "n".to_owned())
            .await;
        // The comment is not addressable as a post of the hive.
        assert_eq!(nested, Err(EngineError::NotFound));
    }

    #[tokio::test]
    async fn input_and_membership_are_checked() {
        let fixture = fixture().await;
        let long = "x".repeat(MAX_BODY_LEN + 1);
        assert!(matches!(
            fixture
                .engine
                .create_post(&fixture.owner, fixture.hive, long, vec![])
                .await,
            Err(EngineError::BadRequest(_))
        ));
        assert!(matches!(
            fixture
                .engine
                .create_post(&Caller::user("stranger"), fixture.hive, "b".to_owned(), vec![])
                .await,
            Err(EngineError::Unauthorized(_))
        ));
        assert_eq!(
            fixture
                .engine
                .create_post(&fixture.owner, ScopeId::new(), "b".to_owned(), vec![])
                .await,
            Err(EngineError::NotFound)
        );
    }

    #[tokio::test]
    async fn moderation_requires_a_moderator() {
        let fixture = fixture().await;
        let post = fixture
            .engine
            .create_post(&fixture.owner, fixture.hive, "p".to_owned(), vec![])
            .await
            .expect("post");
        let target = Target::new(fixture.hive, post.key());
        let bob = member(&fixture, "bob").await;

        assert!(matches!(
            fixture.engine.set_pinned(&bob, target, true).await,
            Err(EngineError::Unauthorized(_))
        ));
        let pinned = fixture
            .engine
            .set_pinned(&fixture.owner, target, true)
            .await
            .expect("pin");
        assert!(pinned.pinned);
        assert_eq!(
            fixture.engine.set_pinned(&fixture.owner, target, true).await,
            Err(EngineError::NoOp)
        );

        let reviewed = fixture
            .engine
            .mark_reviewed(&fixture.owner, target)
            .await
            .expect("review");
        assert!(reviewed.reviewed);
    }
}
