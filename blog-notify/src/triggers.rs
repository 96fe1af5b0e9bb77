//! Enqueue side of notifications, called after the web app writes a record.
//!
//! Nothing here fails the caller's request: lookup and enqueue problems are
//! logged and the notification is dropped.

use std::sync::Arc;

use blog_queue::{JobId, QueueAdapter, QueueBackend};
use tracing::{debug, warn};

use crate::job::NotificationJob;
use crate::mentions::{extract_mentions, new_mentions, resolve_mentions};
use crate::models::{Comment, Like, LikeTarget, Post, User, UserId};
use crate::params::NotificationParams;
use crate::store::RecordStore;

pub struct NotificationTriggers<B: QueueBackend + 'static> {
    queue: QueueAdapter<B>,
    store: Arc<dyn RecordStore>,
}

impl<B: QueueBackend + 'static> NotificationTriggers<B> {
    pub fn new(queue: QueueAdapter<B>, store: Arc<dyn RecordStore>) -> Self {
        Self { queue, store }
    }

    /// Notify the post author and everyone mentioned in a new comment
    pub async fn comment_created(&self, comment: &Comment) -> Vec<JobId> {
        let mut enqueued = Vec::new();
        let post = match self.store.find_post_by_id(comment.post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                warn!("Comment {} refers to missing post {}", comment.id, comment.post_id);
                return enqueued;
            }
            Err(err) => {
                warn!("Skipping notifications for comment {}: {}", comment.id, err);
                return enqueued;
            }
        };

        if post.user_id != comment.user_id {
            let params = NotificationParams::NewComment {
                recipient_user_id: post.user_id,
                source_user_id: comment.user_id,
                post_id: post.id,
                comment_id: comment.id,
            };
            enqueued.extend(self.enqueue(params).await);
        }

        let names = extract_mentions(&comment.content);
        for user in self.mentioned_users(&names).await {
            if user.id == comment.user_id || user.id == post.user_id {
                continue;
            }
            enqueued.extend(self.enqueue(mention(user.id, comment)).await);
        }
        enqueued
    }

    /// Notify users mentioned by an edit who were not mentioned before
    pub async fn comment_updated(&self, previous_content: &str, comment: &Comment) -> Vec<JobId> {
        let mut enqueued = Vec::new();
        let names = new_mentions(previous_content, &comment.content);
        for user in self.mentioned_users(&names).await {
            if user.id == comment.user_id {
                continue;
            }
            enqueued.extend(self.enqueue(mention(user.id, comment)).await);
        }
        enqueued
    }

    /// Notify the owner of the liked post or comment
    pub async fn like_created(&self, like: &Like) -> Vec<JobId> {
        let owner = match self.owner_of(like.target).await {
            Some(owner) => owner,
            None => return Vec::new(),
        };
        if owner == like.user_id {
            debug!("Ignoring self-like {}", like.id);
            return Vec::new();
        }

        let params = NotificationParams::NewLike {
            recipient_user_id: owner,
            source_user_id: like.user_id,
            target: like.target,
        };
        self.enqueue(params).await.into_iter().collect()
    }

    /// Notify the author when `actor` moves a post from draft to published
    pub async fn post_updated(&self, actor: UserId, before: &Post, after: &Post) -> Vec<JobId> {
        if before.published || !after.published {
            return Vec::new();
        }
        let params = NotificationParams::PostPublished {
            recipient_user_id: after.user_id,
            source_user_id: actor,
            post_id: after.id,
        };
        self.enqueue(params).await.into_iter().collect()
    }

    async fn owner_of(&self, target: LikeTarget) -> Option<UserId> {
        let owner = match target {
            LikeTarget::Post(id) => self.store.find_post_by_id(id).await.map(|p| p.map(|p| p.user_id)),
            LikeTarget::Comment(id) => self.store.find_comment_by_id(id).await.map(|c| c.map(|c| c.user_id)),
        };
        match owner {
            Ok(Some(owner)) => Some(owner),
            Ok(None) => {
                warn!("Liked {} {:?} does not exist", target.content_type(), target);
                None
            }
            Err(err) => {
                warn!("Skipping like notification for {:?}: {}", target, err);
                None
            }
        }
    }

    async fn mentioned_users(&self, names: &[String]) -> Vec<User> {
        if names.is_empty() {
            return Vec::new();
        }
        match resolve_mentions(self.store.as_ref(), names).await {
            Ok(users) => users,
            Err(err) => {
                warn!("Skipping mention notifications: {}", err);
                Vec::new()
            }
        }
    }

    async fn enqueue(&self, params: NotificationParams) -> Option<JobId> {
        let kind = params.kind();
        match self.queue.enqueue(NotificationJob::new(params)).await {
            Ok(job_id) => Some(job_id),
            Err(err) => {
                warn!("Failed to enqueue {} notification: {}", kind, err);
                None
            }
        }
    }
}

fn mention(recipient: UserId, comment: &Comment) -> NotificationParams {
    NotificationParams::MentionedInComment {
        recipient_user_id: recipient,
        source_user_id: comment.user_id,
        comment_id: comment.id,
    }
}
