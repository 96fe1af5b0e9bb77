//! The notification job: resolves the records a notification refers to,
//! renders the email data and hands it to the mail dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use blog_queue::{Job, JobError, JobPriority, MetricsSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{NotifyError, StoreError};
use crate::mailer::{MailDispatcher, TemplateData};
use crate::models::{Comment, CommentId, LikeTarget, Post, PostId, User};
use crate::params::{NotificationKind, NotificationParams};
use crate::store::RecordStore;
use crate::text::{comment_path, post_path, truncate, LONG_EXCERPT, SHORT_EXCERPT};

/// Collaborators shared by every notification job
#[derive(Clone)]
pub struct NotificationContext {
    pub store: Arc<dyn RecordStore>,
    pub mailer: Arc<dyn MailDispatcher>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Outcome of a notification job that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Delivery {
    Sent { kind: NotificationKind, recipient: String },
    /// A referenced record was missing or an id was invalid
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationJob {
    pub params: NotificationParams,
}

impl NotificationJob {
    pub fn new(params: NotificationParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Job for NotificationJob {
    type Context = NotificationContext;
    type Output = Delivery;

    const JOB_TYPE: &'static str = "notification";
    const QUEUE: &'static str = "notifications";
    const PRIORITY: JobPriority = JobPriority::NORMAL;

    async fn execute(&self, ctx: NotificationContext) -> Result<Delivery, JobError> {
        deliver(&self.params, &ctx).await.map_err(JobError::from)
    }
}

/// A fully resolved email
struct Email {
    subject: &'static str,
    template: &'static str,
    data: TemplateData,
}

impl Email {
    fn new(subject: &'static str, template: &'static str) -> Self {
        Self {
            subject,
            template,
            data: TemplateData::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Why composing an email stopped
enum Abort {
    Skip(String),
    Fail(NotifyError),
}

impl From<StoreError> for Abort {
    fn from(err: StoreError) -> Self {
        Self::Fail(err.into())
    }
}

/// Log a missing or invalid reference and give up on this notification
fn skip(reason: String) -> Abort {
    error!("NotificationJob: {}", reason);
    Abort::Skip(reason)
}

/// Run one notification.
///
/// Missing records are logged and reported as [`Delivery::Skipped`]; only
/// store outages and delivery failures come back as errors.
pub async fn deliver(params: &NotificationParams, ctx: &NotificationContext) -> Result<Delivery, NotifyError> {
    let kind = params.kind();
    let (user, email) = match compose(params, ctx.store.as_ref()).await {
        Ok(resolved) => resolved,
        Err(Abort::Skip(reason)) => return Ok(Delivery::Skipped { reason }),
        Err(Abort::Fail(err)) => {
            error!("NotificationJob: Failed to prepare {} notification: {}", kind, err);
            return Err(err);
        }
    };

    debug!(
        "NotificationJob: Sending {} notification to user {} ({})",
        kind, user.id, email.template
    );
    let sent = ctx
        .mailer
        .send_template(&user.email, email.subject, email.template, &email.data)
        .await
        .map_err(|err| {
            error!("NotificationJob: Failed to send {} notification: {}", kind, err);
            NotifyError::from(err)
        })?;

    if !sent {
        error!(
            "NotificationJob: Mailer declined {} notification for user {}",
            kind, user.id
        );
        return Err(NotifyError::Rejected {
            template: email.template.to_string(),
            recipient: user.email,
        });
    }

    ctx.metrics.increment(&kind.sent_counter());
    info!("NotificationJob: Sent {} notification to user {}", kind, user.id);
    Ok(Delivery::Sent {
        kind,
        recipient: user.email,
    })
}

async fn compose(params: &NotificationParams, store: &dyn RecordStore) -> Result<(User, Email), Abort> {
    let user = find_user(store, params.recipient_user_id(), "User not found").await?;
    let source = find_user(store, params.source_user_id(), "Source user not found").await?;

    let email = match params {
        NotificationParams::NewComment {
            post_id, comment_id, ..
        } => new_comment(store, &user, &source, *post_id, *comment_id).await?,
        NotificationParams::NewLike { target, .. } => new_like(store, &user, &source, *target).await?,
        NotificationParams::MentionedInComment { comment_id, .. } => {
            mentioned(store, &user, &source, *comment_id).await?
        }
        NotificationParams::PostPublished { post_id, .. } => post_published(store, &user, *post_id).await?,
    };
    Ok((user, email))
}

async fn new_comment(
    store: &dyn RecordStore,
    user: &User,
    commenter: &User,
    post_id: PostId,
    comment_id: CommentId,
) -> Result<Email, Abort> {
    if post_id <= 0 || comment_id <= 0 {
        return Err(skip(
            "Missing post_id or comment_id for NewComment notification".to_string(),
        ));
    }
    let post = find_post(store, post_id).await?;
    let comment = find_comment(store, comment_id).await?;

    Ok(Email::new("New comment on your post", "comment_notification")
        .with("user_name", &user.name)
        .with("commenter_name", &commenter.name)
        .with("post_title", &post.title)
        .with("comment_excerpt", truncate(&comment.content, SHORT_EXCERPT))
        .with("post_url", post_path(post.id)))
}

async fn new_like(store: &dyn RecordStore, user: &User, liker: &User, target: LikeTarget) -> Result<Email, Abort> {
    let (subject, content, url) = match target {
        LikeTarget::Post(post_id) if post_id > 0 => {
            let post = find_post(store, post_id).await?;
            ("Someone liked your post", post.title, post_path(post.id))
        }
        LikeTarget::Comment(comment_id) if comment_id > 0 => {
            let comment = find_comment(store, comment_id).await?;
            let post = store.find_post_by_id(comment.post_id).await?.ok_or_else(|| {
                skip(format!("Post not found for comment, post_id={}", comment.post_id))
            })?;
            (
                "Someone liked your comment",
                comment.content,
                comment_path(post.id, comment.id),
            )
        }
        _ => {
            return Err(skip(
                "Missing post_id or comment_id for NewLike notification".to_string(),
            ))
        }
    };

    Ok(Email::new(subject, "like_notification")
        .with("user_name", &user.name)
        .with("liker_name", &liker.name)
        .with("content_type", target.content_type())
        .with("content_excerpt", truncate(&content, SHORT_EXCERPT))
        .with("url", url))
}

async fn mentioned(
    store: &dyn RecordStore,
    user: &User,
    mentioner: &User,
    comment_id: CommentId,
) -> Result<Email, Abort> {
    if comment_id <= 0 {
        return Err(skip(
            "Missing comment_id for MentionedInComment notification".to_string(),
        ));
    }
    let comment = find_comment(store, comment_id).await?;
    let post = find_post(store, comment.post_id).await?;

    Ok(Email::new("You were mentioned in a comment", "mention_notification")
        .with("user_name", &user.name)
        .with("mentioner_name", &mentioner.name)
        .with("post_title", &post.title)
        .with("comment_excerpt", truncate(&comment.content, SHORT_EXCERPT))
        .with("post_url", comment_path(post.id, comment.id)))
}

async fn post_published(store: &dyn RecordStore, user: &User, post_id: PostId) -> Result<Email, Abort> {
    if post_id <= 0 {
        return Err(skip("Missing post_id for PostPublished notification".to_string()));
    }
    let post = find_post(store, post_id).await?;

    Ok(Email::new("Your post has been published!", "post_published_notification")
        .with("user_name", &user.name)
        .with("post_title", &post.title)
        .with("post_excerpt", truncate(&post.content, LONG_EXCERPT))
        .with("post_url", post_path(post.id)))
}

async fn find_user(store: &dyn RecordStore, id: i64, missing: &str) -> Result<User, Abort> {
    if id <= 0 {
        return Err(skip(format!("{}, id={}", missing, id)));
    }
    store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| skip(format!("{}, id={}", missing, id)))
}

async fn find_post(store: &dyn RecordStore, id: PostId) -> Result<Post, Abort> {
    store
        .find_post_by_id(id)
        .await?
        .ok_or_else(|| skip(format!("Post not found, id={}", id)))
}

async fn find_comment(store: &dyn RecordStore, id: CommentId) -> Result<Comment, Abort> {
    store
        .find_comment_by_id(id)
        .await?
        .ok_or_else(|| skip(format!("Comment not found, id={}", id)))
}
