use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{CommentId, LikeTarget, PostId, UserId};

/// Kinds of notification the pipeline can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewComment,
    NewLike,
    MentionedInComment,
    PostPublished,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        Self::NewComment,
        Self::NewLike,
        Self::MentionedInComment,
        Self::PostPublished,
    ];

    /// Short name used in metric keys
    pub fn slug(self) -> &'static str {
        match self {
            Self::NewComment => "new_comment",
            Self::NewLike => "new_like",
            Self::MentionedInComment => "mentioned",
            Self::PostPublished => "post_published",
        }
    }

    /// Counter incremented after each successful send
    pub fn sent_counter(self) -> String {
        format!("notifications.{}.sent", self.slug())
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewComment => "NewComment",
            Self::NewLike => "NewLike",
            Self::MentionedInComment => "MentionedInComment",
            Self::PostPublished => "PostPublished",
        };
        f.write_str(name)
    }
}

/// Everything a notification job needs, one variant per kind.
///
/// Ids of zero or below are treated as missing when the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationParams {
    NewComment {
        recipient_user_id: UserId,
        source_user_id: UserId,
        post_id: PostId,
        comment_id: CommentId,
    },
    NewLike {
        recipient_user_id: UserId,
        source_user_id: UserId,
        target: LikeTarget,
    },
    MentionedInComment {
        recipient_user_id: UserId,
        source_user_id: UserId,
        comment_id: CommentId,
    },
    PostPublished {
        recipient_user_id: UserId,
        source_user_id: UserId,
        post_id: PostId,
    },
}

impl NotificationParams {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::NewComment { .. } => NotificationKind::NewComment,
            Self::NewLike { .. } => NotificationKind::NewLike,
            Self::MentionedInComment { .. } => NotificationKind::MentionedInComment,
            Self::PostPublished { .. } => NotificationKind::PostPublished,
        }
    }

    pub fn recipient_user_id(&self) -> UserId {
        match self {
            Self::NewComment { recipient_user_id, .. }
            | Self::NewLike { recipient_user_id, .. }
            | Self::MentionedInComment { recipient_user_id, .. }
            | Self::PostPublished { recipient_user_id, .. } => *recipient_user_id,
        }
    }

    pub fn source_user_id(&self) -> UserId {
        match self {
            Self::NewComment { source_user_id, .. }
            | Self::NewLike { source_user_id, .. }
            | Self::MentionedInComment { source_user_id, .. }
            | Self::PostPublished { source_user_id, .. } => *source_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_with_kind_tag() {
        let params = NotificationParams::NewLike {
            recipient_user_id: 1,
            source_user_id: 2,
            target: LikeTarget::Comment(17),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "new_like",
                "recipient_user_id": 1,
                "source_user_id": 2,
                "target": { "type": "comment", "id": 17 }
            })
        );
        let back: NotificationParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn slugs_and_counters() {
        let slugs: Vec<_> = NotificationKind::ALL.iter().map(|k| k.slug()).collect();
        assert_eq!(slugs, ["new_comment", "new_like", "mentioned", "post_published"]);
        assert_eq!(
            NotificationKind::MentionedInComment.sent_counter(),
            "notifications.mentioned.sent"
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = serde_json::from_value::<NotificationParams>(json!({
            "kind": "password_reset",
            "recipient_user_id": 1,
            "source_user_id": 1
        }));
        assert!(result.is_err());
    }
}
