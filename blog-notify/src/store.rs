use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{Comment, CommentId, Post, PostId, User, UserId};

/// Read access to the blog's records.
///
/// Lookups return `Ok(None)` for records that do not exist; `Err` is kept for
/// the store itself being unreachable.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Exact, case-sensitive match on the display name
    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;

    async fn find_post_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    async fn find_comment_by_id(&self, id: CommentId) -> Result<Option<Comment>, StoreError>;
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
}

/// In-process record store for tests and the demo binary
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    outage: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.tables.write().users.insert(user.id, user);
    }

    pub fn insert_post(&self, post: Post) {
        self.tables.write().posts.insert(post.id, post);
    }

    pub fn insert_comment(&self, comment: Comment) {
        self.tables.write().comments.insert(comment.id, comment);
    }

    pub fn remove_comment(&self, id: CommentId) -> Option<Comment> {
        self.tables.write().comments.remove(&id)
    }

    /// Make every lookup fail with `reason` until cleared with `None`
    pub fn set_outage(&self, reason: Option<&str>) {
        *self.outage.write() = reason.map(str::to_string);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match self.outage.read().as_ref() {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().users.values().find(|u| u.name == name).cloned())
    }

    async fn find_post_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().posts.get(&id).cloned())
    }

    async fn find_comment_by_id(&self, id: CommentId) -> Result<Option<Comment>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().comments.get(&id).cloned())
    }
}
