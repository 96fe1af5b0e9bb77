#![allow(dead_code)]

use std::sync::Arc;

use blog_notify::{Comment, MemoryStore, NotificationContext, Post, RecordingMailer, User};
use blog_queue::LiveMetrics;

pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL: i64 = 3;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub metrics: Arc<LiveMetrics>,
}

impl Fixture {
    pub fn context(&self) -> NotificationContext {
        NotificationContext {
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Alice owns post 42 and wrote comment 17 on Bob's post 9.
/// Bob wrote comment 7 on post 42.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(User::new(ALICE, "alice", "alice@example.com"));
    store.insert_user(User::new(BOB, "bob", "bob@example.com"));
    store.insert_user(User::new(CAROL, "carol", "carol@example.com"));

    store.insert_post(Post {
        id: 42,
        user_id: ALICE,
        title: "Rust queues".to_string(),
        content: "p".repeat(200),
        published: true,
    });
    store.insert_post(Post {
        id: 9,
        user_id: BOB,
        title: "Async traits".to_string(),
        content: "Short post".to_string(),
        published: true,
    });
    store.insert_comment(Comment {
        id: 7,
        user_id: BOB,
        post_id: 42,
        content: "c".repeat(140),
    });
    store.insert_comment(Comment {
        id: 17,
        user_id: ALICE,
        post_id: 9,
        content: "Nice one @bob".to_string(),
    });
    store
}

pub fn fixture() -> Fixture {
    Fixture {
        store: Arc::new(seeded_store()),
        mailer: Arc::new(RecordingMailer::new()),
        metrics: Arc::new(LiveMetrics::new()),
    }
}
