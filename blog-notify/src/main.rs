use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use blog_notify::{
    Comment, Like, LikeTarget, LogFormat, MemoryStore, NotificationSystem, NotifyConfig, Post, RecordingMailer, User,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// A small blog: two authors and a reader
fn seed_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(User::new(1, "alice", "alice@example.com"));
    store.insert_user(User::new(2, "bob", "bob@example.com"));
    store.insert_user(User::new(3, "carol", "carol@example.com"));
    store.insert_post(Post {
        id: 10,
        user_id: 1,
        title: "Leases, retries and dead letters".to_string(),
        content: "Background jobs fail. This post walks through how a queue can recover from that.".to_string(),
        published: true,
    });
    store.insert_post(Post {
        id: 11,
        user_id: 2,
        title: "Draft notes".to_string(),
        content: "Work in progress.".to_string(),
        published: false,
    });
    store.insert_comment(Comment {
        id: 100,
        user_id: 2,
        post_id: 10,
        content: "Great write-up! @carol you should read this.".to_string(),
    });
    store
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = NotifyConfig::from_env().context("failed to load configuration")?;
    init_tracing(config.log_format);

    let store = Arc::new(seed_store());
    let mailer = Arc::new(RecordingMailer::with_defaults(config.mailer.clone()));
    let mut system = NotificationSystem::new(config.queue.clone(), store.clone(), mailer.clone()).await?;
    system.start().await?;

    let triggers = system.triggers();
    let comment = Comment {
        id: 100,
        user_id: 2,
        post_id: 10,
        content: "Great write-up! @carol you should read this.".to_string(),
    };
    triggers.comment_created(&comment).await;
    triggers
        .like_created(&Like {
            id: 1,
            user_id: 3,
            target: LikeTarget::Comment(100),
        })
        .await;

    let draft = Post {
        id: 11,
        user_id: 2,
        title: "Draft notes".to_string(),
        content: "Work in progress.".to_string(),
        published: false,
    };
    let published = Post {
        published: true,
        ..draft.clone()
    };
    store.insert_post(published.clone());
    triggers.post_updated(1, &draft, &published).await;

    tokio::select! {
        idle = system.adapter().wait_until_idle(Duration::from_secs(30)) => {
            if !idle? {
                warn!("Queue still busy after 30s");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    for email in mailer.sent_emails() {
        info!(to = %email.recipient, template = %email.template_name, "Delivered: {}", email.subject);
    }
    println!("{}", serde_json::to_string_pretty(&system.metrics())?);

    system.shutdown().await?;
    Ok(())
}
