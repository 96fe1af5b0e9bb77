//! # blog-notify: email notifications for blog activity
//!
//! Web handlers call [`NotificationTriggers`] after writing a comment, like or
//! post. Each trigger enqueues a [`NotificationJob`] on the `notifications`
//! queue; workers resolve the referenced records through a [`RecordStore`],
//! render the template data and hand it to a [`MailDispatcher`].
//!
//! Missing records are logged and skipped. Delivery failures are retried by
//! the queue with backoff and end up in the dead-letter queue when retries
//! run out.

pub mod config;
pub mod error;
pub mod job;
pub mod mailer;
pub mod mentions;
pub mod models;
pub mod params;
pub mod store;
pub mod system;
pub mod text;
pub mod triggers;

pub use config::{LogFormat, NotifyConfig};
pub use error::{ConfigError, MailError, NotifyError, StoreError};
pub use job::{deliver, Delivery, NotificationContext, NotificationJob};
pub use mailer::{LogMailer, MailDispatcher, MailerDefaults, RecordingMailer, SentEmail, TemplateData};
pub use models::{Comment, Like, LikeTarget, Post, User};
pub use params::{NotificationKind, NotificationParams};
pub use store::{MemoryStore, RecordStore};
pub use system::NotificationSystem;
pub use triggers::NotificationTriggers;
