use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::error::MailError;

/// Key/value data rendered into a mail template
pub type TemplateData = BTreeMap<String, String>;

/// Sends templated emails.
///
/// `Ok(false)` means the dispatcher declined the message without an error;
/// the notification job treats it as a retryable failure.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send_template(
        &self,
        recipient: &str,
        subject: &str,
        template: &str,
        data: &TemplateData,
    ) -> Result<bool, MailError>;
}

/// Sender address and site-wide template values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerDefaults {
    pub from: String,
    pub site_name: String,
    pub site_url: String,
    pub support_email: String,
}

impl Default for MailerDefaults {
    fn default() -> Self {
        Self {
            from: "notifications@example.com".to_string(),
            site_name: "Your Application".to_string(),
            site_url: "https://example.com".to_string(),
            support_email: "support@example.com".to_string(),
        }
    }
}

impl MailerDefaults {
    /// Site defaults overlaid with `data`; keys in `data` win
    pub fn merge(&self, data: &TemplateData) -> TemplateData {
        let mut merged = TemplateData::from([
            ("site_name".to_string(), self.site_name.clone()),
            ("site_url".to_string(), self.site_url.clone()),
            ("support_email".to_string(), self.support_email.clone()),
        ]);
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// An email captured by [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentEmail {
    pub from: String,
    pub recipient: String,
    pub subject: String,
    pub template_name: String,
    pub template_data: TemplateData,
}

enum Scripted {
    Fail(MailError),
    Reject,
}

/// Keeps every email in memory instead of delivering it.
///
/// Failures can be scripted for upcoming sends with [`fail_next`] and
/// [`reject_next`]; they are consumed in order.
///
/// [`fail_next`]: RecordingMailer::fail_next
/// [`reject_next`]: RecordingMailer::reject_next
#[derive(Default)]
pub struct RecordingMailer {
    defaults: MailerDefaults,
    sent: Mutex<Vec<SentEmail>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: MailerDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn fail_next(&self, error: MailError) {
        self.script.lock().push_back(Scripted::Fail(error));
    }

    pub fn reject_next(&self) {
        self.script.lock().push_back(Scripted::Reject);
    }
}

#[async_trait]
impl MailDispatcher for RecordingMailer {
    async fn send_template(
        &self,
        recipient: &str,
        subject: &str,
        template: &str,
        data: &TemplateData,
    ) -> Result<bool, MailError> {
        match self.script.lock().pop_front() {
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Reject) => return Ok(false),
            None => {}
        }

        self.sent.lock().push(SentEmail {
            from: self.defaults.from.clone(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            template_name: template.to_string(),
            template_data: self.defaults.merge(data),
        });
        Ok(true)
    }
}

/// Writes each email to the log at info level
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    defaults: MailerDefaults,
}

impl LogMailer {
    pub fn new(defaults: MailerDefaults) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl MailDispatcher for LogMailer {
    async fn send_template(
        &self,
        recipient: &str,
        subject: &str,
        template: &str,
        data: &TemplateData,
    ) -> Result<bool, MailError> {
        let data = self.defaults.merge(data);
        info!(
            from = %self.defaults.from,
            to = %recipient,
            template = %template,
            data = ?data,
            "Sending email: {}",
            subject
        );
        Ok(true)
    }
}
