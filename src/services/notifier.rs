// Completion notices
//
// The notifier composes a localized email from the final job record and hands
// it to a mail transport. A transport failure does not fail the invocation; it
// is reported in the delivery record instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::orchestrator::context::{EmailDelivery, JobRecord, Notification, NotificationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub analysis_id: String,
    pub job: JobRecord,
    pub notification: Notification,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifierError {
    #[error("Notification for {analysis_id} has no recipient address")]
    MissingRecipient { analysis_id: String },
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        request: &NotificationRequest,
    ) -> Result<NotificationResult, NotifierError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Error reported by the mail service, kept as code + message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the message id assigned by the mail service
    async fn send(&self, message: &EmailMessage) -> Result<String, TransportError>;
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<String, TransportError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        info!(
            message_id = %message_id,
            sender = %message.sender,
            recipients = ?message.recipients,
            subject = %message.subject,
            body = %message.body,
            "Email dispatched to log transport"
        );
        Ok(message_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Japanese,
}

impl Language {
    /// Primary subtag of the first entry, e.g. `ja` from `ja-JP,en;q=0.8`
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let primary = header
            .unwrap_or_default()
            .split(';')
            .next()
            .and_then(|tags| tags.split(',').next())
            .and_then(|tag| tag.split('-').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if primary == "ja" {
            Self::Japanese
        } else {
            Self::English
        }
    }
}

/// Build subject and body for a finished job
pub fn compose_email(
    job: &JobRecord,
    notification: &Notification,
    recipient: &str,
) -> EmailMessage {
    let language = Language::from_accept_language(notification.accept_language.as_deref());
    let origin = notification
        .frontend_origin
        .as_deref()
        .unwrap_or_default()
        .trim_end_matches('/');
    let link = format!("{origin}/#/analysis/result/{}", job.job_id);
    let display_name = job
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(job.job_id.as_str());

    let parameters = Value::Object(job.parameters.clone().unwrap_or_else(Map::new));
    let parameters = serde_json::to_string_pretty(&parameters).unwrap_or_else(|_| "{}".to_string());
    let status = job.failure_category();
    let status_message = job.status_message.as_deref().unwrap_or("N/A");

    let (subject, body) = match (job.is_error, language) {
        (false, Language::Japanese) => (
            format!("分析 '{display_name}' が完了しました"),
            format!("詳細情報: {link}\nパラメータ: {parameters}\n"),
        ),
        (false, Language::English) => (
            format!("Analysis '{display_name}' completed successfully"),
            format!("View details: {link}\nParameters: {parameters}\n"),
        ),
        (true, Language::Japanese) => (
            format!("分析 '{display_name}' が失敗しました"),
            format!(
                "詳細情報: {link}\nステータス: {status}\nステータスメッセージ: {status_message}\nパラメータ: {parameters}\n"
            ),
        ),
        (true, Language::English) => (
            format!("Analysis '{display_name}' failed"),
            format!(
                "View details: {link}\nStatus: {status}\nStatusMessage: {status_message}\nParameters: {parameters}\n"
            ),
        ),
    };

    EmailMessage {
        sender: recipient.to_string(),
        recipients: vec![recipient.to_string()],
        subject,
        body,
    }
}

/// Email notifier; the recipient also acts as sender
pub struct EmailNotifier<T> {
    transport: T,
}

impl<T: MailTransport> EmailNotifier<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: MailTransport> Notifier for EmailNotifier<T> {
    async fn notify(
        &self,
        request: &NotificationRequest,
    ) -> Result<NotificationResult, NotifierError> {
        let recipient = request
            .notification
            .email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| NotifierError::MissingRecipient {
                analysis_id: request.analysis_id.clone(),
            })?;

        let message = compose_email(&request.job, &request.notification, recipient);

        let (message_id, error, error_message) = match self.transport.send(&message).await {
            Ok(message_id) => {
                info!(
                    analysis_id = %request.analysis_id,
                    message_id = %message_id,
                    "Completion email sent"
                );
                (Some(message_id), None, None)
            }
            Err(e) => {
                error!(analysis_id = %request.analysis_id, error = %e, "Completion email failed");
                (None, Some(e.code), Some(e.message))
            }
        };

        Ok(NotificationResult {
            email: EmailDelivery {
                message_id,
                error,
                error_message,
                sender: message.sender,
                recipients: message.recipients,
                subject: message.subject,
                body: message.body,
            },
        })
    }
}
