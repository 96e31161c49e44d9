use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::MailConfig;
use crate::errors::{AppError, Result};
use crate::models::otp::OtpKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<()>;
}

pub fn otp_message(kind: OtpKind, destination: &str, code: &str, ttl: Duration) -> MailMessage {
    let minutes = (ttl.as_secs() / 60).max(1);
    let (subject, purpose) = match kind {
        OtpKind::ForgotPassword => ("Password reset code", "reset your password"),
        OtpKind::Registration => ("Confirm your email", "finish creating your account"),
    };

    MailMessage {
        to: destination.to_string(),
        subject: subject.to_string(),
        text: format!(
            "Your code to {} is: {}. It is valid for {} minutes.",
            purpose, code, minutes
        ),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    text_content: String,
}

/// Sends mail through an HTTP relay API.
#[derive(Clone)]
pub struct HttpMailer {
    config: MailConfig,
    client: Client,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<()> {
        let body = SendMailBody {
            sender: MailAddress {
                email: self.config.from.clone(),
                name: self.config.from_name.clone(),
            },
            to: vec![MailAddress {
                email: message.to.clone(),
                name: None,
            }],
            subject: message.subject,
            text_content: message.text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("api-key", &self.config.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(to = %message.to, "mail sent");
            Ok(())
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(AppError::mail(format!(
                "mail relay returned {}: {}",
                status, detail
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<MailMessage>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<MailMessage> {
            self.sent.lock().unwrap().clone()
        }

        /// The trailing code from the most recent OTP mail.
        pub fn last_code(&self) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            let text = &sent.last()?.text;
            let start = text.find("is: ")? + 4;
            let code: String = text[start..].chars().take_while(char::is_ascii_digit).collect();
            Some(code)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: MailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_message_mentions_code_and_lifetime() {
        let message = otp_message(
            OtpKind::ForgotPassword,
            "a@example.com",
            "012345",
            Duration::from_secs(600),
        );
        assert_eq!(message.to, "a@example.com");
        assert_eq!(message.subject, "Password reset code");
        assert!(message.text.contains("012345"));
        assert!(message.text.contains("10 minutes"));
    }

    #[test]
    fn relay_body_uses_camel_case() {
        let body = SendMailBody {
            sender: MailAddress {
                email: "from@example.com".into(),
                name: None,
            },
            to: vec![MailAddress {
                email: "to@example.com".into(),
                name: None,
            }],
            subject: "s".into(),
            text_content: "t".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["textContent"], "t");
        assert!(json["sender"].get("name").is_none());
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_mail_error() {
        let mailer = HttpMailer::new(MailConfig {
            api_url: "http://127.0.0.1:9/mail".into(),
            api_key: "k".into(),
            from: "from@example.com".into(),
            from_name: None,
        });
        let err = mailer
            .send(otp_message(
                OtpKind::Registration,
                "a@example.com",
                "123456",
                Duration::from_secs(60),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MailError(_)));
    }
}
