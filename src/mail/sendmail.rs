use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::config::Config;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Mail provider error: {0}")]
    Provider(String),
}

/// Outgoing mail. Callers treat a failure as non-fatal.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Picks Resend when an API key is configured, SMTP when a host is, and
/// otherwise logs messages instead of sending them.
pub fn mailer_from_config(config: &Config) -> Arc<dyn MailSender> {
    if let Some(api_key) = &config.resend_api_key {
        tracing::info!("Mail delivery through Resend");
        Arc::new(ResendMailer::new(api_key.clone(), config.from_email.clone()))
    } else if let Some(host) = &config.smtp_host {
        tracing::info!("Mail delivery through SMTP relay {}", host);
        Arc::new(SmtpMailer {
            host: host.clone(),
            port: config.smtp_port,
            username: config.smtp_username.clone(),
            password: config.smtp_password.clone(),
            from_email: config.from_email.clone(),
        })
    } else {
        tracing::warn!("No mail provider configured, emails will only be logged");
        Arc::new(LogMailer)
    }
}

fn check_recipient(to_email: &str) -> Result<(), MailError> {
    if to_email.is_empty() || !to_email.contains('@') {
        return Err(MailError::InvalidAddress(to_email.to_string()));
    }
    Ok(())
}

pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from_email: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from_email: String) -> Self {
        ResendMailer {
            client: reqwest::Client::new(),
            api_key,
            from_email,
        }
    }

    async fn send_once(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, String> {
        let request_body = json!({
            "from": self.from_email,
            "to": to_email,
            "subject": subject,
            "html": html_body,
        });

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .unwrap_or_else(|_| "No response body".to_string());

        if status.is_success() {
            let id = serde_json::from_str::<serde_json::Value>(&response_text)
                .ok()
                .and_then(|body| body.get("id").and_then(|v| v.as_str()).map(str::to_string))
                .unwrap_or_else(|| "success".to_string());
            Ok(id)
        } else {
            Err(format!("Resend API error ({}): {}", status.as_u16(), response_text))
        }
    }
}

#[async_trait]
impl MailSender for ResendMailer {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        check_recipient(to_email)?;

        let mut last_error = String::new();
        for attempt in 1..=MAX_RETRIES {
            match self.send_once(to_email, subject, html_body).await {
                Ok(email_id) => {
                    tracing::info!("Email sent to {} (id: {})", to_email, email_id);
                    return Ok(());
                }
                Err(e) => {
                    last_error = e;
                    if attempt < MAX_RETRIES {
                        let delay = RETRY_DELAY_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Email attempt {} failed for {}. Retrying in {}ms...",
                            attempt,
                            to_email,
                            delay
                        );
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(MailError::Provider(format!(
            "failed after {} attempts: {}",
            MAX_RETRIES, last_error
        )))
    }
}

pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    from_email: String,
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials, Message,
            SmtpTransport, Transport,
        };

        check_recipient(to_email)?;

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_email.clone()))?,
            )
            .to(to_email
                .parse()
                .map_err(|_| MailError::InvalidAddress(to_email.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| MailError::Provider(e.to_string()))?;

        let mailer = SmtpTransport::relay(&self.host)
            .map_err(|e| MailError::Provider(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .build();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| MailError::Provider(e.to_string()))?
            .map_err(|e| MailError::Provider(e.to_string()))?;

        tracing::info!("Email sent to {} via SMTP", to_email);
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        check_recipient(to_email)?;
        tracing::info!("[mail] to={} subject={:?}\n{}", to_email, subject, html_body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_accepts_valid_recipient() {
        assert!(LogMailer.send("a@x.com", "Code", "<p>123456</p>").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected_before_sending() {
        let mailer = ResendMailer::new("re_test".to_string(), "noreply@localhost".to_string());
        assert!(matches!(
            mailer.send("not-an-email", "Code", "body").await,
            Err(MailError::InvalidAddress(_))
        ));
    }
}
