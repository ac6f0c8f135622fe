use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::MailError;

/// Delivers a fully built message to its envelope recipients.
pub trait MailRelay: Send + Sync {
    fn send(&self, message: Message) -> impl Future<Output = Result<(), MailError>> + Send;
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// SMTP submission relay. Every message opens its own connection, upgrades
/// with STARTTLS when the server offers it, authenticates when credentials
/// are configured and closes the session after the message is accepted.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    settings: SmtpSettings,
}

impl SmtpRelay {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let tls = TlsParameters::new(self.settings.host.clone())?;
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.settings.host.as_str())
                .port(self.settings.port)
                .tls(Tls::Opportunistic(tls))
                .timeout(Some(self.settings.timeout));
        if let (Some(username), Some(password)) =
            (self.settings.username.as_ref(), self.settings.password.as_ref())
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

impl MailRelay for SmtpRelay {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        let transport = self.transport()?;
        transport.send(message).await?;
        Ok(())
    }
}

/// A message captured by [`MemoryRelay`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipients: Vec<String>,
    pub formatted: String,
}

/// Relay that keeps messages in memory instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: bool,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay that rejects every message, for exercising failure paths.
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MailRelay for MemoryRelay {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError::Transport("relay rejected message".to_string()));
        }
        let recipients = message
            .envelope()
            .to()
            .iter()
            .map(|address| address.to_string())
            .collect();
        let formatted = String::from_utf8_lossy(&message.formatted()).into_owned();
        let mut guard = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(SentMail {
            recipients,
            formatted,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::builder()
            .from("sender@example.com".parse().expect("from"))
            .to("hr@example.com".parse().expect("to"))
            .subject("hello")
            .body(String::from("body"))
            .expect("message")
    }

    #[tokio::test]
    async fn memory_relay_records_recipients() {
        let relay = MemoryRelay::new();
        relay.send(message()).await.expect("send");

        let sent = relay.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["hr@example.com".to_string()]);
        assert!(sent[0].formatted.contains("Subject: hello"));
    }

    #[tokio::test]
    async fn failing_relay_keeps_nothing() {
        let relay = MemoryRelay::failing();
        assert!(relay.send(message()).await.is_err());
        assert!(relay.sent().is_empty());
    }

    #[test]
    fn settings_debug_hides_password() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("svc@example.com".to_string()),
            password: Some("hunter2".to_string()),
            timeout: Duration::from_secs(10),
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
