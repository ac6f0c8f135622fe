//! Outbound notification email for submissions and contact inquiries.

mod notifier;
mod relay;
pub mod render;

pub use notifier::Notifier;
pub use relay::{MailRelay, MemoryRelay, SentMail, SmtpRelay, SmtpSettings};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no recipient configured for domain '{0}'")]
    NoRecipient(String),
    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("smtp transport failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("relay failed: {0}")]
    Transport(String),
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::Build(err.to_string())
    }
}
