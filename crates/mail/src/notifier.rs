use std::sync::Arc;

use intake_core::{Contact, RecipientDirectory, Submission};
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use tracing::{info, warn};

use crate::relay::MailRelay;
use crate::render;
use crate::MailError;

/// Builds notification messages and hands them to a [`MailRelay`].
///
/// Failures never propagate: they are logged and reported as `false` so the
/// caller can count them without treating the request as failed.
pub struct Notifier<R> {
    relay: R,
    recipients: Arc<RecipientDirectory>,
    sender: String,
}

impl<R: MailRelay> Notifier<R> {
    pub fn new(relay: R, recipients: Arc<RecipientDirectory>, sender: impl Into<String>) -> Self {
        Self {
            relay,
            recipients,
            sender: sender.into(),
        }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub async fn notify_submission(
        &self,
        submission: &Submission,
        filename: &str,
        payload: &[u8],
    ) -> bool {
        match self.send_submission(submission, filename, payload).await {
            Ok(recipient) => {
                info!(
                    stage = "notify",
                    submission_id = %submission.id,
                    recipient = %recipient,
                    "submission notification sent"
                );
                true
            }
            Err(err) => {
                warn!(
                    stage = "notify",
                    submission_id = %submission.id,
                    domain = %submission.origin_domain,
                    error = %err,
                    "submission notification failed"
                );
                false
            }
        }
    }

    pub async fn notify_contact(&self, contact: &Contact, domain: &str) -> bool {
        match self.send_contact(contact, domain).await {
            Ok(recipient) => {
                info!(
                    stage = "notify",
                    contact_id = %contact.id,
                    recipient = %recipient,
                    "contact notification sent"
                );
                true
            }
            Err(err) => {
                warn!(
                    stage = "notify",
                    contact_id = %contact.id,
                    domain = %domain,
                    error = %err,
                    "contact notification failed"
                );
                false
            }
        }
    }

    async fn send_submission(
        &self,
        submission: &Submission,
        filename: &str,
        payload: &[u8],
    ) -> Result<String, MailError> {
        let recipient = self.recipient(&submission.origin_domain)?;
        let body = Body::new_with_encoding(payload.to_vec(), ContentTransferEncoding::Base64)
            .map_err(|_| MailError::Build("attachment could not be encoded".to_string()))?;
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|err| MailError::Build(err.to_string()))?;
        let attachment = Attachment::new(filename.to_string()).body(body, content_type);

        let message = self
            .builder(&recipient, Some(&submission.form.email))?
            .subject(render::submission_subject(submission))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(render::submission_html(submission)))
                    .singlepart(attachment),
            )?;
        self.relay.send(message).await?;
        Ok(recipient)
    }

    async fn send_contact(&self, contact: &Contact, domain: &str) -> Result<String, MailError> {
        let recipient = self.recipient(domain)?;
        let message = self
            .builder(&recipient, contact.form.email.as_deref())?
            .subject(render::contact_subject(contact))
            .singlepart(SinglePart::html(render::contact_html(contact, domain)))?;
        self.relay.send(message).await?;
        Ok(recipient)
    }

    fn recipient(&self, domain: &str) -> Result<String, MailError> {
        self.recipients
            .recipient_for(domain)
            .map(str::to_string)
            .ok_or_else(|| MailError::NoRecipient(domain.to_string()))
    }

    fn builder(
        &self,
        recipient: &str,
        reply_to: Option<&str>,
    ) -> Result<lettre::message::MessageBuilder, MailError> {
        let mut builder = Message::builder()
            .from(mailbox(&self.sender)?)
            .to(mailbox(recipient)?);
        // An unparseable applicant address only loses the Reply-To header.
        if let Some(reply) = reply_to.and_then(|address| address.trim().parse::<Mailbox>().ok()) {
            builder = builder.reply_to(reply);
        }
        Ok(builder)
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.trim().parse().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRelay;
    use chrono::Utc;
    use intake_core::{ContactForm, SubmissionForm};

    fn directory() -> Arc<RecipientDirectory> {
        Arc::new(
            RecipientDirectory::new(Vec::<(String, String)>::new())
                .with_builtin_domains()
                .with_fallbacks(None, Some("service@gmail.com".to_string())),
        )
    }

    fn submission(domain: &str) -> Submission {
        Submission {
            id: "s-1".to_string(),
            form: SubmissionForm {
                full_name: "Jane Doe".to_string(),
                email: "jane@x.com".to_string(),
                phone: "+91-9876543210".to_string(),
                linkedin: None,
                role: "Backend Developer".to_string(),
                work_auth_status: "Citizen".to_string(),
                preferred_location: "Hyderabad".to_string(),
                availability: "Immediate".to_string(),
                comments: None,
            },
            resume_url: "http://minio:9000/resumes/resumes/abc_resume.pdf".to_string(),
            origin_domain: domain.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn contact(email: Option<&str>) -> Contact {
        Contact {
            id: "c-1".to_string(),
            form: ContactForm {
                full_name: "Sam Lee".to_string(),
                email: email.map(str::to_string),
                ..ContactForm::default()
            },
            origin_domain: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submission_goes_to_resolved_recipient_with_attachment() {
        let notifier = Notifier::new(MemoryRelay::new(), directory(), "service@gmail.com");

        let sent = notifier
            .notify_submission(&submission("kgktechnologies.com"), "resume.pdf", b"%PDF-1.4")
            .await;
        assert!(sent);

        let mails = notifier.relay().sent();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].recipients, vec!["Hr@kgktechnologies.com".to_string()]);
        let formatted = &mails[0].formatted;
        assert!(formatted.contains("Subject: New Career Submission - Jane Doe"));
        assert!(formatted.contains("Reply-To: jane@x.com"));
        assert!(formatted.contains("filename=\"resume.pdf\""));
        assert!(formatted.contains("Content-Transfer-Encoding: base64"));
        // base64 of "%PDF-1.4"
        assert!(formatted.contains("JVBERi0xLjQ="));
    }

    #[tokio::test]
    async fn unknown_domain_uses_service_account() {
        let notifier = Notifier::new(MemoryRelay::new(), directory(), "service@gmail.com");

        assert!(
            notifier
                .notify_submission(&submission("unknown.org"), "cv.docx", b"PK")
                .await
        );
        assert_eq!(
            notifier.relay().sent()[0].recipients,
            vec!["service@gmail.com".to_string()]
        );
    }

    #[tokio::test]
    async fn contact_without_any_recipient_reports_failure() {
        let empty = Arc::new(RecipientDirectory::new(Vec::<(String, String)>::new()));
        let notifier = Notifier::new(MemoryRelay::new(), empty, "service@gmail.com");

        assert!(!notifier.notify_contact(&contact(None), "").await);
        assert!(notifier.relay().sent().is_empty());
    }

    #[tokio::test]
    async fn contact_subject_and_recipient() {
        let notifier = Notifier::new(MemoryRelay::new(), directory(), "service@gmail.com");

        assert!(notifier.notify_contact(&contact(Some("not an address")), "dglobal.com").await);
        let mails = notifier.relay().sent();
        assert_eq!(mails[0].recipients, vec!["hr@dglobaltech.com".to_string()]);
        assert!(mails[0].formatted.contains("Subject: New Contact Inquiry - Sam Lee"));
        assert!(!mails[0].formatted.contains("Reply-To:"));
    }

    #[tokio::test]
    async fn relay_failure_is_reported_not_raised() {
        let notifier = Notifier::new(MemoryRelay::failing(), directory(), "service@gmail.com");
        assert!(
            !notifier
                .notify_submission(&submission("kgktechnologies.com"), "resume.pdf", b"%PDF")
                .await
        );
    }
}
