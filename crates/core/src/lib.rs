//! Domain layer for the intake service: record types, origin extraction,
//! recipient resolution and resume validation. Nothing in here performs I/O.

pub mod origin;
pub mod recipients;
pub mod types;
pub mod upload;

pub use origin::{extract_origin_domain, normalize_domain, OriginError, OriginHeaders};
pub use recipients::RecipientDirectory;
pub use types::{non_blank, Contact, ContactForm, Submission, SubmissionForm};
pub use upload::{sanitize_filename, ResumeFormat, UploadError};
