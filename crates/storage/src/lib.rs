use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    any::{install_default_drivers, AnyPoolOptions, AnyRow},
    migrate::MigrateError,
    AnyPool, FromRow, Row,
};
use thiserror::Error;
use uuid::Uuid;

use intake_core::{Contact, ContactForm, Submission, SubmissionForm};

/// Top-level database handle that owns the connection pool.
///
/// The pool is driver-agnostic: SQLite and Postgres URLs are both accepted,
/// and every statement sticks to `$n` placeholders and TEXT columns so it
/// runs unchanged on either backend.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Establishes a new connection pool for the provided connection string.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    if conn.backend_name().eq_ignore_ascii_case("sqlite") {
                        sqlx::query("PRAGMA foreign_keys = ON;")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA busy_timeout = 5000;")
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to interact with career submissions.
    pub fn submissions(&self) -> SubmissionRepository {
        SubmissionRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to interact with contact inquiries.
    pub fn contacts(&self) -> ContactRepository {
        ContactRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to database: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Data required to persist a career submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    /// Identity to store; a UUID is generated when absent.
    pub id: Option<String>,
    pub form: SubmissionForm,
    pub resume_url: String,
    pub origin_domain: String,
}

/// Repository responsible for the `submissions` table.
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: AnyPool,
}

impl SubmissionRepository {
    /// Inserts a submission in its own transaction and returns the stored record.
    pub async fn insert(
        &self,
        record: NewSubmission,
        now: DateTime<Utc>,
    ) -> Result<Submission, SubmissionError> {
        if record.origin_domain.trim().is_empty() {
            return Err(SubmissionError::MissingOriginDomain);
        }

        let id = record
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = to_rfc3339(now);
        let form = record.form;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO submissions \
             (id, full_name, email, phone, linkedin, role, work_auth_status, preferred_location, \
              availability, comments, resume_url, origin_domain, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&id)
        .bind(&form.full_name)
        .bind(&form.email)
        .bind(&form.phone)
        .bind(&form.linkedin)
        .bind(&form.role)
        .bind(&form.work_auth_status)
        .bind(&form.preferred_location)
        .bind(&form.availability)
        .bind(&form.comments)
        .bind(&record.resume_url)
        .bind(&record.origin_domain)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Submission {
            id,
            form,
            resume_url: record.resume_url,
            origin_domain: record.origin_domain,
            created_at: now,
            updated_at: now,
        })
    }

    /// Loads a submission by identity.
    pub async fn fetch(&self, id: &str) -> Result<Option<Submission>, SubmissionError> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT id, full_name, email, phone, linkedin, role, work_auth_status, \
                    preferred_location, availability, comments, resume_url, origin_domain, \
                    created_at, updated_at \
               FROM submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubmissionRow::into_domain).transpose()
    }
}

#[derive(Debug)]
struct SubmissionRow {
    id: String,
    full_name: String,
    email: String,
    phone: String,
    linkedin: Option<String>,
    role: String,
    work_auth_status: String,
    preferred_location: String,
    availability: String,
    comments: Option<String>,
    resume_url: String,
    origin_domain: String,
    created_at: String,
    updated_at: String,
}

impl<'r> FromRow<'r, AnyRow> for SubmissionRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            linkedin: nullable_text(row, "linkedin")?,
            role: row.try_get("role")?,
            work_auth_status: row.try_get("work_auth_status")?,
            preferred_location: row.try_get("preferred_location")?,
            availability: row.try_get("availability")?,
            comments: nullable_text(row, "comments")?,
            resume_url: row.try_get("resume_url")?,
            origin_domain: row.try_get("origin_domain")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl SubmissionRow {
    fn into_domain(self) -> Result<Submission, SubmissionError> {
        Ok(Submission {
            id: self.id,
            form: SubmissionForm {
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
                linkedin: self.linkedin,
                role: self.role,
                work_auth_status: self.work_auth_status,
                preferred_location: self.preferred_location,
                availability: self.availability,
                comments: self.comments,
            },
            resume_url: self.resume_url,
            origin_domain: self.origin_domain,
            created_at: parse_timestamp(&self.created_at).map_err(SubmissionError::Decode)?,
            updated_at: parse_timestamp(&self.updated_at).map_err(SubmissionError::Decode)?,
        })
    }
}

/// Errors that can occur while storing or loading submissions.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission origin domain must be set before persisting")]
    MissingOriginDomain,
    #[error("stored timestamp is invalid: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Data required to persist a contact inquiry.
#[derive(Debug, Clone)]
pub struct NewContact {
    /// Identity to store; a UUID is generated when absent.
    pub id: Option<String>,
    pub form: ContactForm,
    pub origin_domain: String,
}

/// Repository responsible for the `contacts` table.
#[derive(Clone)]
pub struct ContactRepository {
    pool: AnyPool,
}

impl ContactRepository {
    /// Inserts a contact inquiry in its own transaction and returns the stored record.
    pub async fn insert(
        &self,
        record: NewContact,
        now: DateTime<Utc>,
    ) -> Result<Contact, ContactError> {
        if record.form.full_name.trim().is_empty() {
            return Err(ContactError::MissingName);
        }

        let id = record
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let form = record.form;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO contacts \
             (id, full_name, company, inquiry_type, email, message, origin_domain, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&id)
        .bind(&form.full_name)
        .bind(&form.company)
        .bind(&form.inquiry_type)
        .bind(&form.email)
        .bind(&form.message)
        .bind(&record.origin_domain)
        .bind(to_rfc3339(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Contact {
            id,
            form,
            origin_domain: record.origin_domain,
            created_at: now,
        })
    }

    /// Loads a contact inquiry by identity.
    pub async fn fetch(&self, id: &str) -> Result<Option<Contact>, ContactError> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT id, full_name, company, inquiry_type, email, message, origin_domain, created_at \
               FROM contacts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ContactRow::into_domain).transpose()
    }
}

#[derive(Debug)]
struct ContactRow {
    id: String,
    full_name: String,
    company: Option<String>,
    inquiry_type: Option<String>,
    email: Option<String>,
    message: Option<String>,
    origin_domain: String,
    created_at: String,
}

impl<'r> FromRow<'r, AnyRow> for ContactRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            company: nullable_text(row, "company")?,
            inquiry_type: nullable_text(row, "inquiry_type")?,
            email: nullable_text(row, "email")?,
            message: nullable_text(row, "message")?,
            origin_domain: row.try_get("origin_domain")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl ContactRow {
    fn into_domain(self) -> Result<Contact, ContactError> {
        Ok(Contact {
            id: self.id,
            form: ContactForm {
                full_name: self.full_name,
                company: self.company,
                inquiry_type: self.inquiry_type,
                email: self.email,
                message: self.message,
            },
            origin_domain: self.origin_domain,
            created_at: parse_timestamp(&self.created_at).map_err(ContactError::Decode)?,
        })
    }
}

/// Errors that can occur while storing or loading contact inquiries.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("contact name is required")]
    MissingName,
    #[error("stored timestamp is invalid: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A NULL reaches the `Any` driver without a column type, which fails the
/// usual `Option<String>` compatibility check, so it is decoded unchecked.
fn nullable_text(row: &AnyRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    row.try_get_unchecked(column)
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("{value:?}: {err}"))
}
