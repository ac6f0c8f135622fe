use std::{collections::HashMap, time::Instant};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        FromRequest, Multipart, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use bytes::{Bytes, BytesMut};
use intake_core::{
    extract_origin_domain, non_blank, sanitize_filename, ContactForm, OriginHeaders, ResumeFormat,
    SubmissionForm,
};
use intake_storage::{NewContact, NewSubmission};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::notify::NotificationJob;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::telemetry;

const RESUME_FIELD: &str = "resume";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
    pub resume_url: String,
    pub sent_to_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: String,
}

/// `POST /submit`: stores the resume, persists the submission and schedules
/// the recruiter notification.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let start = Instant::now();
    let outcome = process_submission(&state, &headers, multipart).await;
    finish("submit", start, outcome)
}

/// `POST /contact`: persists a contact inquiry sent as multipart or
/// urlencoded form data.
pub async fn contact(State(state): State<AppState>, headers: HeaderMap, request: Request) -> Response {
    let start = Instant::now();
    let outcome = process_contact(&state, &headers, request).await;
    finish("contact", start, outcome)
}

fn finish<T: Serialize>(
    endpoint: &'static str,
    start: Instant,
    outcome: Result<T, ProblemResponse>,
) -> Response {
    let (result, response) = match outcome {
        Ok(body) => (
            telemetry::CREATED,
            (StatusCode::CREATED, Json(body)).into_response(),
        ),
        Err(problem) => (problem.code(), problem.into_response()),
    };
    telemetry::record_request(endpoint, result, start.elapsed());
    response
}

async fn process_submission(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<SubmitResponse, ProblemResponse> {
    let multipart = multipart.map_err(|err| {
        debug!(stage = "intake", error = %err, "submission is not multipart");
        invalid_form()
    })?;
    let mut upload = read_submission(multipart, state.max_upload_bytes()).await?;

    let origin_domain = extract_origin_domain(&origin_headers(headers)).map_err(|err| {
        warn!(stage = "intake", error = %err, "submission origin could not be determined");
        ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "missing_origin",
            "Unable to determine the submitting site",
        )
    })?;

    let form = SubmissionForm {
        full_name: required(&mut upload.fields, "full_name")?,
        email: required(&mut upload.fields, "email")?,
        phone: required(&mut upload.fields, "phone")?,
        linkedin: non_blank(upload.fields.remove("linkedin")),
        role: required(&mut upload.fields, "role")?,
        work_auth_status: required(&mut upload.fields, "work_auth_status")?,
        preferred_location: required(&mut upload.fields, "preferred_location")?,
        availability: required(&mut upload.fields, "availability")?,
        comments: non_blank(upload.fields.remove("comments")),
    };
    let resume = upload.resume.ok_or_else(|| missing_field(RESUME_FIELD))?;

    let stored = match state
        .object_store()
        .upload(resume.payload.clone(), &resume.filename)
        .await
    {
        Ok(stored) => {
            counter!("object_store_uploads_total", "result" => "ok").increment(1);
            stored
        }
        Err(err) => {
            counter!("object_store_uploads_total", "result" => "error").increment(1);
            error!(stage = "objectstore", error = %err, filename = %resume.filename, "resume upload failed");
            return Err(ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_unavailable",
                "The resume could not be stored",
            ));
        }
    };

    let inserted = state
        .storage()
        .submissions()
        .insert(
            NewSubmission {
                id: None,
                form,
                resume_url: stored.locator.clone(),
                origin_domain: origin_domain.clone(),
            },
            state.now(),
        )
        .await;
    let record = match inserted {
        Ok(record) => record,
        Err(err) => {
            error!(stage = "storage", error = %err, "failed to persist submission");
            discard_upload(state, &stored.key).await;
            return Err(persistence_failed());
        }
    };

    let sent_to_email = state
        .recipients()
        .recipient_for(&origin_domain)
        .map(str::to_string);
    info!(
        stage = "intake",
        submission_id = %record.id,
        origin_domain = %origin_domain,
        format = resume.format.as_str(),
        recipient = sent_to_email.as_deref().unwrap_or("<none>"),
        "submission stored"
    );

    let id = record.id.clone();
    let _ = state.notifications().enqueue(NotificationJob::Submission {
        record,
        filename: resume.filename,
        payload: resume.payload,
    });

    Ok(SubmitResponse {
        id,
        resume_url: stored.locator,
        sent_to_email,
    })
}

/// Removes a resume whose submission could not be saved.
async fn discard_upload(state: &AppState, key: &str) {
    match state.object_store().delete(key).await {
        Ok(()) => {
            counter!("object_store_cleanups_total", "result" => "ok").increment(1);
            info!(stage = "objectstore", key, "removed resume of unsaved submission");
        }
        Err(err) => {
            counter!("object_store_cleanups_total", "result" => "error").increment(1);
            error!(stage = "objectstore", error = %err, key, "failed to remove resume of unsaved submission");
        }
    }
}

async fn process_contact(
    state: &AppState,
    headers: &HeaderMap,
    request: Request,
) -> Result<ContactResponse, ProblemResponse> {
    let mut fields = read_contact_fields(state, headers, request).await?;

    let form = ContactForm {
        full_name: required(&mut fields, "full_name")?,
        company: non_blank(fields.remove("company")),
        inquiry_type: non_blank(fields.remove("inquiry_type")),
        email: non_blank(fields.remove("email")),
        message: non_blank(fields.remove("message")),
    };

    let origin_domain = match extract_origin_domain(&origin_headers(headers)) {
        Ok(domain) => domain,
        Err(err) => {
            debug!(stage = "intake", error = %err, "contact origin unknown, continuing without it");
            String::new()
        }
    };

    let record = state
        .storage()
        .contacts()
        .insert(
            NewContact {
                id: None,
                form,
                origin_domain: origin_domain.clone(),
            },
            state.now(),
        )
        .await
        .map_err(|err| {
            error!(stage = "storage", error = %err, "failed to persist contact inquiry");
            persistence_failed()
        })?;

    info!(
        stage = "intake",
        contact_id = %record.id,
        origin_domain = %origin_domain,
        "contact inquiry stored"
    );

    let id = record.id.clone();
    let _ = state
        .notifications()
        .enqueue(NotificationJob::Contact { record });

    Ok(ContactResponse { id })
}

#[derive(Default)]
struct SubmissionUpload {
    fields: HashMap<String, String>,
    resume: Option<ResumeUpload>,
}

struct ResumeUpload {
    filename: String,
    format: ResumeFormat,
    payload: Bytes,
}

/// Collects text fields and the resume, rejecting unsupported resume types
/// before any of their bytes are read and stopping once `limit` is exceeded.
async fn read_submission(
    mut multipart: Multipart,
    limit: usize,
) -> Result<SubmissionUpload, ProblemResponse> {
    let mut upload = SubmissionUpload::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_problem)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name != RESUME_FIELD {
            let value = field.text().await.map_err(multipart_problem)?;
            upload.fields.insert(name, value);
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default()).to_string();
        let format = ResumeFormat::from_filename(&filename).map_err(|err| {
            info!(stage = "intake", error = %err, "resume rejected");
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "unsupported_file_type",
                "Only PDF and DOCX resumes are accepted",
            )
        })?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_problem)? {
            if buffer.len() + chunk.len() > limit {
                return Err(payload_too_large());
            }
            buffer.extend_from_slice(&chunk);
        }
        upload.resume = Some(ResumeUpload {
            filename,
            format,
            payload: buffer.freeze(),
        });
    }

    Ok(upload)
}

async fn read_contact_fields(
    state: &AppState,
    headers: &HeaderMap,
    request: Request,
) -> Result<HashMap<String, String>, ProblemResponse> {
    if !is_multipart(headers) {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, state)
            .await
            .map_err(|err| {
                debug!(stage = "intake", error = %err, "contact form rejected");
                invalid_form()
            })?;
        return Ok(fields);
    }

    let mut multipart = Multipart::from_request(request, state).await.map_err(|err| {
        debug!(stage = "intake", error = %err, "contact multipart rejected");
        invalid_form()
    })?;
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_problem)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        // Contact forms carry no files; ignore any that are sent.
        if field.file_name().is_some() {
            continue;
        }
        let value = field.text().await.map_err(multipart_problem)?;
        fields.insert(name, value);
    }
    Ok(fields)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

fn origin_headers(headers: &HeaderMap) -> OriginHeaders<'_> {
    let value = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    OriginHeaders {
        origin: value(header::ORIGIN.as_str()),
        referer: value(header::REFERER.as_str()),
        forwarded_host: value("x-forwarded-host"),
        host: value(header::HOST.as_str()),
    }
}

fn required(
    fields: &mut HashMap<String, String>,
    name: &'static str,
) -> Result<String, ProblemResponse> {
    non_blank(fields.remove(name)).ok_or_else(|| missing_field(name))
}

fn missing_field(name: &str) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::UNPROCESSABLE_ENTITY,
        "missing_field",
        format!("Missing required field: {name}"),
    )
}

fn multipart_problem(err: MultipartError) -> ProblemResponse {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return payload_too_large();
    }
    debug!(stage = "intake", error = %err, "malformed multipart body");
    invalid_form()
}

fn invalid_form() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::BAD_REQUEST,
        "invalid_form",
        "The request body is not a valid form",
    )
}

fn payload_too_large() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "payload_too_large",
        "The uploaded resume exceeds the size limit",
    )
}

fn persistence_failed() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "persistence_failed",
        "The submission could not be saved",
    )
}
