use intake_core::{Contact, Submission};

const MISSING: &str = "Not provided";

pub fn submission_subject(submission: &Submission) -> String {
    format!("New Career Submission - {}", submission.form.full_name)
}

pub fn contact_subject(contact: &Contact) -> String {
    format!("New Contact Inquiry - {}", contact.form.full_name)
}

/// Renders every submission field as an HTML table.
pub fn submission_html(submission: &Submission) -> String {
    let form = &submission.form;
    let linkedin = match form.linkedin.as_deref() {
        Some(url) => link(url, url),
        None => escape(MISSING),
    };
    let rows = [
        row("Full Name", &escape(&form.full_name)),
        row("Email", &escape(&form.email)),
        row("Phone", &escape(&form.phone)),
        row("LinkedIn", &linkedin),
        row("Role", &escape(&form.role)),
        row("Work Authorization", &escape(&form.work_auth_status)),
        row("Preferred Location", &escape(&form.preferred_location)),
        row("Availability", &escape(&form.availability)),
        row("Comments", &optional(form.comments.as_deref())),
        row("Origin Domain", &escape(&submission.origin_domain)),
        row("Resume Link", &link(&submission.resume_url, "Download Resume")),
    ];
    document("New Candidate Submission", &rows)
}

/// Renders every contact field as an HTML table.
pub fn contact_html(contact: &Contact, domain: &str) -> String {
    let form = &contact.form;
    let domain = if domain.is_empty() { MISSING } else { domain };
    let rows = [
        row("Full Name", &escape(&form.full_name)),
        row("Company", &optional(form.company.as_deref())),
        row("Inquiry Type", &optional(form.inquiry_type.as_deref())),
        row("Email", &optional(form.email.as_deref())),
        row("Message", &optional(form.message.as_deref())),
        row("Origin Domain", &escape(domain)),
        row("Received At", &escape(&contact.created_at.to_rfc3339())),
    ];
    document("New Contact Inquiry", &rows)
}

fn document(title: &str, rows: &[String]) -> String {
    let mut html = String::from("<html>\n<body>\n");
    html.push_str(&format!("<h2>{}</h2>\n", escape(title)));
    html.push_str(
        "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse: collapse;\">\n",
    );
    for row in rows {
        html.push_str(row);
        html.push('\n');
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn row(label: &str, value_html: &str) -> String {
    format!("<tr><th>{label}</th><td>{value_html}</td></tr>")
}

fn optional(value: Option<&str>) -> String {
    escape(value.unwrap_or(MISSING))
}

fn link(href: &str, text: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape(href), escape(text))
}

/// Escapes text for inclusion in HTML element content or quoted attributes.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use intake_core::{ContactForm, SubmissionForm};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn submission_table_lists_every_field() {
        let submission = Submission {
            id: "s-1".to_string(),
            form: SubmissionForm {
                full_name: "Jane <Doe>".to_string(),
                email: "jane@x.com".to_string(),
                phone: "+91-9876543210".to_string(),
                linkedin: None,
                role: "Backend Developer".to_string(),
                work_auth_status: "Citizen".to_string(),
                preferred_location: "Hyderabad".to_string(),
                availability: "Immediate".to_string(),
                comments: Some("Open to remote & hybrid".to_string()),
            },
            resume_url: "http://minio:9000/resumes/resumes/abc_cv.pdf".to_string(),
            origin_domain: "kgktechnologies.com".to_string(),
            created_at: now(),
            updated_at: now(),
        };

        let html = submission_html(&submission);
        assert!(html.contains("<tr><th>Full Name</th><td>Jane &lt;Doe&gt;</td></tr>"));
        assert!(html.contains("<tr><th>LinkedIn</th><td>Not provided</td></tr>"));
        assert!(html.contains("Open to remote &amp; hybrid"));
        assert!(html.contains(
            "<a href=\"http://minio:9000/resumes/resumes/abc_cv.pdf\">Download Resume</a>"
        ));
        assert_eq!(submission_subject(&submission), "New Career Submission - Jane <Doe>");
    }

    #[test]
    fn contact_table_marks_missing_values() {
        let contact = Contact {
            id: "c-1".to_string(),
            form: ContactForm {
                full_name: "Sam Lee".to_string(),
                company: None,
                inquiry_type: Some("Partnership".to_string()),
                email: None,
                message: Some("Let's talk".to_string()),
            },
            origin_domain: String::new(),
            created_at: now(),
        };

        let html = contact_html(&contact, "");
        assert!(html.contains("<tr><th>Company</th><td>Not provided</td></tr>"));
        assert!(html.contains("<tr><th>Inquiry Type</th><td>Partnership</td></tr>"));
        assert!(html.contains("Let&#39;s talk"));
        assert!(html.contains("<tr><th>Origin Domain</th><td>Not provided</td></tr>"));
        assert_eq!(contact_subject(&contact), "New Contact Inquiry - Sam Lee");
    }
}
