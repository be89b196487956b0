use anyhow::{Context, Result};
use std::path::Path;

use crate::aggregate::analysis_percentage;
use crate::api::{resume_mime, ApiClient};
use crate::error::ApiError;
use crate::models::ParsedResume;

/// Outcome of one pass through the resume pipeline. Steps after the first
/// run even when an earlier one failed; each failure is kept in `notices`.
#[derive(Debug, Default)]
pub struct ResumeReport {
    pub text: String,
    pub saved: bool,
    pub parsed: Option<ParsedResume>,
    pub skills: Vec<String>,
    pub analysis_pct: Option<u32>,
    pub recommendations_refreshed: bool,
    pub notices: Vec<String>,
}

impl ResumeReport {
    fn note(&mut self, step: &str, err: &ApiError) {
        tracing::warn!(step, error = %err, "resume step failed");
        self.notices.push(format!("{}: {}", step, err.user_message()));
    }
}

/// Pasted text: save it, AI-parse it, extract skills, then refresh
/// recommendations if the save went through.
pub fn process_text(client: &ApiClient, text: &str) -> Result<ResumeReport, ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("Please provide resume text".to_string()));
    }
    let mut report = ResumeReport {
        text: text.to_string(),
        ..Default::default()
    };

    match client.save_resume_text(text) {
        Ok(()) => report.saved = true,
        Err(err) => report.note("Save", &err),
    }
    analyze(client, &mut report);
    if report.saved {
        refresh(client, &mut report);
    }
    Ok(report)
}

/// PDF/DOCX file: upload it, then run the same analysis on the text the
/// server extracted. The upload stores the resume, so recommendations are
/// always refreshed afterwards.
pub fn process_file(client: &ApiClient, path: &Path) -> Result<ResumeReport> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Resume path has no file name")?;
    resume_mime(file_name)?;

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read resume file: {}", path.display()))?;
    let text = client
        .upload_resume(file_name, bytes)
        .context("Upload failed")?;

    let mut report = ResumeReport {
        text,
        saved: true,
        ..Default::default()
    };
    if report.text.trim().is_empty() {
        report
            .notices
            .push("Upload: server extracted no text from the file".to_string());
        return Ok(report);
    }
    analyze(client, &mut report);
    refresh(client, &mut report);
    Ok(report)
}

fn analyze(client: &ApiClient, report: &mut ResumeReport) {
    match client.parse_resume(&report.text) {
        Ok(parsed) => {
            if !parsed.skills.is_empty() {
                report.skills = parsed.skills.clone();
            }
            report.parsed = Some(parsed);
        }
        Err(err) => report.note("AI parse", &err),
    }

    match client.extract_skills(&report.text) {
        Ok(skills) => {
            report.analysis_pct = Some(analysis_percentage(skills.len()));
            report.skills = skills;
        }
        Err(err) => report.note("Skill extraction", &err),
    }
}

fn refresh(client: &ApiClient, report: &mut ResumeReport) {
    match client.refresh_recommendations() {
        Ok(_) => report.recommendations_refreshed = true,
        Err(err) => report.note("Recommendations", &err),
    }
}
