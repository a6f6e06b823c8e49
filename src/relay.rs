use axum::{response::IntoResponse, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const KNOWN_ERROR_MESSAGES: [&str; 3] = ["account_not_connected", "token_expired", "no_media"];
const MAX_MESSAGE_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayChannel {
    #[default]
    Instagram,
    FacebookPage,
}

impl RelayChannel {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("facebook_page") => RelayChannel::FacebookPage,
            _ => RelayChannel::Instagram,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Scheduled,
    Published,
    Failed,
}

/// One job as reported by whatever relay (webhook, automation tool) ran it.
/// Fields are kept as raw JSON so one oddly typed value never rejects the
/// batch: a flag counts only when it is literally `true`, text only when it
/// is a string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayJob {
    pub channel: Option<Value>,
    #[serde(alias = "jobId")]
    pub job_id: Option<Value>,
    pub status: Option<Value>,
    pub success: Option<Value>,
    pub published: Option<Value>,
    pub scheduled: Option<Value>,
    pub error: Option<Value>,
    pub message: Option<Value>,
}

fn is_true(value: &Option<Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn as_text(value: &Option<Value>) -> Option<&str> {
    value.as_ref().and_then(Value::as_str)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResult {
    pub channel: RelayChannel,
    pub job_id: String,
    pub status: RelayStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayReport {
    pub ok: bool,
    pub results: Vec<RelayResult>,
}

impl RelayJob {
    fn resolve_status(&self) -> RelayStatus {
        match as_text(&self.status) {
            Some("scheduled") => return RelayStatus::Scheduled,
            Some("published") => return RelayStatus::Published,
            Some("failed") => return RelayStatus::Failed,
            _ => {}
        }

        if is_true(&self.published) {
            RelayStatus::Published
        } else if is_true(&self.scheduled) || is_true(&self.success) {
            RelayStatus::Scheduled
        } else {
            RelayStatus::Failed
        }
    }

    fn job_id(&self) -> String {
        match &self.job_id {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn normalize(&self) -> RelayResult {
        let status = self.resolve_status();
        let message = match status {
            RelayStatus::Published => "published".to_string(),
            RelayStatus::Scheduled => "scheduled".to_string(),
            RelayStatus::Failed => {
                normalize_error_message(as_text(&self.error).or(as_text(&self.message)))
            }
        };

        RelayResult {
            channel: RelayChannel::parse(as_text(&self.channel)),
            job_id: self.job_id(),
            status,
            message,
        }
    }
}

/// `"Token Expired "` -> `"token_expired"`; unknown text is kept but capped.
pub fn normalize_error_message(value: Option<&str>) -> String {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return "unknown_error".to_string();
    };

    let normalized = value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    if KNOWN_ERROR_MESSAGES.contains(&normalized.as_str()) {
        return normalized;
    }

    let capped: String = normalized.chars().take(MAX_MESSAGE_CHARS).collect();
    if capped.is_empty() {
        "unknown_error".to_string()
    } else {
        capped
    }
}

pub fn format_jobs(jobs: &[RelayJob]) -> RelayReport {
    let results: Vec<RelayResult> = jobs.iter().map(RelayJob::normalize).collect();
    let ok = results
        .iter()
        .any(|r| matches!(r.status, RelayStatus::Scheduled | RelayStatus::Published));

    RelayReport { ok, results }
}

/// Accepts either a bare job array or `{ "jobs": [...] }`. A body that is
/// neither is reported as zero jobs rather than rejected. Each element is read
/// on its own; one that is not an object becomes an empty (failed) job.
pub fn parse_jobs(body: &[u8]) -> Vec<RelayJob> {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("Unreadable relay payload: {}", e);
            return Vec::new();
        }
    };

    let jobs = match payload {
        Value::Array(jobs) => jobs,
        Value::Object(mut wrapper) => match wrapper.remove("jobs") {
            Some(Value::Array(jobs)) => jobs,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    jobs.into_iter()
        .map(|job| {
            serde_json::from_value(job).unwrap_or_else(|e| {
                debug!("Unreadable relay job: {}", e);
                RelayJob::default()
            })
        })
        .collect()
}

pub async fn format_handler(body: Bytes) -> impl IntoResponse {
    let jobs = parse_jobs(&body);
    debug!("Formatting {} relay jobs", jobs.len());
    Json(format_jobs(&jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(value: Value) -> RelayJob {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn failed_token_expired() {
        let result = job(json!({
            "channel": "facebook_page",
            "job_id": "j-1",
            "status": "failed",
            "error": "TOKEN_EXPIRED"
        }))
        .normalize();

        assert_eq!(result.status, RelayStatus::Failed);
        assert_eq!(result.message, "token_expired");
        assert_eq!(result.channel, RelayChannel::FacebookPage);
        assert_eq!(result.job_id, "j-1");
    }

    #[test]
    fn zero_jobs_is_not_ok() {
        let report = format_jobs(&parse_jobs(b"[]"));
        assert_eq!(
            report,
            RelayReport {
                ok: false,
                results: vec![]
            }
        );

        assert!(parse_jobs(b"{}").is_empty());
        assert!(parse_jobs(b"not json").is_empty());
        assert!(parse_jobs(b"").is_empty());
    }

    #[test]
    fn status_from_flags() {
        assert_eq!(
            job(json!({"published": true, "scheduled": true})).resolve_status(),
            RelayStatus::Published
        );
        assert_eq!(
            job(json!({"success": true})).resolve_status(),
            RelayStatus::Scheduled
        );
        assert_eq!(
            job(json!({"status": "queued"})).resolve_status(),
            RelayStatus::Failed
        );
        assert_eq!(
            job(json!({"status": "published", "success": false})).resolve_status(),
            RelayStatus::Published
        );
    }

    #[test]
    fn ill_typed_job_does_not_drop_the_batch() {
        let report = format_jobs(&parse_jobs(
            br#"[{"job_id":"1","published":true},{"job_id":"2","success":"true"}]"#,
        ));
        assert!(report.ok);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].status, RelayStatus::Published);
        assert_eq!(report.results[1].job_id, "2");
        assert_eq!(report.results[1].status, RelayStatus::Failed);
        assert_eq!(report.results[1].message, "unknown_error");

        let report = format_jobs(&parse_jobs(
            br#"{"jobs":[{"status":1,"error":{"code":190}},7,{"scheduled":true}]}"#,
        ));
        assert!(report.ok);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].status, RelayStatus::Failed);
        assert_eq!(report.results[0].message, "unknown_error");
        assert_eq!(report.results[1].status, RelayStatus::Failed);
        assert_eq!(report.results[2].status, RelayStatus::Scheduled);
    }

    #[test]
    fn channel_defaults_to_instagram() {
        let result = job(json!({"channel": "tiktok", "scheduled": true})).normalize();
        assert_eq!(result.channel, RelayChannel::Instagram);
        assert_eq!(result.message, "scheduled");
    }

    #[test]
    fn numeric_and_camel_case_job_ids() {
        assert_eq!(job(json!({"job_id": 42})).normalize().job_id, "42");
        assert_eq!(job(json!({"jobId": "abc"})).normalize().job_id, "abc");
        assert_eq!(job(json!({})).normalize().job_id, "");
    }

    #[test]
    fn error_message_normalization() {
        assert_eq!(normalize_error_message(None), "unknown_error");
        assert_eq!(normalize_error_message(Some("")), "unknown_error");
        assert_eq!(normalize_error_message(Some("   ")), "unknown_error");
        assert_eq!(
            normalize_error_message(Some("  No   Media ")),
            "no_media"
        );
        assert_eq!(
            normalize_error_message(Some("Rate limit hit")),
            "rate_limit_hit"
        );

        let long = "x".repeat(200);
        assert_eq!(normalize_error_message(Some(&long)).len(), 80);
    }

    #[test]
    fn message_used_when_error_absent() {
        let result = job(json!({"status": "failed", "message": "Account not connected"})).normalize();
        assert_eq!(result.message, "account_not_connected");
    }

    #[test]
    fn ok_when_any_job_succeeds() {
        let jobs = parse_jobs(
            json!({"jobs": [
                {"job_id": "1", "status": "failed", "error": "no_media"},
                {"job_id": "2", "published": true}
            ]})
            .to_string()
            .as_bytes(),
        );
        let report = format_jobs(&jobs);
        assert!(report.ok);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[1].status, RelayStatus::Published);
    }
}
