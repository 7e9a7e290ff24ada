use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A translatable string: unique key plus one value per language code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub id: i64,
    pub key: String,
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Lifecycle of a bulk translation job.
///
/// `pending -> processing -> {completed, failed}`; cancellation moves
/// `pending`/`processing` straight to `failed`. Terminal states never
/// transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Per-item accounting for a job. `completed + failed` never exceeds `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    pub job_id: String,
    pub source_language: String,
    pub target_language: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One unit of work inside a job: a record id, its key, and the text to
/// translate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationTask {
    pub id: i64,
    pub key: String,
    pub source_text: String,
}

/// The single work-queue message published per job. Carries the full task
/// snapshot so the worker never re-queries the record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: String,
    pub source_language: String,
    pub target_language: String,
    pub translations: Vec<TranslationTask>,
}

/// Best-effort progress notification published to the status queue after
/// every job-record mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== JobStatus Tests ====================

    #[test]
    fn test_status_as_str_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_parse_unknown() {
        assert_eq!(JobStatus::parse("cancelled"), None);
        assert_eq!(JobStatus::parse(""), None);
        assert_eq!(JobStatus::parse("PENDING"), None);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).expect("serialize");
        assert_eq!(json, "\"processing\"");
    }

    // ==================== Wire Format Tests ====================

    #[test]
    fn test_job_message_wire_format() {
        let msg = JobMessage {
            job_id: "abc-123".to_string(),
            source_language: "pt".to_string(),
            target_language: "en".to_string(),
            translations: vec![TranslationTask {
                id: 7,
                key: "home.title".to_string(),
                source_text: "Bem-vindo".to_string(),
            }],
        };

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["jobId"], "abc-123");
        assert_eq!(json["sourceLanguage"], "pt");
        assert_eq!(json["targetLanguage"], "en");
        assert_eq!(json["translations"][0]["id"], 7);
        assert_eq!(json["translations"][0]["key"], "home.title");
        assert_eq!(json["translations"][0]["sourceText"], "Bem-vindo");
    }

    #[test]
    fn test_job_message_deserializes_camel_case() {
        let raw = r#"{
            "jobId": "j1",
            "sourceLanguage": "pt",
            "targetLanguage": "es",
            "translations": [{"id": 1, "key": "k", "sourceText": "olá"}]
        }"#;

        let msg: JobMessage = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(msg.job_id, "j1");
        assert_eq!(msg.translations.len(), 1);
        assert_eq!(msg.translations[0].source_text, "olá");
    }

    #[test]
    fn test_status_update_wire_format() {
        let update = StatusUpdate {
            job_id: "j1".to_string(),
            status: JobStatus::Processing,
            progress: JobProgress {
                total: 3,
                completed: 1,
                failed: 0,
            },
        };

        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"]["total"], 3);
        assert_eq!(json["progress"]["completed"], 1);
        assert_eq!(json["progress"]["failed"], 0);
    }

    #[test]
    fn test_job_record_wire_format() {
        let job = TranslationJob {
            job_id: "j1".to_string(),
            source_language: "pt".to_string(),
            target_language: "en".to_string(),
            status: JobStatus::Completed,
            progress: JobProgress {
                total: 2,
                completed: 1,
                failed: 1,
            },
            error: Some("1 translations failed".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&job).expect("serialize");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["error"], "1 translations failed");
        assert!(json["createdAt"].is_string());
        assert!(json["updatedAt"].is_string());
    }

    #[test]
    fn test_job_record_omits_absent_error() {
        let job = TranslationJob {
            job_id: "j1".to_string(),
            source_language: "pt".to_string(),
            target_language: "en".to_string(),
            status: JobStatus::Pending,
            progress: JobProgress {
                total: 5,
                completed: 0,
                failed: 0,
            },
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&job).expect("serialize");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_language_defaults_on_deserialize() {
        let lang: Language = serde_json::from_str(r#"{"code": "fr", "name": "Français"}"#)
            .expect("deserialize");
        assert!(!lang.is_default);
        assert!(lang.is_active);
    }
}
