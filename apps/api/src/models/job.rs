use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A job application awaiting resume optimization.
pub const STATUS_PENDING_OPTIMIZATION: &str = "pending_optimization";
/// A job application whose resume has been optimized.
pub const STATUS_OPTIMIZED: &str = "optimized";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub client_name: String,
    pub company_name: String,
    pub position: String,
    pub job_description: String,
    pub job_application_link: Option<String>,
    pub status: String,
    pub base_resume: Option<String>,
    pub optimized_resume: Option<String>,
    pub changes_summary: Option<String>,
    pub optimized_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub client_name: String,
    pub company_name: String,
    pub position: String,
    pub job_description: String,
    pub job_application_link: Option<String>,
    pub base_resume: Option<String>,
}

/// Partial update. `status` and the optimization output are deliberately
/// absent: those fields only change through the optimize flow.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateJobRequest {
    pub client_name: Option<String>,
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub job_description: Option<String>,
    pub job_application_link: Option<String>,
    pub base_resume: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_row_serializes_with_snake_case_fields() {
        let row = JobRow {
            id: Uuid::new_v4(),
            client_name: "Ada".to_string(),
            company_name: "Initech".to_string(),
            position: "Engineer".to_string(),
            job_description: "Build things".to_string(),
            job_application_link: None,
            status: STATUS_PENDING_OPTIMIZATION.to_string(),
            base_resume: None,
            optimized_resume: None,
            changes_summary: None,
            optimized_on: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["client_name"], "Ada");
        assert_eq!(value["status"], "pending_optimization");
        assert!(value["optimized_on"].is_null());
    }

    #[test]
    fn test_update_request_accepts_partial_bodies() {
        let req: UpdateJobRequest =
            serde_json::from_str(r#"{"position": "Staff Engineer"}"#).unwrap();
        assert_eq!(req.position.as_deref(), Some("Staff Engineer"));
        assert!(req.client_name.is_none());
        assert!(req.base_resume.is_none());
    }
}
