//! Request and response bodies.
//!
//! Identifiers are canonical 32-character lowercase hex strings, timestamps are RFC 3339 and
//! triage levels are the integers 1 to 5. Enumerations travel as their snake_case names (for
//! example `in_progress`, `clinical_change`).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// One of `validation`, `not_found`, `conflict`, `empty_queue`, `storage`, `unauthorized`.
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VitalSignsDto {
    #[serde(default)]
    pub systolic_bp: Option<u16>,
    #[serde(default)]
    pub diastolic_bp: Option<u16>,
    #[serde(default)]
    pub heart_rate: Option<u16>,
    #[serde(default)]
    pub respiratory_rate: Option<u16>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub oxygen_saturation: Option<u8>,
    #[serde(default)]
    pub gcs_eye: Option<u8>,
    #[serde(default)]
    pub gcs_verbal: Option<u8>,
    #[serde(default)]
    pub gcs_motor: Option<u8>,
    #[serde(default)]
    pub on_oxygen: bool,
    #[serde(default)]
    pub oxygen_device: Option<String>,
    #[serde(default)]
    pub oxygen_flow_lpm: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub measurement_time: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VitalsEvaluationDto {
    pub gcs_total: Option<u8>,
    pub requires_immediate_attention: bool,
    pub failed_thresholds: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RedFlagsDto {
    #[serde(default)]
    pub sepsis: bool,
    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub acute_coronary_syndrome: bool,
    #[serde(default)]
    pub trauma: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateAssessmentReq {
    pub patient_id: String,
    pub department_id: String,
    pub chief_complaint: String,
    pub level: u8,
    #[serde(default)]
    pub priority: u32,
    pub vitals: VitalSignsDto,
    #[serde(default)]
    pub red_flags: RedFlagsDto,
    /// `contact`, `droplet`, `airborne` or `protective`.
    #[serde(default)]
    pub isolation: Option<String>,
    #[serde(default)]
    pub is_pregnant: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompleteAssessmentReq {
    #[serde(default)]
    pub recommended_department_id: Option<String>,
    #[serde(default)]
    pub recommended_doctor_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CancelAssessmentReq {
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpdateAssessmentReq {
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssessmentRes {
    pub id: String,
    pub patient_id: String,
    pub department_id: String,
    pub chief_complaint: String,
    pub level: u8,
    pub priority: u32,
    pub status: String,
    pub arrival_time: String,
    pub triage_start_time: String,
    pub triage_end_time: Option<String>,
    pub is_open: bool,
    pub red_flags: RedFlagsDto,
    pub isolation: Option<String>,
    pub is_pregnant: bool,
    pub vitals: VitalSignsDto,
    pub evaluation: VitalsEvaluationDto,
    pub notes: Option<String>,
    pub recommended_department_id: Option<String>,
    pub recommended_doctor_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub updated_at: String,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListAssessmentsRes {
    pub assessments: Vec<AssessmentRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateReassessmentReq {
    #[serde(default)]
    pub vitals: Option<VitalSignsDto>,
    #[serde(default)]
    pub new_level: Option<u8>,
    #[serde(default)]
    pub changes: Option<String>,
    #[serde(default)]
    pub actions: Option<String>,
    /// `routine`, `clinical_change`, `protocol_driven`, `patient_request`, `staff_concern` or
    /// `other`.
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReassessmentRes {
    pub id: String,
    pub assessment_id: String,
    pub timestamp: String,
    pub previous_level: u8,
    pub new_level: Option<u8>,
    pub changes: Option<String>,
    pub actions: Option<String>,
    pub reason: String,
    pub vitals: Option<VitalSignsDto>,
    pub evaluation: Option<VitalsEvaluationDto>,
    pub recorded_by: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListReassessmentsRes {
    pub reassessments: Vec<ReassessmentRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueEntryRes {
    pub id: String,
    pub assessment_id: String,
    pub patient_id: String,
    pub department_id: String,
    pub level: u8,
    pub priority: u32,
    pub status: String,
    pub enqueue_time: String,
    pub called_time: Option<String>,
    pub completed_time: Option<String>,
    pub sequence: u64,
    pub requires_immediate_attention: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WaitingPatientRes {
    pub entry: QueueEntryRes,
    pub patient_name: Option<String>,
    pub chief_complaint: String,
    pub wait_minutes: i64,
    pub overdue: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WaitingListRes {
    pub department_id: String,
    pub waiting: Vec<WaitingPatientRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueStatsRes {
    pub department_id: String,
    pub window_start: String,
    pub window_end: String,
    pub total_waiting: usize,
    pub total_called: usize,
    pub total_completed: usize,
    pub average_current_wait_minutes: Option<f64>,
    pub average_wait_to_call_minutes: Option<f64>,
    pub overdue_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateProtocolReq {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `cardiac`, `respiratory`, `neuro`, `trauma`, `pediatric` or `general`.
    pub protocol_type: String,
    pub criteria: String,
    #[serde(default)]
    pub required_actions: Option<String>,
    #[serde(default)]
    pub priority_weight: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpdateProtocolReq {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub protocol_type: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub required_actions: Option<String>,
    #[serde(default)]
    pub priority_weight: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProtocolRes {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub protocol_type: String,
    pub criteria: String,
    pub required_actions: Option<String>,
    pub priority_weight: u32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListProtocolsRes {
    pub protocols: Vec<ProtocolRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProtocolSuggestionRes {
    pub protocol: ProtocolRes,
    pub score: u32,
    pub matched_keywords: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SuggestProtocolsRes {
    pub assessment_id: String,
    pub suggestions: Vec<ProtocolSuggestionRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApplyProtocolReq {
    pub protocol_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProtocolApplicationRes {
    pub id: String,
    pub assessment_id: String,
    pub protocol_id: String,
    pub protocol_name: String,
    pub applied_at: String,
    pub applied_by: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListProtocolApplicationsRes {
    pub applications: Vec<ProtocolApplicationRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LevelCountDto {
    pub level: u8,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCountDto {
    pub status: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyStatsRes {
    /// `YYYY-MM-DD`, UTC.
    pub date: String,
    pub department_id: Option<String>,
    pub total_assessments: usize,
    pub by_level: Vec<LevelCountDto>,
    pub by_status: Vec<StatusCountDto>,
    pub average_wait_minutes: Option<f64>,
    pub average_assessment_minutes: Option<f64>,
    pub immediate_attention_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SystemHealthRes {
    pub healthy: bool,
    pub checked_at: String,
    pub critical_waiting: usize,
    pub total_waiting: usize,
    pub average_wait_minutes: Option<f64>,
    pub active_alerts: usize,
    pub issues: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverdueEntryRes {
    pub entry: QueueEntryRes,
    pub wait_minutes: i64,
    pub threshold_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverdueListRes {
    pub overdue: Vec<OverdueEntryRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActiveAlertRes {
    pub entry: QueueEntryRes,
    pub wait_minutes: i64,
    pub overdue: bool,
    pub requires_immediate_attention: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActiveAlertsRes {
    pub alerts: Vec<ActiveAlertRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueOrderRes {
    pub department_id: String,
    pub entries: Vec<QueueEntryRes>,
}
