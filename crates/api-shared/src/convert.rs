//! Conversions between wire types and `triage-core` records.
//!
//! Enumerations are mapped through their serde names so the wire spelling always matches the
//! journal spelling.

use crate::dto::*;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use triage_core::{
    ActiveAlert, Assessment, AssessmentUpdate, DailyStats, NewAssessment, NewProtocol,
    NewReassessment, OverdueEntry, Protocol, ProtocolApplication, ProtocolSuggestion,
    ProtocolUpdate, QueueEntry, QueueStats, Reassessment, RecordId, RedFlags, SystemHealth,
    TriageLevel, VitalSigns, VitalsEvaluation, WaitingPatient,
};

#[derive(Debug, thiserror::Error)]
pub enum DtoError {
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

pub type DtoResult<T> = std::result::Result<T, DtoError>;

fn invalid(field: &'static str, message: impl ToString) -> DtoError {
    DtoError::InvalidField {
        field,
        message: message.to_string(),
    }
}

pub fn parse_id(field: &'static str, input: &str) -> DtoResult<RecordId> {
    RecordId::parse(input).map_err(|e| invalid(field, e))
}

fn parse_optional_id(field: &'static str, input: Option<&str>) -> DtoResult<Option<RecordId>> {
    input.map(|s| parse_id(field, s)).transpose()
}

pub fn parse_time(field: &'static str, input: &str) -> DtoResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| invalid(field, e))
}

pub fn parse_date(field: &'static str, input: &str) -> DtoResult<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|e| invalid(field, e))
}

pub fn parse_level(field: &'static str, level: u8) -> DtoResult<TriageLevel> {
    TriageLevel::try_from(level).map_err(|e| invalid(field, e))
}

/// Parse a snake_case enumeration name (e.g. `clinical_change`).
pub fn parse_enum<T: DeserializeOwned>(field: &'static str, input: &str) -> DtoResult<T> {
    serde_json::from_value(serde_json::Value::String(input.to_string()))
        .map_err(|_| invalid(field, format!("unknown value '{input}'")))
}

pub fn enum_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn format_optional_time(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format_time)
}

impl TryFrom<VitalSignsDto> for VitalSigns {
    type Error = DtoError;

    fn try_from(dto: VitalSignsDto) -> DtoResult<Self> {
        Ok(Self {
            systolic_bp: dto.systolic_bp,
            diastolic_bp: dto.diastolic_bp,
            heart_rate: dto.heart_rate,
            respiratory_rate: dto.respiratory_rate,
            temperature_c: dto.temperature_c,
            oxygen_saturation: dto.oxygen_saturation,
            gcs_eye: dto.gcs_eye,
            gcs_verbal: dto.gcs_verbal,
            gcs_motor: dto.gcs_motor,
            on_oxygen: dto.on_oxygen,
            oxygen_device: dto
                .oxygen_device
                .as_deref()
                .map(|d| parse_enum("vitals.oxygen_device", d))
                .transpose()?,
            oxygen_flow_lpm: dto.oxygen_flow_lpm,
            notes: dto.notes,
            measurement_time: parse_time("vitals.measurement_time", &dto.measurement_time)?,
        })
    }
}

impl From<&VitalSigns> for VitalSignsDto {
    fn from(v: &VitalSigns) -> Self {
        Self {
            systolic_bp: v.systolic_bp,
            diastolic_bp: v.diastolic_bp,
            heart_rate: v.heart_rate,
            respiratory_rate: v.respiratory_rate,
            temperature_c: v.temperature_c,
            oxygen_saturation: v.oxygen_saturation,
            gcs_eye: v.gcs_eye,
            gcs_verbal: v.gcs_verbal,
            gcs_motor: v.gcs_motor,
            on_oxygen: v.on_oxygen,
            oxygen_device: v.oxygen_device.as_ref().map(enum_name),
            oxygen_flow_lpm: v.oxygen_flow_lpm,
            notes: v.notes.clone(),
            measurement_time: format_time(v.measurement_time),
        }
    }
}

impl From<&VitalsEvaluation> for VitalsEvaluationDto {
    fn from(e: &VitalsEvaluation) -> Self {
        Self {
            gcs_total: e.gcs_total,
            requires_immediate_attention: e.requires_immediate_attention,
            failed_thresholds: e.failed_thresholds.iter().map(enum_name).collect(),
        }
    }
}

impl From<RedFlagsDto> for RedFlags {
    fn from(f: RedFlagsDto) -> Self {
        Self {
            sepsis: f.sepsis,
            stroke: f.stroke,
            acute_coronary_syndrome: f.acute_coronary_syndrome,
            trauma: f.trauma,
        }
    }
}

impl From<RedFlags> for RedFlagsDto {
    fn from(f: RedFlags) -> Self {
        Self {
            sepsis: f.sepsis,
            stroke: f.stroke,
            acute_coronary_syndrome: f.acute_coronary_syndrome,
            trauma: f.trauma,
        }
    }
}

impl TryFrom<CreateAssessmentReq> for NewAssessment {
    type Error = DtoError;

    fn try_from(req: CreateAssessmentReq) -> DtoResult<Self> {
        Ok(Self {
            patient_id: parse_id("patient_id", &req.patient_id)?,
            department_id: parse_id("department_id", &req.department_id)?,
            chief_complaint: req.chief_complaint,
            level: parse_level("level", req.level)?,
            priority: req.priority,
            vitals: req.vitals.try_into()?,
            red_flags: req.red_flags.into(),
            isolation: req
                .isolation
                .as_deref()
                .map(|i| parse_enum("isolation", i))
                .transpose()?,
            is_pregnant: req.is_pregnant,
            notes: req.notes,
        })
    }
}

impl TryFrom<UpdateAssessmentReq> for AssessmentUpdate {
    type Error = DtoError;

    fn try_from(req: UpdateAssessmentReq) -> DtoResult<Self> {
        Ok(Self {
            level: req.level.map(|l| parse_level("level", l)).transpose()?,
            priority: req.priority,
            notes: req.notes,
            expected_version: req.expected_version,
        })
    }
}

/// Recommendation ids of a completion request.
pub fn parse_completion(
    req: &CompleteAssessmentReq,
) -> DtoResult<(Option<RecordId>, Option<RecordId>)> {
    Ok((
        parse_optional_id(
            "recommended_department_id",
            req.recommended_department_id.as_deref(),
        )?,
        parse_optional_id("recommended_doctor_id", req.recommended_doctor_id.as_deref())?,
    ))
}

impl From<&Assessment> for AssessmentRes {
    fn from(a: &Assessment) -> Self {
        Self {
            id: a.id.to_string(),
            patient_id: a.patient_id.to_string(),
            department_id: a.department_id.to_string(),
            chief_complaint: a.chief_complaint.to_string(),
            level: a.level.ordinal(),
            priority: a.priority,
            status: enum_name(&a.status),
            arrival_time: format_time(a.arrival_time),
            triage_start_time: format_time(a.triage_start_time),
            triage_end_time: format_optional_time(a.triage_end_time),
            is_open: a.is_open,
            red_flags: a.red_flags.into(),
            isolation: a.isolation.as_ref().map(enum_name),
            is_pregnant: a.is_pregnant,
            vitals: (&a.vitals).into(),
            evaluation: (&a.evaluation).into(),
            notes: a.notes.clone(),
            recommended_department_id: a.recommended_department_id.map(|id| id.to_string()),
            recommended_doctor_id: a.recommended_doctor_id.map(|id| id.to_string()),
            cancellation_reason: a.cancellation_reason.clone(),
            created_by: a.created_by.clone(),
            updated_by: a.updated_by.clone(),
            updated_at: format_time(a.updated_at),
            version: a.version,
        }
    }
}

impl TryFrom<CreateReassessmentReq> for NewReassessment {
    type Error = DtoError;

    fn try_from(req: CreateReassessmentReq) -> DtoResult<Self> {
        Ok(Self {
            vitals: req.vitals.map(VitalSigns::try_from).transpose()?,
            new_level: req
                .new_level
                .map(|l| parse_level("new_level", l))
                .transpose()?,
            changes: req.changes,
            actions: req.actions,
            reason: parse_enum("reason", &req.reason)?,
        })
    }
}

impl From<&Reassessment> for ReassessmentRes {
    fn from(r: &Reassessment) -> Self {
        Self {
            id: r.id.to_string(),
            assessment_id: r.assessment_id.to_string(),
            timestamp: format_time(r.timestamp()),
            previous_level: r.previous_level.ordinal(),
            new_level: r.new_level.map(TriageLevel::ordinal),
            changes: r.changes.clone(),
            actions: r.actions.clone(),
            reason: enum_name(&r.reason),
            vitals: r.vitals.as_ref().map(VitalSignsDto::from),
            evaluation: r.evaluation.as_ref().map(VitalsEvaluationDto::from),
            recorded_by: r.recorded_by.clone(),
        }
    }
}

impl From<&QueueEntry> for QueueEntryRes {
    fn from(e: &QueueEntry) -> Self {
        Self {
            id: e.id.to_string(),
            assessment_id: e.assessment_id.to_string(),
            patient_id: e.patient_id.to_string(),
            department_id: e.department_id.to_string(),
            level: e.level.ordinal(),
            priority: e.priority,
            status: enum_name(&e.status),
            enqueue_time: format_time(e.enqueue_time),
            called_time: format_optional_time(e.called_time),
            completed_time: format_optional_time(e.completed_time),
            sequence: e.sequence,
            requires_immediate_attention: e.requires_immediate_attention,
        }
    }
}

impl From<&WaitingPatient> for WaitingPatientRes {
    fn from(w: &WaitingPatient) -> Self {
        Self {
            entry: (&w.entry).into(),
            patient_name: w.patient_name.clone(),
            chief_complaint: w.chief_complaint.clone(),
            wait_minutes: w.wait_minutes,
            overdue: w.overdue,
        }
    }
}

impl From<&QueueStats> for QueueStatsRes {
    fn from(s: &QueueStats) -> Self {
        Self {
            department_id: s.department_id.to_string(),
            window_start: format_time(s.window.start),
            window_end: format_time(s.window.end),
            total_waiting: s.total_waiting,
            total_called: s.total_called,
            total_completed: s.total_completed,
            average_current_wait_minutes: s.average_current_wait_minutes,
            average_wait_to_call_minutes: s.average_wait_to_call_minutes,
            overdue_count: s.overdue_count,
        }
    }
}

impl TryFrom<CreateProtocolReq> for NewProtocol {
    type Error = DtoError;

    fn try_from(req: CreateProtocolReq) -> DtoResult<Self> {
        Ok(Self {
            name: req.name,
            description: req.description,
            protocol_type: parse_enum("protocol_type", &req.protocol_type)?,
            criteria: req.criteria,
            required_actions: req.required_actions,
            priority_weight: req.priority_weight,
        })
    }
}

impl TryFrom<UpdateProtocolReq> for ProtocolUpdate {
    type Error = DtoError;

    fn try_from(req: UpdateProtocolReq) -> DtoResult<Self> {
        Ok(Self {
            name: req.name,
            description: req.description,
            protocol_type: req
                .protocol_type
                .as_deref()
                .map(|t| parse_enum("protocol_type", t))
                .transpose()?,
            criteria: req.criteria,
            required_actions: req.required_actions,
            priority_weight: req.priority_weight,
            is_active: req.is_active,
        })
    }
}

impl From<&Protocol> for ProtocolRes {
    fn from(p: &Protocol) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.to_string(),
            description: p.description.clone(),
            protocol_type: enum_name(&p.protocol_type),
            criteria: p.criteria.to_string(),
            required_actions: p.required_actions.clone(),
            priority_weight: p.priority_weight,
            is_active: p.is_active,
            created_at: format_time(p.created_at),
            updated_at: format_time(p.updated_at),
        }
    }
}

impl From<&ProtocolSuggestion> for ProtocolSuggestionRes {
    fn from(s: &ProtocolSuggestion) -> Self {
        Self {
            protocol: (&s.protocol).into(),
            score: s.score,
            matched_keywords: s.matched_keywords.clone(),
        }
    }
}

impl From<&ProtocolApplication> for ProtocolApplicationRes {
    fn from(a: &ProtocolApplication) -> Self {
        Self {
            id: a.id.to_string(),
            assessment_id: a.assessment_id.to_string(),
            protocol_id: a.protocol_id.to_string(),
            protocol_name: a.protocol_name.clone(),
            applied_at: format_time(a.applied_at),
            applied_by: a.applied_by.clone(),
        }
    }
}

impl From<&DailyStats> for DailyStatsRes {
    fn from(s: &DailyStats) -> Self {
        Self {
            date: s.date.format("%Y-%m-%d").to_string(),
            department_id: s.department_id.map(|id| id.to_string()),
            total_assessments: s.total_assessments,
            by_level: s
                .by_level
                .iter()
                .map(|c| LevelCountDto {
                    level: c.level.ordinal(),
                    count: c.count,
                })
                .collect(),
            by_status: s
                .by_status
                .iter()
                .map(|c| StatusCountDto {
                    status: enum_name(&c.status),
                    count: c.count,
                })
                .collect(),
            average_wait_minutes: s.average_wait_minutes,
            average_assessment_minutes: s.average_assessment_minutes,
            immediate_attention_count: s.immediate_attention_count,
        }
    }
}

impl From<&SystemHealth> for SystemHealthRes {
    fn from(h: &SystemHealth) -> Self {
        Self {
            healthy: h.healthy,
            checked_at: format_time(h.checked_at),
            critical_waiting: h.critical_waiting,
            total_waiting: h.total_waiting,
            average_wait_minutes: h.average_wait_minutes,
            active_alerts: h.active_alerts,
            issues: h.issues.clone(),
        }
    }
}

impl From<&OverdueEntry> for OverdueEntryRes {
    fn from(o: &OverdueEntry) -> Self {
        Self {
            entry: (&o.entry).into(),
            wait_minutes: o.wait_minutes,
            threshold_minutes: o.threshold_minutes,
        }
    }
}

impl From<&ActiveAlert> for ActiveAlertRes {
    fn from(a: &ActiveAlert) -> Self {
        Self {
            entry: (&a.entry).into(),
            wait_minutes: a.wait_minutes,
            overdue: a.overdue,
            requires_immediate_attention: a.requires_immediate_attention,
        }
    }
}
