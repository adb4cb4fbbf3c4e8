//! Vital-signs snapshot, physiologic bounds checks and the immediate-attention evaluator.
//!
//! [`evaluate`] is a pure function of the snapshot. It is run when an assessment is created and
//! again for every reassessment that carries vitals, so deterioration is visible even when the
//! clinician does not revisit the triage level. The result is advisory: nothing here changes a
//! level.

use crate::error::{TriageError, TriageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Oxygen delivery device in use when the snapshot was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OxygenDevice {
    NasalCannula,
    SimpleMask,
    VenturiMask,
    NonRebreatherMask,
    HighFlowNasal,
    Other,
}

/// One set of observations. Every measurement is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub systolic_bp: Option<u16>,
    pub diastolic_bp: Option<u16>,
    pub heart_rate: Option<u16>,
    pub respiratory_rate: Option<u16>,
    pub temperature_c: Option<f64>,
    pub oxygen_saturation: Option<u8>,
    pub gcs_eye: Option<u8>,
    pub gcs_verbal: Option<u8>,
    pub gcs_motor: Option<u8>,
    #[serde(default)]
    pub on_oxygen: bool,
    pub oxygen_device: Option<OxygenDevice>,
    pub oxygen_flow_lpm: Option<f64>,
    pub notes: Option<String>,
    pub measurement_time: DateTime<Utc>,
}

impl VitalSigns {
    /// An empty snapshot taken at `measurement_time`.
    pub fn empty(measurement_time: DateTime<Utc>) -> Self {
        Self {
            systolic_bp: None,
            diastolic_bp: None,
            heart_rate: None,
            respiratory_rate: None,
            temperature_c: None,
            oxygen_saturation: None,
            gcs_eye: None,
            gcs_verbal: None,
            gcs_motor: None,
            on_oxygen: false,
            oxygen_device: None,
            oxygen_flow_lpm: None,
            notes: None,
            measurement_time,
        }
    }

    /// Sum of the three GCS components, only when all three are present.
    pub fn gcs_total(&self) -> Option<u8> {
        match (self.gcs_eye, self.gcs_verbal, self.gcs_motor) {
            (Some(e), Some(v), Some(m)) => Some(e + v + m),
            _ => None,
        }
    }
}

/// A named threshold that a snapshot failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBreach {
    /// SpO2 below 90 %.
    Hypoxaemia,
    /// Heart rate above 120.
    Tachycardia,
    /// Heart rate below 50.
    Bradycardia,
    /// Systolic pressure below 90.
    Hypotension,
    /// Temperature above 39 °C.
    Hyperthermia,
    /// Temperature below 35 °C.
    Hypothermia,
    /// Respiratory rate above 30.
    Tachypnoea,
    /// Respiratory rate below 10.
    Bradypnoea,
    /// GCS total below 8.
    DepressedConsciousness,
}

/// Derived state computed from a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalsEvaluation {
    pub gcs_total: Option<u8>,
    pub requires_immediate_attention: bool,
    pub failed_thresholds: Vec<ThresholdBreach>,
}

/// Evaluate a snapshot against the immediate-attention thresholds.
pub fn evaluate(vitals: &VitalSigns) -> VitalsEvaluation {
    let gcs_total = vitals.gcs_total();
    let mut failed = Vec::new();

    if let Some(spo2) = vitals.oxygen_saturation {
        if spo2 < 90 {
            failed.push(ThresholdBreach::Hypoxaemia);
        }
    }
    if let Some(hr) = vitals.heart_rate {
        if hr > 120 {
            failed.push(ThresholdBreach::Tachycardia);
        } else if hr < 50 {
            failed.push(ThresholdBreach::Bradycardia);
        }
    }
    if let Some(sbp) = vitals.systolic_bp {
        if sbp < 90 {
            failed.push(ThresholdBreach::Hypotension);
        }
    }
    if let Some(temp) = vitals.temperature_c {
        if temp > 39.0 {
            failed.push(ThresholdBreach::Hyperthermia);
        } else if temp < 35.0 {
            failed.push(ThresholdBreach::Hypothermia);
        }
    }
    if let Some(rr) = vitals.respiratory_rate {
        if rr > 30 {
            failed.push(ThresholdBreach::Tachypnoea);
        } else if rr < 10 {
            failed.push(ThresholdBreach::Bradypnoea);
        }
    }
    if let Some(total) = gcs_total {
        if total < 8 {
            failed.push(ThresholdBreach::DepressedConsciousness);
        }
    }

    VitalsEvaluation {
        gcs_total,
        requires_immediate_attention: !failed.is_empty(),
        failed_thresholds: failed,
    }
}

const SYSTOLIC_BOUNDS: RangeInclusive<u16> = 40..=260;
const DIASTOLIC_BOUNDS: RangeInclusive<u16> = 20..=150;
const HEART_RATE_BOUNDS: RangeInclusive<u16> = 30..=220;
const RESPIRATORY_RATE_BOUNDS: RangeInclusive<u16> = 5..=60;
const TEMPERATURE_BOUNDS: RangeInclusive<f64> = 30.0..=45.0;
const SPO2_BOUNDS: RangeInclusive<u8> = 50..=100;
const GCS_EYE_BOUNDS: RangeInclusive<u8> = 1..=4;
const GCS_VERBAL_BOUNDS: RangeInclusive<u8> = 1..=5;
const GCS_MOTOR_BOUNDS: RangeInclusive<u8> = 1..=6;
const OXYGEN_FLOW_BOUNDS: RangeInclusive<f64> = 0.0..=60.0;

fn check<T: PartialOrd + std::fmt::Display>(
    errors: &mut Vec<String>,
    name: &str,
    value: Option<T>,
    bounds: &RangeInclusive<T>,
) {
    if let Some(value) = value {
        if !bounds.contains(&value) {
            errors.push(format!(
                "{name} {value} outside {}..={}",
                bounds.start(),
                bounds.end()
            ));
        }
    }
}

/// Reject snapshots with physiologically impossible values.
///
/// # Errors
///
/// Returns [`TriageError::Validation`] listing every offending field.
pub fn validate(vitals: &VitalSigns) -> TriageResult<()> {
    let mut errors = Vec::new();

    check(&mut errors, "systolic_bp", vitals.systolic_bp, &SYSTOLIC_BOUNDS);
    check(&mut errors, "diastolic_bp", vitals.diastolic_bp, &DIASTOLIC_BOUNDS);
    check(&mut errors, "heart_rate", vitals.heart_rate, &HEART_RATE_BOUNDS);
    check(
        &mut errors,
        "respiratory_rate",
        vitals.respiratory_rate,
        &RESPIRATORY_RATE_BOUNDS,
    );
    check(
        &mut errors,
        "temperature_c",
        vitals.temperature_c,
        &TEMPERATURE_BOUNDS,
    );
    check(
        &mut errors,
        "oxygen_saturation",
        vitals.oxygen_saturation,
        &SPO2_BOUNDS,
    );
    check(&mut errors, "gcs_eye", vitals.gcs_eye, &GCS_EYE_BOUNDS);
    check(&mut errors, "gcs_verbal", vitals.gcs_verbal, &GCS_VERBAL_BOUNDS);
    check(&mut errors, "gcs_motor", vitals.gcs_motor, &GCS_MOTOR_BOUNDS);
    check(
        &mut errors,
        "oxygen_flow_lpm",
        vitals.oxygen_flow_lpm,
        &OXYGEN_FLOW_BOUNDS,
    );

    if let (Some(sbp), Some(dbp)) = (vitals.systolic_bp, vitals.diastolic_bp) {
        if sbp <= dbp {
            errors.push(format!(
                "systolic_bp {sbp} must exceed diastolic_bp {dbp}"
            ));
        }
    }

    if !vitals.on_oxygen && vitals.oxygen_flow_lpm.is_some_and(|flow| flow > 0.0) {
        errors.push("oxygen_flow_lpm given but on_oxygen is false".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TriageError::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn normal_vitals() -> VitalSigns {
        VitalSigns {
            systolic_bp: Some(122),
            diastolic_bp: Some(78),
            heart_rate: Some(76),
            respiratory_rate: Some(16),
            temperature_c: Some(36.8),
            oxygen_saturation: Some(98),
            gcs_eye: Some(4),
            gcs_verbal: Some(5),
            gcs_motor: Some(6),
            on_oxygen: false,
            oxygen_device: None,
            oxygen_flow_lpm: None,
            notes: None,
            measurement_time: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_normal_vitals_do_not_need_immediate_attention() {
        let eval = evaluate(&normal_vitals());
        assert_eq!(eval.gcs_total, Some(15));
        assert!(!eval.requires_immediate_attention);
        assert!(eval.failed_thresholds.is_empty());
    }

    #[test]
    fn test_low_spo2_flags_immediate_attention() {
        let vitals = VitalSigns {
            oxygen_saturation: Some(85),
            ..normal_vitals()
        };
        let eval = evaluate(&vitals);
        assert!(eval.requires_immediate_attention);
        assert_eq!(eval.failed_thresholds, vec![ThresholdBreach::Hypoxaemia]);
    }

    fn tweak(edit: impl FnOnce(&mut VitalSigns)) -> VitalSigns {
        let mut vitals = normal_vitals();
        edit(&mut vitals);
        vitals
    }

    #[test]
    fn test_each_threshold_boundary() {
        use ThresholdBreach::*;

        let cases: Vec<(VitalSigns, Option<ThresholdBreach>)> = vec![
            (tweak(|v| v.heart_rate = Some(121)), Some(Tachycardia)),
            (tweak(|v| v.heart_rate = Some(120)), None),
            (tweak(|v| v.heart_rate = Some(49)), Some(Bradycardia)),
            (tweak(|v| v.heart_rate = Some(50)), None),
            (tweak(|v| v.systolic_bp = Some(89)), Some(Hypotension)),
            (tweak(|v| v.temperature_c = Some(39.1)), Some(Hyperthermia)),
            (tweak(|v| v.temperature_c = Some(34.9)), Some(Hypothermia)),
            (tweak(|v| v.respiratory_rate = Some(31)), Some(Tachypnoea)),
            (tweak(|v| v.respiratory_rate = Some(9)), Some(Bradypnoea)),
            (tweak(|v| v.oxygen_saturation = Some(90)), None),
        ];

        for (vitals, expected) in cases {
            let eval = evaluate(&vitals);
            assert_eq!(eval.failed_thresholds.first().copied(), expected);
            assert_eq!(eval.requires_immediate_attention, expected.is_some());
        }
    }

    #[test]
    fn test_low_gcs_flags_depressed_consciousness() {
        let vitals = VitalSigns {
            gcs_eye: Some(1),
            gcs_verbal: Some(2),
            gcs_motor: Some(4),
            ..normal_vitals()
        };
        let eval = evaluate(&vitals);
        assert_eq!(eval.gcs_total, Some(7));
        assert!(eval
            .failed_thresholds
            .contains(&ThresholdBreach::DepressedConsciousness));
    }

    #[test]
    fn test_gcs_total_absent_when_component_missing() {
        let vitals = VitalSigns {
            gcs_verbal: None,
            gcs_eye: Some(1),
            gcs_motor: Some(1),
            ..normal_vitals()
        };
        let eval = evaluate(&vitals);
        assert_eq!(eval.gcs_total, None);
        assert!(!eval.requires_immediate_attention);
    }

    #[test]
    fn test_gcs_total_always_within_scale() {
        for eye in GCS_EYE_BOUNDS {
            for verbal in GCS_VERBAL_BOUNDS {
                for motor in GCS_MOTOR_BOUNDS {
                    let vitals = VitalSigns {
                        gcs_eye: Some(eye),
                        gcs_verbal: Some(verbal),
                        gcs_motor: Some(motor),
                        ..normal_vitals()
                    };
                    let total = evaluate(&vitals).gcs_total.unwrap();
                    assert!((3..=15).contains(&total));
                }
            }
        }
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let vitals = VitalSigns {
            heart_rate: Some(130),
            temperature_c: Some(34.0),
            ..normal_vitals()
        };
        assert_eq!(evaluate(&vitals), evaluate(&vitals));
    }

    #[test]
    fn test_validate_accepts_normal_and_empty() {
        assert!(validate(&normal_vitals()).is_ok());
        assert!(validate(&VitalSigns::empty(Utc::now())).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_gcs_and_vitals() {
        let vitals = VitalSigns {
            gcs_eye: Some(5),
            heart_rate: Some(250),
            ..normal_vitals()
        };
        match validate(&vitals) {
            Err(TriageError::Validation(msg)) => {
                assert!(msg.contains("gcs_eye"));
                assert!(msg.contains("heart_rate"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_inverted_blood_pressure() {
        let vitals = VitalSigns {
            systolic_bp: Some(80),
            diastolic_bp: Some(90),
            ..normal_vitals()
        };
        assert!(validate(&vitals).is_err());
    }

    #[test]
    fn test_validate_rejects_flow_without_oxygen() {
        let vitals = VitalSigns {
            oxygen_flow_lpm: Some(2.0),
            ..normal_vitals()
        };
        assert!(validate(&vitals).is_err());

        let on_oxygen = VitalSigns {
            on_oxygen: true,
            oxygen_device: Some(OxygenDevice::NasalCannula),
            oxygen_flow_lpm: Some(2.0),
            ..normal_vitals()
        };
        assert!(validate(&on_oxygen).is_ok());
    }
}
