//! Clinical protocol catalogue and the keyword matcher that suggests protocols for an
//! assessment.
//!
//! Matching is deterministic. Criteria text is tokenised into lowercase keywords and compared
//! with the terms of an assessment: its chief complaint, the keywords implied by each raised
//! red flag, and pregnancy terms when relevant. Each shared keyword scores
//! [`KEYWORD_SCORE`]; a red flag that points at the protocol's type adds [`TYPE_BONUS`]. Only
//! protocols with a non-zero relevance are suggested, and the protocol's own priority weight
//! then lifts it within that set.

use crate::assessment::{Assessment, RedFlags};
use crate::context::RequestContext;
use crate::error::{TriageError, TriageResult};
use crate::store::Changeset;
use crate::Shared;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use triage_types::NonEmptyText;
use triage_uuid::RecordId;

pub const KEYWORD_SCORE: u32 = 10;
pub const TYPE_BONUS: u32 = 15;

const MIN_KEYWORD_LEN: usize = 3;
const STOPWORDS: &[&str] = &[
    "and", "the", "with", "for", "from", "any", "not", "patient", "patients", "suspected",
    "signs", "symptoms", "presenting",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    Cardiac,
    Respiratory,
    Neuro,
    Trauma,
    Pediatric,
    General,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: RecordId,
    pub name: NonEmptyText,
    pub description: Option<String>,
    pub protocol_type: ProtocolType,
    pub criteria: NonEmptyText,
    pub required_actions: Option<String>,
    /// Higher weights rank earlier among equally relevant protocols.
    pub priority_weight: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row: a protocol was applied to an assessment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolApplication {
    pub id: RecordId,
    pub assessment_id: RecordId,
    pub protocol_id: RecordId,
    /// Name at the time of application; later renames do not rewrite history.
    pub protocol_name: String,
    pub applied_at: DateTime<Utc>,
    pub applied_by: String,
}

#[derive(Clone, Debug)]
pub struct NewProtocol {
    pub name: String,
    pub description: Option<String>,
    pub protocol_type: ProtocolType,
    pub criteria: String,
    pub required_actions: Option<String>,
    pub priority_weight: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ProtocolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub protocol_type: Option<ProtocolType>,
    pub criteria: Option<String>,
    pub required_actions: Option<String>,
    pub priority_weight: Option<u32>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolSuggestion {
    pub protocol: Protocol,
    pub score: u32,
    pub matched_keywords: Vec<String>,
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= MIN_KEYWORD_LEN && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn red_flag_terms(flags: &RedFlags) -> Vec<&'static str> {
    let mut terms = Vec::new();
    if flags.sepsis {
        terms.extend(["sepsis", "septic", "infection", "fever"]);
    }
    if flags.stroke {
        terms.extend(["stroke", "neuro", "neurological", "weakness", "facial"]);
    }
    if flags.acute_coronary_syndrome {
        terms.extend(["chest", "cardiac", "coronary", "acs", "infarction"]);
    }
    if flags.trauma {
        terms.extend(["trauma", "injury", "fracture", "wound"]);
    }
    terms
}

fn flagged_types(flags: &RedFlags) -> Vec<ProtocolType> {
    let mut types = Vec::new();
    if flags.stroke {
        types.push(ProtocolType::Neuro);
    }
    if flags.acute_coronary_syndrome {
        types.push(ProtocolType::Cardiac);
    }
    if flags.trauma {
        types.push(ProtocolType::Trauma);
    }
    types
}

fn assessment_terms(assessment: &Assessment) -> BTreeSet<String> {
    let mut terms = keywords(assessment.chief_complaint.as_str());
    terms.extend(red_flag_terms(&assessment.red_flags).into_iter().map(String::from));
    if assessment.is_pregnant {
        terms.extend(["pregnancy", "pregnant", "obstetric"].map(String::from));
    }
    terms
}

/// Score one protocol against an assessment. `None` when nothing relates them.
pub fn score(protocol: &Protocol, assessment: &Assessment) -> Option<ProtocolSuggestion> {
    let terms = assessment_terms(assessment);
    let matched: Vec<String> = keywords(protocol.criteria.as_str())
        .intersection(&terms)
        .cloned()
        .collect();

    let type_bonus = if flagged_types(&assessment.red_flags).contains(&protocol.protocol_type) {
        TYPE_BONUS
    } else {
        0
    };
    let keyword_hits = u32::try_from(matched.len()).unwrap_or(u32::MAX);
    let relevance = keyword_hits
        .saturating_mul(KEYWORD_SCORE)
        .saturating_add(type_bonus);
    if relevance == 0 {
        return None;
    }

    Some(ProtocolSuggestion {
        protocol: protocol.clone(),
        score: relevance.saturating_add(protocol.priority_weight),
        matched_keywords: matched,
    })
}

/// Protocol catalogue plus suggestion and application.
#[derive(Clone)]
pub struct ProtocolMatcher {
    shared: Shared,
}

impl ProtocolMatcher {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Rank active protocols for an assessment, best first.
    pub fn suggest(
        &self,
        assessment_id: RecordId,
        protocol_type: Option<ProtocolType>,
    ) -> TriageResult<Vec<ProtocolSuggestion>> {
        let mut suggestions = self.shared.store.read(|state| {
            let assessment = state
                .assessment(&assessment_id)
                .ok_or_else(|| TriageError::not_found("assessment", assessment_id))?;
            Ok::<_, TriageError>(
                state
                    .protocols()
                    .filter(|p| p.is_active)
                    .filter(|p| protocol_type.map_or(true, |t| p.protocol_type == t))
                    .filter_map(|p| score(p, assessment))
                    .collect::<Vec<_>>(),
            )
        })??;

        suggestions.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.protocol.priority_weight.cmp(&a.protocol.priority_weight))
                .then_with(|| a.protocol.name.as_str().cmp(b.protocol.name.as_str()))
                .then_with(|| a.protocol.id.cmp(&b.protocol.id))
        });

        tracing::debug!(
            "{} protocol suggestions for assessment {}",
            suggestions.len(),
            assessment_id
        );
        Ok(suggestions)
    }

    /// Record that a protocol was applied. Clinical fields are untouched.
    ///
    /// # Errors
    ///
    /// - [`TriageError::NotFound`] if the assessment or protocol does not exist.
    /// - [`TriageError::Conflict`] if the protocol is inactive or the assessment is closed.
    pub fn apply(
        &self,
        ctx: &RequestContext,
        assessment_id: RecordId,
        protocol_id: RecordId,
    ) -> TriageResult<ProtocolApplication> {
        let _span = tracing::info_span!(
            "apply_protocol",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            assessment_id = %assessment_id,
            protocol_id = %protocol_id
        )
        .entered();
        let now = self.shared.clock.now();

        let application = self.shared.store.transact(|state| {
            let assessment = state
                .assessment(&assessment_id)
                .ok_or_else(|| TriageError::not_found("assessment", assessment_id))?;
            let protocol = state
                .protocol(&protocol_id)
                .ok_or_else(|| TriageError::not_found("protocol", protocol_id))?;

            if !protocol.is_active {
                return Err(TriageError::Conflict(format!(
                    "protocol {protocol_id} is inactive"
                )));
            }
            if !assessment.is_open {
                return Err(TriageError::Conflict(format!(
                    "assessment {assessment_id} is {:?}",
                    assessment.status
                )));
            }

            let application = ProtocolApplication {
                id: RecordId::new(),
                assessment_id,
                protocol_id,
                protocol_name: protocol.name.to_string(),
                applied_at: now,
                applied_by: ctx.caller_id().to_string(),
            };
            let changes = Changeset {
                applications: vec![application.clone()],
                ..Changeset::default()
            };
            Ok((changes, application))
        })?;

        tracing::info!(
            "applied protocol '{}' to assessment {}",
            application.protocol_name,
            assessment_id
        );
        Ok(application)
    }

    pub fn list_applications(
        &self,
        assessment_id: RecordId,
    ) -> TriageResult<Vec<ProtocolApplication>> {
        self.shared.store.read(|state| {
            if state.assessment(&assessment_id).is_none() {
                return Err(TriageError::not_found("assessment", assessment_id));
            }
            Ok(state.applications(&assessment_id).to_vec())
        })?
    }

    pub fn create(&self, ctx: &RequestContext, new: NewProtocol) -> TriageResult<Protocol> {
        let _span = tracing::info_span!(
            "create_protocol",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id()
        )
        .entered();
        let now = self.shared.clock.now();

        let protocol = Protocol {
            id: RecordId::new(),
            name: NonEmptyText::new(&new.name)?,
            description: new.description,
            protocol_type: new.protocol_type,
            criteria: NonEmptyText::new(&new.criteria)?,
            required_actions: new.required_actions,
            priority_weight: new.priority_weight,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let protocol = self.shared.store.transact(|_| {
            let changes = Changeset {
                protocols: vec![protocol.clone()],
                ..Changeset::default()
            };
            Ok((changes, protocol))
        })?;

        tracing::info!("created protocol {} '{}'", protocol.id, protocol.name);
        Ok(protocol)
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        protocol_id: RecordId,
        update: ProtocolUpdate,
    ) -> TriageResult<Protocol> {
        let _span = tracing::info_span!(
            "update_protocol",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            protocol_id = %protocol_id
        )
        .entered();
        let now = self.shared.clock.now();

        let name = update.name.as_deref().map(NonEmptyText::new).transpose()?;
        let criteria = update
            .criteria
            .as_deref()
            .map(NonEmptyText::new)
            .transpose()?;

        let protocol = self.shared.store.transact(|state| {
            let mut protocol = state
                .protocol(&protocol_id)
                .cloned()
                .ok_or_else(|| TriageError::not_found("protocol", protocol_id))?;

            if let Some(name) = name {
                protocol.name = name;
            }
            if let Some(criteria) = criteria {
                protocol.criteria = criteria;
            }
            if let Some(description) = update.description {
                protocol.description = Some(description);
            }
            if let Some(protocol_type) = update.protocol_type {
                protocol.protocol_type = protocol_type;
            }
            if let Some(actions) = update.required_actions {
                protocol.required_actions = Some(actions);
            }
            if let Some(weight) = update.priority_weight {
                protocol.priority_weight = weight;
            }
            if let Some(active) = update.is_active {
                protocol.is_active = active;
            }
            protocol.updated_at = now;

            let changes = Changeset {
                protocols: vec![protocol.clone()],
                ..Changeset::default()
            };
            Ok((changes, protocol))
        })?;

        tracing::info!("updated protocol {}", protocol.id);
        Ok(protocol)
    }

    /// Retire a protocol from suggestion. Already-inactive protocols are returned unchanged.
    pub fn deactivate(
        &self,
        ctx: &RequestContext,
        protocol_id: RecordId,
    ) -> TriageResult<Protocol> {
        let current = self.get(protocol_id)?;
        if !current.is_active {
            return Ok(current);
        }
        self.update(
            ctx,
            protocol_id,
            ProtocolUpdate {
                is_active: Some(false),
                ..ProtocolUpdate::default()
            },
        )
    }

    pub fn get(&self, protocol_id: RecordId) -> TriageResult<Protocol> {
        self.shared.store.read(|state| {
            state
                .protocol(&protocol_id)
                .cloned()
                .ok_or_else(|| TriageError::not_found("protocol", protocol_id))
        })?
    }

    /// Catalogue sorted by name.
    pub fn list(&self, active_only: bool) -> TriageResult<Vec<Protocol>> {
        let mut protocols = self.shared.store.read(|state| {
            state
                .protocols()
                .filter(|p| !active_only || p.is_active)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        protocols.sort_by(|a, b| {
            a.name
                .as_str()
                .cmp(b.name.as_str())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(protocols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{arrival, harness, Harness};
    use crate::NewAssessment;
    use triage_types::TriageLevel;

    fn protocol(
        h: &Harness,
        name: &str,
        kind: ProtocolType,
        criteria: &str,
        weight: u32,
    ) -> Protocol {
        h.service
            .protocols()
            .create(
                &h.ctx,
                NewProtocol {
                    name: name.into(),
                    description: None,
                    protocol_type: kind,
                    criteria: criteria.into(),
                    required_actions: Some("notify senior clinician".into()),
                    priority_weight: weight,
                },
            )
            .unwrap()
    }

    fn chest_pain(h: &Harness) -> Assessment {
        h.create(NewAssessment {
            chief_complaint: "Crushing chest pain radiating to left arm".into(),
            red_flags: RedFlags {
                acute_coronary_syndrome: true,
                ..RedFlags::default()
            },
            ..arrival(RecordId::new(), TriageLevel::Emergent)
        })
    }

    #[test]
    fn test_keywords_drop_short_words_and_stopwords() {
        let words = keywords("Chest pain and SOB, with the patient");
        assert_eq!(
            words.into_iter().collect::<Vec<_>>(),
            vec!["chest".to_string(), "pain".to_string(), "sob".to_string()]
        );
    }

    #[test]
    fn test_suggest_ranks_matching_protocols() {
        let h = harness();
        let acs = protocol(
            &h,
            "ACS pathway",
            ProtocolType::Cardiac,
            "chest pain, suspected coronary syndrome",
            5,
        );
        let sepsis = protocol(
            &h,
            "Sepsis six",
            ProtocolType::General,
            "fever infection sepsis",
            50,
        );
        let arm = protocol(
            &h,
            "Limb injury",
            ProtocolType::Trauma,
            "arm injury fracture",
            0,
        );
        let assessment = chest_pain(&h);

        let suggestions = h.service.protocols().suggest(assessment.id, None).unwrap();
        let ids: Vec<RecordId> = suggestions.iter().map(|s| s.protocol.id).collect();

        assert_eq!(ids, vec![acs.id, arm.id]);
        assert!(!ids.contains(&sepsis.id));
        assert_eq!(
            suggestions[0].matched_keywords,
            vec!["chest".to_string(), "coronary".to_string(), "pain".to_string()]
        );
        assert_eq!(suggestions[0].score, 3 * KEYWORD_SCORE + TYPE_BONUS + 5);
    }

    #[test]
    fn test_extreme_weight_saturates_score() {
        let h = harness();
        let heavy = protocol(&h, "ACS pathway", ProtocolType::Cardiac, "chest pain", u32::MAX);
        let assessment = chest_pain(&h);

        let suggestions = h.service.protocols().suggest(assessment.id, None).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].protocol.id, heavy.id);
        assert_eq!(suggestions[0].score, u32::MAX);
    }

    #[test]
    fn test_suggest_filters_inactive_and_type() {
        let h = harness();
        let cardiac = protocol(&h, "ACS pathway", ProtocolType::Cardiac, "chest pain", 0);
        let retired = protocol(&h, "Old chest pain", ProtocolType::Cardiac, "chest pain", 99);
        h.service.protocols().deactivate(&h.ctx, retired.id).unwrap();
        protocol(&h, "Chest trauma", ProtocolType::Trauma, "chest wall", 0);
        let assessment = chest_pain(&h);

        let suggestions = h
            .service
            .protocols()
            .suggest(assessment.id, Some(ProtocolType::Cardiac))
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].protocol.id, cardiac.id);
    }

    #[test]
    fn test_suggest_breaks_ties_by_weight_then_name() {
        let h = harness();
        let b = protocol(&h, "B chest", ProtocolType::General, "chest", 0);
        let a = protocol(&h, "A chest", ProtocolType::General, "chest", 0);
        let assessment = chest_pain(&h);

        let ids: Vec<RecordId> = h
            .service
            .protocols()
            .suggest(assessment.id, None)
            .unwrap()
            .iter()
            .map(|s| s.protocol.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_apply_records_application_without_clinical_change() {
        let h = harness();
        let acs = protocol(&h, "ACS pathway", ProtocolType::Cardiac, "chest pain", 5);
        let assessment = chest_pain(&h);

        let application = h
            .service
            .protocols()
            .apply(&h.ctx, assessment.id, acs.id)
            .unwrap();
        assert_eq!(application.protocol_name, "ACS pathway");
        assert_eq!(application.applied_by, h.ctx.caller_id());

        let after = h.service.lifecycle().get(assessment.id).unwrap();
        assert_eq!(after, assessment);
        assert_eq!(
            h.service.protocols().list_applications(assessment.id).unwrap(),
            vec![application]
        );
    }

    #[test]
    fn test_apply_inactive_protocol_conflicts() {
        let h = harness();
        let p = protocol(&h, "Retired", ProtocolType::General, "chest", 0);
        h.service.protocols().deactivate(&h.ctx, p.id).unwrap();
        let assessment = chest_pain(&h);

        assert!(matches!(
            h.service.protocols().apply(&h.ctx, assessment.id, p.id),
            Err(TriageError::Conflict(_))
        ));
        assert!(matches!(
            h.service.protocols().apply(&h.ctx, assessment.id, RecordId::new()),
            Err(TriageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_catalogue_update_and_list() {
        let h = harness();
        let p = protocol(&h, "Zeta", ProtocolType::General, "fever", 1);
        protocol(&h, "Alpha", ProtocolType::Respiratory, "wheeze", 1);

        let updated = h
            .service
            .protocols()
            .update(
                &h.ctx,
                p.id,
                ProtocolUpdate {
                    priority_weight: Some(9),
                    protocol_type: Some(ProtocolType::Pediatric),
                    ..ProtocolUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.priority_weight, 9);
        assert_eq!(updated.protocol_type, ProtocolType::Pediatric);

        let names: Vec<String> = h
            .service
            .protocols()
            .list(false)
            .unwrap()
            .iter()
            .map(|p| p.name.to_string())
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);

        h.service.protocols().deactivate(&h.ctx, p.id).unwrap();
        assert_eq!(h.service.protocols().list(true).unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let h = harness();
        let result = h.service.protocols().create(
            &h.ctx,
            NewProtocol {
                name: "   ".into(),
                description: None,
                protocol_type: ProtocolType::General,
                criteria: "fever".into(),
                required_actions: None,
                priority_weight: 0,
            },
        );
        assert!(matches!(result, Err(TriageError::Validation(_))));
    }
}
