//! Cohort inclusion policy as data.
//!
//! Every known source id resolves to included-or-excluded with a
//! documented reason; an id without a rule is an error, never a silent
//! drop. The built-in table carries the production universe; a JSON
//! override can replace it without touching aggregation code.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::encode::POSITIONS;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The reference source itself; never aggregated.
    PredictionTarget,
    /// Shared identical draws with another source in historical windows.
    ConsortiumOverlap,
    /// History too short to cover the reference span.
    ShortHistory,
    /// Only draws in the evening cohort's slot; no midday counterpart.
    EveningOnly,
    /// Six-day weekly schedule (no or few Sunday draws).
    SixDaySchedule,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::PredictionTarget => "prediction_target",
            ExclusionReason::ConsortiumOverlap => "consortium_overlap",
            ExclusionReason::ShortHistory => "short_history",
            ExclusionReason::EveningOnly => "evening_only",
            ExclusionReason::SixDaySchedule => "six_day_schedule",
        }
    }
}

/// One source id and, if globally excluded, why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded: Option<ExclusionReason>,
}

/// A named cohort: which slot its series come from, plus sources that are
/// excluded from this cohort only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortDef {
    pub name: String,
    pub slot: String,
    #[serde(default)]
    pub extra_excluded: Vec<(String, ExclusionReason)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTable {
    pub version: u32,
    pub sources: Vec<SourceRule>,
    pub cohorts: Vec<CohortDef>,
}

/// The concrete result of resolving one cohort against the table.
#[derive(Debug, Clone)]
pub struct CohortSpec {
    pub name: String,
    pub slot: String,
    pub sources: BTreeSet<String>,
    pub expected_occupancy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Included,
    Excluded(ExclusionReason),
}

impl PolicyTable {
    /// The production table. 20 seven-day states feed the evening cohort
    /// (Oregon's second nightly draw is its own source, OR2, giving 21
    /// series); the midday cohort drops the five six-day states. The
    /// reference plus seven structurally unusable states are excluded
    /// everywhere.
    pub fn builtin() -> Self {
        let eligible = [
            "CT", "DC", "DE", "FL", "GA", "IL", "KY", "MA", "MD", "ME_NH_VT", "MI", "MO", "NJ",
            "NY", "OH", "OR", "OR2", "PA", "SC", "TN", "VA",
        ];
        let excluded = [
            ("CA", ExclusionReason::PredictionTarget),
            ("IA", ExclusionReason::ConsortiumOverlap),
            ("IN", ExclusionReason::ConsortiumOverlap),
            ("NC", ExclusionReason::ShortHistory),
            ("LA", ExclusionReason::EveningOnly),
            ("RI", ExclusionReason::EveningOnly),
            ("WI", ExclusionReason::EveningOnly),
            ("WV", ExclusionReason::SixDaySchedule),
        ];
        let six_day = ["SC", "TN", "DE", "KY", "IL"];

        let mut sources: Vec<SourceRule> = eligible
            .iter()
            .map(|id| SourceRule { id: (*id).to_string(), excluded: None })
            .collect();
        sources.extend(excluded.iter().map(|(id, reason)| SourceRule {
            id: (*id).to_string(),
            excluded: Some(*reason),
        }));

        Self {
            version: 1,
            sources,
            cohorts: vec![
                CohortDef {
                    name: "eve".to_string(),
                    slot: "eve".to_string(),
                    extra_excluded: Vec::new(),
                },
                CohortDef {
                    name: "mid".to_string(),
                    slot: "mid".to_string(),
                    extra_excluded: six_day
                        .iter()
                        .map(|id| ((*id).to_string(), ExclusionReason::SixDaySchedule))
                        .collect(),
                },
            ],
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn cohort(&self, name: &str) -> Option<&CohortDef> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    fn rule(&self, source_id: &str) -> Option<&SourceRule> {
        self.sources.iter().find(|r| r.id == source_id)
    }

    /// Pure, total eligibility check for one source against one cohort.
    pub fn classify(&self, def: &CohortDef, source_id: &str) -> Result<Eligibility, PipelineError> {
        let rule = self.rule(source_id).ok_or_else(|| PipelineError::UnknownSource {
            source_id: source_id.to_string(),
            cohort: def.name.clone(),
        })?;
        if let Some(reason) = rule.excluded {
            return Ok(Eligibility::Excluded(reason));
        }
        if let Some((_, reason)) = def.extra_excluded.iter().find(|(id, _)| id == source_id) {
            return Ok(Eligibility::Excluded(*reason));
        }
        Ok(Eligibility::Included)
    }

    /// Resolve a cohort to its eligible set and expected per-row
    /// occupancy (4 hot cells per source per date).
    pub fn resolve(&self, name: &str) -> Result<CohortSpec> {
        let def = self
            .cohort(name)
            .ok_or_else(|| anyhow!("no cohort named {} in policy table v{}", name, self.version))?;
        let mut sources = BTreeSet::new();
        for rule in &self.sources {
            if matches!(self.classify(def, &rule.id)?, Eligibility::Included) {
                sources.insert(rule.id.clone());
            }
        }
        let expected_occupancy = (POSITIONS * sources.len()) as u32;
        Ok(CohortSpec {
            name: def.name.clone(),
            slot: def.slot.clone(),
            sources,
            expected_occupancy,
        })
    }

    /// Sources eligible in `a` but not in `b`, for policy auditing.
    pub fn difference(a: &CohortSpec, b: &CohortSpec) -> Vec<String> {
        a.sources.difference(&b.sources).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_cohort_sizes_and_occupancy() {
        let table = PolicyTable::builtin();
        let eve = table.resolve("eve").unwrap();
        let mid = table.resolve("mid").unwrap();
        assert_eq!(eve.sources.len(), 21);
        assert_eq!(eve.expected_occupancy, 84);
        assert_eq!(mid.sources.len(), 16);
        assert_eq!(mid.expected_occupancy, 64);
    }

    #[test]
    fn six_day_states_excluded_from_mid_only() {
        let table = PolicyTable::builtin();
        let eve = table.cohort("eve").unwrap();
        let mid = table.cohort("mid").unwrap();
        assert_eq!(table.classify(eve, "SC").unwrap(), Eligibility::Included);
        assert_eq!(
            table.classify(mid, "SC").unwrap(),
            Eligibility::Excluded(ExclusionReason::SixDaySchedule)
        );
    }

    #[test]
    fn reference_is_excluded_everywhere() {
        let table = PolicyTable::builtin();
        for cohort in ["eve", "mid"] {
            let def = table.cohort(cohort).unwrap();
            assert_eq!(
                table.classify(def, "CA").unwrap(),
                Eligibility::Excluded(ExclusionReason::PredictionTarget)
            );
        }
    }

    #[test]
    fn unknown_source_is_an_error_not_a_silent_drop() {
        let table = PolicyTable::builtin();
        let eve = table.cohort("eve").unwrap();
        let err = table.classify(eve, "XX").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownSource { .. }));
    }

    #[test]
    fn cohort_difference_is_the_six_day_set() {
        let table = PolicyTable::builtin();
        let eve = table.resolve("eve").unwrap();
        let mid = table.resolve("mid").unwrap();
        let mut only_eve = PolicyTable::difference(&eve, &mid);
        only_eve.sort();
        assert_eq!(only_eve, vec!["DE", "IL", "KY", "SC", "TN"]);
        assert!(PolicyTable::difference(&mid, &eve).is_empty());
    }

    #[test]
    fn json_round_trip_preserves_resolution() {
        let table = PolicyTable::builtin();
        let text = table.to_json().unwrap();
        let back = PolicyTable::from_json(&text).unwrap();
        assert_eq!(
            back.resolve("mid").unwrap().sources,
            table.resolve("mid").unwrap().sources
        );
    }
}
