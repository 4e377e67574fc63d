//! Prerequisite evaluation for course enrollment.
//!
//! A course declares zero or more [`PrerequisiteNode`]s; checking a subject
//! against them produces an [`EligibilityReport`] that separates hard
//! blockers from advisory warnings and carries a remediation estimate.
//!
//! Evaluation is a pure function of the node definitions and a single
//! [`LearningHistory`] snapshot taken once per check, so nodes in the same pass
//! never see inconsistent reads. Malformed or orphaned nodes are skipped with
//! an explicit marker instead of failing the whole report: one bad definition
//! must not block evaluation of the rest, and a dangling reference must never
//! block enrollment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ConfigurationError;
use crate::expr::{Expression, Value, VariableScope};

pub type CourseId = Uuid;
pub type SubjectId = Uuid;

/// What a prerequisite node measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteKind {
    CourseCompletion,
    AssessmentScore,
    SkillLevel,
    TimeSpent,
    Certification,
    CustomRule,
}

/// How the subject's value is compared against the node's required value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Inclusive on both ends.
    Between,
    In,
    NotIn,
}

/// The node's required value; which shapes are legal depends on the kind and
/// operator (a mismatch makes the node unevaluable, not the report broken).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredValue {
    Number(f64),
    /// Both bounds inclusive; used with [`CompareOp::Between`].
    Range(f64, f64),
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Expression source for [`PrerequisiteKind::CustomRule`] nodes.
    pub custom_rule: Option<String>,
    /// Author's estimate of the remaining effort for this node, in minutes.
    pub estimated_minutes_to_complete: Option<f64>,
}

/// One declared gating rule. Persisted by the caller; `active` reflects the
/// soft-delete flag, and inactive nodes never participate in evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrerequisiteNode {
    pub id: Uuid,
    /// The course this node gates.
    pub course_id: CourseId,
    pub kind: PrerequisiteKind,
    pub operator: CompareOp,
    pub required: RequiredValue,
    /// What the node measures: a prerequisite course id for completion and
    /// (optionally) time-spent nodes, an assessment id for score nodes, a
    /// skill name for skill nodes. Unused by certification and custom-rule
    /// nodes.
    pub reference: Option<String>,
    /// Required nodes block enrollment when unmet; optional nodes only warn.
    pub is_required: bool,
    pub order_index: i32,
    pub active: bool,
    pub metadata: NodeMetadata,
}

/// Read-only snapshot of a subject's learning history, fetched once per
/// eligibility check.
#[derive(Debug, Clone, Default)]
pub struct LearningHistory {
    pub completed_courses: HashSet<CourseId>,
    /// Latest attempt per assessment.
    pub assessment_scores: HashMap<String, f64>,
    pub minutes_per_course: HashMap<CourseId, f64>,
    pub total_minutes: f64,
    pub certifications: HashSet<String>,
    pub skill_levels: HashMap<String, f64>,
}

/// Variables visible to custom-rule expressions: aggregate counts plus
/// `scores.*` and `skills.*` lookups. Absent scores and skills resolve to 0
/// so a rule can reference a skill the subject has not touched yet.
impl VariableScope for LearningHistory {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(skill) = name.strip_prefix("skills.") {
            return Some(Value::Number(
                self.skill_levels.get(skill).copied().unwrap_or(0.0),
            ));
        }
        if let Some(assessment) = name.strip_prefix("scores.") {
            return Some(Value::Number(
                self.assessment_scores.get(assessment).copied().unwrap_or(0.0),
            ));
        }
        match name {
            "completed_count" => Some(Value::Number(self.completed_courses.len() as f64)),
            "total_minutes" => Some(Value::Number(self.total_minutes)),
            "certification_count" => Some(Value::Number(self.certifications.len() as f64)),
            _ => None,
        }
    }
}

/// Why a node was excluded from met/unmet classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The node references a deleted or inactive course.
    OrphanedReference,
    /// The node's kind/operator/value combination cannot be evaluated.
    InvalidDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Met,
    Unmet,
    Skipped(SkipReason),
}

/// The outcome of checking one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrerequisiteCheck {
    pub status: CheckStatus,
    pub prerequisite: PrerequisiteNode,
    pub current_value: Option<Value>,
    pub required: RequiredValue,
    /// 0–100. How far along the subject is toward meeting the node.
    pub progress_percent: f64,
    pub message: String,
}

impl PrerequisiteCheck {
    pub fn is_met(&self) -> bool {
        self.status == CheckStatus::Met
    }

    fn new(
        node: &PrerequisiteNode,
        status: CheckStatus,
        current_value: Option<Value>,
        progress_percent: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            prerequisite: node.clone(),
            current_value,
            required: node.required.clone(),
            progress_percent: progress_percent.clamp(0.0, 100.0),
            message: message.into(),
        }
    }

    fn invalid(node: &PrerequisiteNode, detail: impl Into<String>) -> Self {
        let error = ConfigurationError::InvalidNode {
            node: node.id,
            detail: detail.into(),
        };
        Self::new(
            node,
            CheckStatus::Skipped(SkipReason::InvalidDefinition),
            None,
            0.0,
            error.to_string(),
        )
    }
}

/// The aggregated verdict for one (course, subject) pair. Recomputed on every
/// query, never cached across subject-state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityReport {
    pub is_eligible: bool,
    /// Required nodes that are unmet.
    pub blocked_by: Vec<PrerequisiteCheck>,
    /// Optional nodes that are unmet.
    pub warnings: Vec<PrerequisiteCheck>,
    /// Nodes excluded from classification, with their skip markers.
    pub skipped: Vec<PrerequisiteCheck>,
    /// Prerequisite course ids the subject has not completed yet.
    pub missing_ids: Vec<CourseId>,
    /// Rounded up to whole hours; present only when at least one blocking
    /// node carries an effort estimate.
    pub estimated_hours_to_eligibility: Option<u64>,
}

impl EligibilityReport {
    fn eligible() -> Self {
        Self {
            is_eligible: true,
            blocked_by: Vec::new(),
            warnings: Vec::new(),
            skipped: Vec::new(),
            missing_ids: Vec::new(),
            estimated_hours_to_eligibility: None,
        }
    }
}

/// Read-only access to a course's prerequisite definitions.
#[async_trait]
pub trait PrerequisiteSource: Send + Sync {
    /// The active prerequisite nodes declared by a course.
    async fn prerequisites(&self, course_id: CourseId) -> Vec<PrerequisiteNode>;

    /// Whether a referenced course exists and is active. Used to detect
    /// orphaned completion references.
    async fn course_is_active(&self, course_id: CourseId) -> bool;
}

/// Read-only access to a subject's aggregated learning history.
#[async_trait]
pub trait LearningHistorySource: Send + Sync {
    async fn snapshot(&self, subject_id: SubjectId) -> LearningHistory;
}

/// Walks a course's prerequisite nodes for a subject and aggregates the
/// verdict. Stateless: both sources are read-only and every check stands
/// alone.
#[derive(Clone)]
pub struct EligibilityEvaluator {
    prerequisites: Arc<dyn PrerequisiteSource>,
    history: Arc<dyn LearningHistorySource>,
}

impl EligibilityEvaluator {
    pub fn new(
        prerequisites: Arc<dyn PrerequisiteSource>,
        history: Arc<dyn LearningHistorySource>,
    ) -> Self {
        Self {
            prerequisites,
            history,
        }
    }

    #[tracing::instrument(skip_all, fields(course = %course_id, subject = %subject_id))]
    pub async fn check_eligibility(
        &self,
        course_id: CourseId,
        subject_id: SubjectId,
    ) -> EligibilityReport {
        let mut nodes = self.prerequisites.prerequisites(course_id).await;
        nodes.retain(|node| node.active);
        nodes.sort_by_key(|node| node.order_index);

        if nodes.is_empty() {
            tracing::debug!("no active prerequisites, eligible");
            return EligibilityReport::eligible();
        }

        // One snapshot for the whole pass.
        let history = self.history.snapshot(subject_id).await;

        let mut blocked_by = Vec::new();
        let mut warnings = Vec::new();
        let mut skipped = Vec::new();
        let mut missing_ids = Vec::new();

        for node in &nodes {
            let check = if node.kind == PrerequisiteKind::CourseCompletion {
                self.check_completion_node(node, &history, &mut missing_ids)
                    .await
            } else {
                check_node(node, &history)
            };

            tracing::trace!(
                node = %node.id,
                kind = ?node.kind,
                status = ?check.status,
                progress = check.progress_percent,
                "prerequisite evaluated"
            );

            match check.status {
                CheckStatus::Met => {}
                CheckStatus::Unmet if node.is_required => blocked_by.push(check),
                CheckStatus::Unmet => warnings.push(check),
                CheckStatus::Skipped(_) => skipped.push(check),
            }
        }

        let estimated_hours_to_eligibility = estimate_hours(&blocked_by);
        let is_eligible = blocked_by.is_empty();

        tracing::debug!(
            eligible = is_eligible,
            blockers = blocked_by.len(),
            warnings = warnings.len(),
            skipped = skipped.len(),
            "eligibility computed"
        );

        EligibilityReport {
            is_eligible,
            blocked_by,
            warnings,
            skipped,
            missing_ids,
            estimated_hours_to_eligibility,
        }
    }

    /// Completion nodes get special handling: referenced courses that no
    /// longer exist are dropped, and a node left with no live references is
    /// skipped rather than treated as unmet.
    async fn check_completion_node(
        &self,
        node: &PrerequisiteNode,
        history: &LearningHistory,
        missing_ids: &mut Vec<CourseId>,
    ) -> PrerequisiteCheck {
        let referenced = match referenced_courses(node) {
            Ok(ids) => ids,
            Err(detail) => return PrerequisiteCheck::invalid(node, detail),
        };

        let mut live = Vec::with_capacity(referenced.len());
        for id in referenced {
            if self.prerequisites.course_is_active(id).await {
                live.push(id);
            }
        }

        if live.is_empty() {
            return PrerequisiteCheck::new(
                node,
                CheckStatus::Skipped(SkipReason::OrphanedReference),
                None,
                0.0,
                "every referenced prerequisite course is inactive or deleted",
            );
        }

        let completed: Vec<CourseId> = live
            .iter()
            .copied()
            .filter(|id| history.completed_courses.contains(id))
            .collect();

        let met = match node.operator {
            // Equals: every referenced course must be completed.
            CompareOp::Equals => completed.len() == live.len(),
            // In: any one of the referenced courses satisfies the node.
            CompareOp::In => !completed.is_empty(),
            // NotIn: none of the referenced courses may be completed.
            CompareOp::NotIn => completed.is_empty(),
            _ => {
                return PrerequisiteCheck::invalid(
                    node,
                    format!("operator {:?} does not apply to course completion", node.operator),
                )
            }
        };

        if !met {
            for id in live.iter().filter(|id| !completed.contains(*id)) {
                if !missing_ids.contains(id) {
                    missing_ids.push(*id);
                }
            }
        }

        let progress = match node.operator {
            CompareOp::In => {
                if completed.is_empty() {
                    0.0
                } else {
                    100.0
                }
            }
            _ => completed.len() as f64 / live.len() as f64 * 100.0,
        };

        PrerequisiteCheck::new(
            node,
            if met { CheckStatus::Met } else { CheckStatus::Unmet },
            Some(Value::Number(completed.len() as f64)),
            progress,
            format!("{} of {} prerequisite courses completed", completed.len(), live.len()),
        )
    }
}

/// Checks one node against the history snapshot. Pure.
pub fn check_node(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    match node.kind {
        PrerequisiteKind::CourseCompletion => {
            // Completion nodes need liveness data; without it every
            // reference is assumed live.
            check_completion_offline(node, history)
        }
        PrerequisiteKind::AssessmentScore => check_score(node, history),
        PrerequisiteKind::SkillLevel => check_skill(node, history),
        PrerequisiteKind::TimeSpent => check_time_spent(node, history),
        PrerequisiteKind::Certification => check_certification(node, history),
        PrerequisiteKind::CustomRule => check_custom_rule(node, history),
    }
}

fn check_completion_offline(
    node: &PrerequisiteNode,
    history: &LearningHistory,
) -> PrerequisiteCheck {
    let referenced = match referenced_courses(node) {
        Ok(ids) => ids,
        Err(detail) => return PrerequisiteCheck::invalid(node, detail),
    };
    if referenced.is_empty() {
        return PrerequisiteCheck::invalid(node, "no prerequisite course referenced");
    }

    let completed = referenced
        .iter()
        .filter(|id| history.completed_courses.contains(*id))
        .count();
    let met = match node.operator {
        CompareOp::Equals => completed == referenced.len(),
        CompareOp::In => completed > 0,
        CompareOp::NotIn => completed == 0,
        _ => {
            return PrerequisiteCheck::invalid(
                node,
                format!("operator {:?} does not apply to course completion", node.operator),
            )
        }
    };
    let progress = match node.operator {
        CompareOp::In => {
            if completed > 0 {
                100.0
            } else {
                0.0
            }
        }
        _ => completed as f64 / referenced.len() as f64 * 100.0,
    };

    PrerequisiteCheck::new(
        node,
        if met { CheckStatus::Met } else { CheckStatus::Unmet },
        Some(Value::Number(completed as f64)),
        progress,
        format!("{completed} of {} prerequisite courses completed", referenced.len()),
    )
}

fn check_score(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    let assessment = match &node.reference {
        Some(reference) => reference,
        None => return PrerequisiteCheck::invalid(node, "score node names no assessment"),
    };

    let score = match history.assessment_scores.get(assessment) {
        Some(score) => *score,
        None => {
            return PrerequisiteCheck::new(
                node,
                CheckStatus::Unmet,
                None,
                0.0,
                format!("no recorded attempt for assessment '{assessment}'"),
            )
        }
    };

    numeric_check(node, score, format!("latest score {score}"))
}

fn check_skill(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    let skill = match &node.reference {
        Some(reference) => reference,
        None => return PrerequisiteCheck::invalid(node, "skill node names no skill"),
    };

    // A skill the subject has never exercised counts as level 0.
    let level = history.skill_levels.get(skill).copied().unwrap_or(0.0);
    numeric_check(node, level, format!("skill '{skill}' at level {level}"))
}

fn check_time_spent(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    let minutes = match &node.reference {
        Some(reference) => match reference.parse::<Uuid>() {
            Ok(course) => history.minutes_per_course.get(&course).copied().unwrap_or(0.0),
            Err(_) => {
                return PrerequisiteCheck::invalid(
                    node,
                    format!("'{reference}' is not a course id"),
                )
            }
        },
        None => history.total_minutes,
    };

    numeric_check(node, minutes, format!("{minutes} minutes spent"))
}

fn check_certification(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    let required: Vec<&str> = match &node.required {
        RequiredValue::Text(name) => vec![name.as_str()],
        RequiredValue::List(names) => names.iter().map(String::as_str).collect(),
        other => {
            return PrerequisiteCheck::invalid(
                node,
                format!("{other:?} is not a certification requirement"),
            )
        }
    };
    if required.is_empty() {
        return PrerequisiteCheck::invalid(node, "no certification named");
    }

    let held = required
        .iter()
        .filter(|name| history.certifications.contains(**name))
        .count();

    let met = match node.operator {
        CompareOp::Equals => held == required.len(),
        CompareOp::In => held > 0,
        CompareOp::NotIn => held == 0,
        _ => {
            return PrerequisiteCheck::invalid(
                node,
                format!("operator {:?} does not apply to certifications", node.operator),
            )
        }
    };

    let progress = if met {
        100.0
    } else {
        held as f64 / required.len() as f64 * 100.0
    };

    PrerequisiteCheck::new(
        node,
        if met { CheckStatus::Met } else { CheckStatus::Unmet },
        Some(Value::Number(held as f64)),
        progress,
        format!("{held} of {} required certifications held", required.len()),
    )
}

fn check_custom_rule(node: &PrerequisiteNode, history: &LearningHistory) -> PrerequisiteCheck {
    let source = match &node.metadata.custom_rule {
        Some(source) => source,
        None => return PrerequisiteCheck::invalid(node, "custom-rule node carries no expression"),
    };

    let outcome = Expression::parse(source).and_then(|expr| expr.evaluate(history));
    match outcome {
        Ok(true) => PrerequisiteCheck::new(
            node,
            CheckStatus::Met,
            Some(Value::Bool(true)),
            100.0,
            format!("rule '{source}' holds"),
        ),
        Ok(false) => PrerequisiteCheck::new(
            node,
            CheckStatus::Unmet,
            Some(Value::Bool(false)),
            0.0,
            format!("rule '{source}' does not hold"),
        ),
        Err(error) => {
            if node.is_required {
                // A config bug must not block enrollment; surface it as an
                // explicit could-not-evaluate entry instead.
                PrerequisiteCheck::invalid(node, error.to_string())
            } else {
                PrerequisiteCheck::new(
                    node,
                    CheckStatus::Unmet,
                    None,
                    0.0,
                    format!("rule could not be evaluated: {error}"),
                )
            }
        }
    }
}

/// Applies the node's operator to a numeric current value.
fn numeric_check(node: &PrerequisiteNode, current: f64, described: String) -> PrerequisiteCheck {
    let met = match (&node.operator, &node.required) {
        (CompareOp::Equals, RequiredValue::Number(n)) => current == *n,
        (CompareOp::GreaterThan, RequiredValue::Number(n)) => current > *n,
        (CompareOp::GreaterOrEqual, RequiredValue::Number(n)) => current >= *n,
        (CompareOp::LessThan, RequiredValue::Number(n)) => current < *n,
        (CompareOp::LessOrEqual, RequiredValue::Number(n)) => current <= *n,
        (CompareOp::Between, RequiredValue::Range(lo, hi)) => current >= *lo && current <= *hi,
        (op, required) => {
            return PrerequisiteCheck::invalid(
                node,
                format!("operator {op:?} does not apply to {required:?}"),
            )
        }
    };

    let progress = if met {
        100.0
    } else {
        match (&node.operator, &node.required) {
            (
                CompareOp::Equals | CompareOp::GreaterThan | CompareOp::GreaterOrEqual,
                RequiredValue::Number(n),
            ) if *n > 0.0 => current / n * 100.0,
            (CompareOp::Between, RequiredValue::Range(lo, _)) if *lo > 0.0 => current / lo * 100.0,
            _ => 0.0,
        }
    };

    PrerequisiteCheck::new(
        node,
        if met { CheckStatus::Met } else { CheckStatus::Unmet },
        Some(Value::Number(current)),
        progress,
        format!("{described} against requirement {:?}", node.required),
    )
}

/// The course ids a completion node refers to.
fn referenced_courses(node: &PrerequisiteNode) -> Result<Vec<CourseId>, String> {
    let raw: Vec<&str> = match (&node.reference, &node.required) {
        (Some(reference), _) => vec![reference.as_str()],
        (None, RequiredValue::Text(id)) => vec![id.as_str()],
        (None, RequiredValue::List(ids)) => ids.iter().map(String::as_str).collect(),
        (None, other) => {
            return Err(format!("{other:?} does not name a prerequisite course"));
        }
    };

    raw.into_iter()
        .map(|id| {
            id.parse::<Uuid>()
                .map_err(|_| format!("'{id}' is not a course id"))
        })
        .collect()
}

/// Σ estimate × unmet-fraction over blocking nodes, in whole hours, rounded
/// up. `None` when no blocking node carries an estimate.
fn estimate_hours(blocked_by: &[PrerequisiteCheck]) -> Option<u64> {
    let mut minutes = 0.0;
    let mut any_estimate = false;

    for check in blocked_by {
        if let Some(estimate) = check.prerequisite.metadata.estimated_minutes_to_complete {
            any_estimate = true;
            minutes += estimate * (100.0 - check.progress_percent) / 100.0;
        }
    }

    if any_estimate {
        Some((minutes / 60.0).ceil() as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn node(kind: PrerequisiteKind, operator: CompareOp, required: RequiredValue) -> PrerequisiteNode {
        PrerequisiteNode {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            kind,
            operator,
            required,
            reference: None,
            is_required: true,
            order_index: 0,
            active: true,
            metadata: NodeMetadata::default(),
        }
    }

    fn history() -> LearningHistory {
        LearningHistory {
            total_minutes: 400.0,
            ..LearningHistory::default()
        }
    }

    #[test]
    fn between_is_inclusive_on_both_ends() {
        let mut score_node = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::Between,
            RequiredValue::Range(70.0, 90.0),
        );
        score_node.reference = Some("final-exam".to_string());

        for (score, expected) in [(69.9, false), (70.0, true), (80.0, true), (90.0, true), (90.1, false)] {
            let mut history = history();
            history
                .assessment_scores
                .insert("final-exam".to_string(), score);
            let check = check_node(&score_node, &history);
            assert_eq!(check.is_met(), expected, "score {score}");
        }
    }

    #[test]
    fn missing_assessment_attempt_is_unmet_with_zero_progress() {
        let mut score_node = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(80.0),
        );
        score_node.reference = Some("final-exam".to_string());

        let check = check_node(&score_node, &history());
        assert_eq!(check.status, CheckStatus::Unmet);
        assert_eq!(check.progress_percent, 0.0);
        assert!(check.current_value.is_none());
        assert!(check.message.contains("no recorded attempt"));
    }

    #[test]
    fn score_progress_is_proportional() {
        let mut score_node = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(80.0),
        );
        score_node.reference = Some("final-exam".to_string());

        let mut history = history();
        history.assessment_scores.insert("final-exam".to_string(), 60.0);
        let check = check_node(&score_node, &history);
        assert_eq!(check.status, CheckStatus::Unmet);
        assert!((check.progress_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unexercised_skill_counts_as_level_zero() {
        let mut skill_node = node(
            PrerequisiteKind::SkillLevel,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(2.0),
        );
        skill_node.reference = Some("rust".to_string());

        let check = check_node(&skill_node, &history());
        assert_eq!(check.status, CheckStatus::Unmet);
        assert_eq!(check.current_value, Some(Value::Number(0.0)));
    }

    #[test]
    fn time_spent_uses_total_without_a_reference() {
        let time_node = node(
            PrerequisiteKind::TimeSpent,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(300.0),
        );
        let check = check_node(&time_node, &history());
        assert_eq!(check.status, CheckStatus::Met);
    }

    #[test]
    fn time_spent_scopes_to_a_course_when_referenced() {
        let course = Uuid::new_v4();
        let mut time_node = node(
            PrerequisiteKind::TimeSpent,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(100.0),
        );
        time_node.reference = Some(course.to_string());

        let mut history = history();
        history.minutes_per_course.insert(course, 45.0);
        let check = check_node(&time_node, &history);
        assert_eq!(check.status, CheckStatus::Unmet);
        assert_eq!(check.current_value, Some(Value::Number(45.0)));
    }

    #[test]
    fn certification_membership() {
        let mut history = history();
        history.certifications.insert("first-aid".to_string());

        let any_of = node(
            PrerequisiteKind::Certification,
            CompareOp::In,
            RequiredValue::List(vec!["first-aid".to_string(), "cpr".to_string()]),
        );
        assert!(check_node(&any_of, &history).is_met());

        let all_of = node(
            PrerequisiteKind::Certification,
            CompareOp::Equals,
            RequiredValue::List(vec!["first-aid".to_string(), "cpr".to_string()]),
        );
        let check = check_node(&all_of, &history);
        assert_eq!(check.status, CheckStatus::Unmet);
        assert!((check.progress_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_operator_kind_combination_is_skipped_not_unmet() {
        let mut bad = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::In,
            RequiredValue::Number(80.0),
        );
        bad.reference = Some("final-exam".to_string());
        let mut history = history();
        history.assessment_scores.insert("final-exam".to_string(), 99.0);

        let check = check_node(&bad, &history);
        assert_eq!(
            check.status,
            CheckStatus::Skipped(SkipReason::InvalidDefinition)
        );
        assert!(check.message.contains("cannot be evaluated"));
    }

    #[test]
    fn custom_rule_over_learning_history() {
        let mut rule = node(
            PrerequisiteKind::CustomRule,
            CompareOp::Equals,
            RequiredValue::Number(1.0),
        );
        rule.metadata.custom_rule =
            Some("total_minutes >= 300 && skills.rust >= 1".to_string());

        let mut history = history();
        history.skill_levels.insert("rust".to_string(), 2.0);
        assert!(check_node(&rule, &history).is_met());

        history.skill_levels.insert("rust".to_string(), 0.5);
        assert!(!check_node(&rule, &history).is_met());
    }

    #[test]
    fn malformed_required_rule_is_skipped_malformed_optional_rule_warns() {
        let mut rule = node(
            PrerequisiteKind::CustomRule,
            CompareOp::Equals,
            RequiredValue::Number(1.0),
        );
        rule.metadata.custom_rule = Some("total_minutes >= ".to_string());

        let check = check_node(&rule, &history());
        assert_eq!(
            check.status,
            CheckStatus::Skipped(SkipReason::InvalidDefinition)
        );

        rule.is_required = false;
        let check = check_node(&rule, &history());
        assert_eq!(check.status, CheckStatus::Unmet);
        assert!(check.message.contains("could not be evaluated"));
    }

    // --- evaluator tests with in-memory sources ---

    struct FixedPrerequisites {
        nodes: Vec<PrerequisiteNode>,
        inactive_courses: Vec<CourseId>,
        liveness_queries: Mutex<usize>,
    }

    impl FixedPrerequisites {
        fn new(nodes: Vec<PrerequisiteNode>) -> Self {
            Self {
                nodes,
                inactive_courses: Vec::new(),
                liveness_queries: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PrerequisiteSource for FixedPrerequisites {
        async fn prerequisites(&self, course_id: CourseId) -> Vec<PrerequisiteNode> {
            self.nodes
                .iter()
                .filter(|node| node.course_id == course_id)
                .cloned()
                .collect()
        }

        async fn course_is_active(&self, course_id: CourseId) -> bool {
            *self.liveness_queries.lock().unwrap() += 1;
            !self.inactive_courses.contains(&course_id)
        }
    }

    struct FixedHistory(LearningHistory);

    #[async_trait]
    impl LearningHistorySource for FixedHistory {
        async fn snapshot(&self, _subject_id: SubjectId) -> LearningHistory {
            self.0.clone()
        }
    }

    fn evaluator(
        nodes: Vec<PrerequisiteNode>,
        history: LearningHistory,
    ) -> EligibilityEvaluator {
        EligibilityEvaluator::new(
            Arc::new(FixedPrerequisites::new(nodes)),
            Arc::new(FixedHistory(history)),
        )
    }

    fn completion_node(course_id: CourseId, prerequisite: CourseId) -> PrerequisiteNode {
        let mut n = node(
            PrerequisiteKind::CourseCompletion,
            CompareOp::Equals,
            RequiredValue::Text(prerequisite.to_string()),
        );
        n.course_id = course_id;
        n
    }

    #[tokio::test]
    async fn course_without_prerequisites_is_always_eligible() {
        let evaluator = evaluator(Vec::new(), LearningHistory::default());
        let report = evaluator
            .check_eligibility(Uuid::new_v4(), Uuid::new_v4())
            .await;

        assert!(report.is_eligible);
        assert!(report.blocked_by.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn inactive_nodes_are_ignored() {
        let course_id = Uuid::new_v4();
        let mut inactive = completion_node(course_id, Uuid::new_v4());
        inactive.active = false;

        let evaluator = evaluator(vec![inactive], LearningHistory::default());
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;
        assert!(report.is_eligible);
    }

    #[tokio::test]
    async fn unmet_required_node_blocks_and_lists_missing_course() {
        let course_id = Uuid::new_v4();
        let prerequisite = Uuid::new_v4();

        let evaluator = evaluator(
            vec![completion_node(course_id, prerequisite)],
            LearningHistory::default(),
        );
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert!(!report.is_eligible);
        assert_eq!(report.blocked_by.len(), 1);
        assert_eq!(report.missing_ids, vec![prerequisite]);
    }

    #[tokio::test]
    async fn completed_prerequisite_satisfies_the_node() {
        let course_id = Uuid::new_v4();
        let prerequisite = Uuid::new_v4();
        let mut history = LearningHistory::default();
        history.completed_courses.insert(prerequisite);

        let evaluator = evaluator(vec![completion_node(course_id, prerequisite)], history);
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;
        assert!(report.is_eligible);
    }

    #[tokio::test]
    async fn orphaned_reference_is_skipped_not_blocking() {
        let course_id = Uuid::new_v4();
        let dead_course = Uuid::new_v4();

        let mut source = FixedPrerequisites::new(vec![completion_node(course_id, dead_course)]);
        source.inactive_courses.push(dead_course);

        let evaluator = EligibilityEvaluator::new(
            Arc::new(source),
            Arc::new(FixedHistory(LearningHistory::default())),
        );
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert!(report.is_eligible);
        assert!(report.blocked_by.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].status,
            CheckStatus::Skipped(SkipReason::OrphanedReference)
        );
    }

    #[tokio::test]
    async fn optional_unmet_node_warns_without_blocking() {
        let course_id = Uuid::new_v4();
        let mut optional = completion_node(course_id, Uuid::new_v4());
        optional.is_required = false;

        let evaluator = evaluator(vec![optional], LearningHistory::default());
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert!(report.is_eligible);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn remediation_estimate_rounds_up_to_hours() {
        let course_id = Uuid::new_v4();
        // One blocker at 40% progress with a 100-minute estimate:
        // 100 × 0.6 = 60 minutes → 1 hour.
        let mut score_node = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::GreaterOrEqual,
            RequiredValue::Number(100.0),
        );
        score_node.course_id = course_id;
        score_node.reference = Some("midterm".to_string());
        score_node.metadata.estimated_minutes_to_complete = Some(100.0);

        let mut history = LearningHistory::default();
        history.assessment_scores.insert("midterm".to_string(), 40.0);

        let evaluator = evaluator(vec![score_node], history);
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert!(!report.is_eligible);
        assert_eq!(report.estimated_hours_to_eligibility, Some(1));
    }

    #[tokio::test]
    async fn no_estimate_when_blockers_carry_none() {
        let course_id = Uuid::new_v4();
        let evaluator = evaluator(
            vec![completion_node(course_id, Uuid::new_v4())],
            LearningHistory::default(),
        );
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;
        assert!(!report.is_eligible);
        assert_eq!(report.estimated_hours_to_eligibility, None);
    }

    #[tokio::test]
    async fn nodes_are_evaluated_in_order_index_order() {
        let course_id = Uuid::new_v4();
        let mut first = completion_node(course_id, Uuid::new_v4());
        first.order_index = 2;
        let mut second = completion_node(course_id, Uuid::new_v4());
        second.order_index = 1;

        let first_id = first.id;
        let second_id = second.id;

        let evaluator = evaluator(vec![first, second], LearningHistory::default());
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert_eq!(report.blocked_by.len(), 2);
        assert_eq!(report.blocked_by[0].prerequisite.id, second_id);
        assert_eq!(report.blocked_by[1].prerequisite.id, first_id);
    }

    #[tokio::test]
    async fn one_malformed_node_does_not_poison_the_rest() {
        let course_id = Uuid::new_v4();
        let prerequisite = Uuid::new_v4();

        let mut malformed = node(
            PrerequisiteKind::AssessmentScore,
            CompareOp::Between,
            RequiredValue::Text("not-a-range".to_string()),
        );
        malformed.course_id = course_id;
        malformed.reference = Some("quiz".to_string());

        let healthy = completion_node(course_id, prerequisite);

        let mut history = LearningHistory::default();
        history.completed_courses.insert(prerequisite);
        history.assessment_scores.insert("quiz".to_string(), 50.0);

        let evaluator = evaluator(vec![malformed, healthy], history);
        let report = evaluator.check_eligibility(course_id, Uuid::new_v4()).await;

        assert!(report.is_eligible);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].status,
            CheckStatus::Skipped(SkipReason::InvalidDefinition)
        );
    }
}
