//! # Enrollment Eligibility Example
//!
//! Declares a course with several prerequisite nodes, then checks two
//! subjects against it and prints the resulting reports: blockers, advisory
//! warnings, and the remediation estimate.
//!
//! To run this example:
//! ```
//! cargo run --example enrollment_eligibility
//! ```

use async_trait::async_trait;
use coursegate::{
    CompareOp, CourseId, EligibilityEvaluator, LearningHistory, LearningHistorySource,
    NodeMetadata, PrerequisiteKind, PrerequisiteNode, PrerequisiteSource, RequiredValue, SubjectId,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

struct DemoCatalog {
    nodes: Vec<PrerequisiteNode>,
}

#[async_trait]
impl PrerequisiteSource for DemoCatalog {
    async fn prerequisites(&self, course_id: CourseId) -> Vec<PrerequisiteNode> {
        self.nodes
            .iter()
            .filter(|node| node.course_id == course_id)
            .cloned()
            .collect()
    }

    async fn course_is_active(&self, _course_id: CourseId) -> bool {
        true
    }
}

struct DemoHistories {
    histories: HashMap<SubjectId, LearningHistory>,
}

#[async_trait]
impl LearningHistorySource for DemoHistories {
    async fn snapshot(&self, subject_id: SubjectId) -> LearningHistory {
        self.histories.get(&subject_id).cloned().unwrap_or_default()
    }
}

fn node(
    course_id: CourseId,
    kind: PrerequisiteKind,
    operator: CompareOp,
    required: RequiredValue,
    reference: Option<&str>,
    is_required: bool,
    order_index: i32,
    estimated_minutes: Option<f64>,
) -> PrerequisiteNode {
    PrerequisiteNode {
        id: Uuid::new_v4(),
        course_id,
        kind,
        operator,
        required,
        reference: reference.map(str::to_string),
        is_required,
        order_index,
        active: true,
        metadata: NodeMetadata {
            custom_rule: None,
            estimated_minutes_to_complete: estimated_minutes,
        },
    }
}

#[tokio::main]
async fn main() {
    let advanced_rust = Uuid::new_v4();
    let intro_rust = Uuid::new_v4();

    let mut custom = node(
        advanced_rust,
        PrerequisiteKind::CustomRule,
        CompareOp::Equals,
        RequiredValue::Number(1.0),
        None,
        false,
        3,
        None,
    );
    custom.metadata.custom_rule = Some("total_minutes >= 600 && completed_count >= 1".to_string());

    let catalog = DemoCatalog {
        nodes: vec![
            node(
                advanced_rust,
                PrerequisiteKind::CourseCompletion,
                CompareOp::Equals,
                RequiredValue::Text(intro_rust.to_string()),
                None,
                true,
                0,
                Some(480.0),
            ),
            node(
                advanced_rust,
                PrerequisiteKind::AssessmentScore,
                CompareOp::Between,
                RequiredValue::Range(70.0, 100.0),
                Some("rust-basics-exam"),
                true,
                1,
                Some(120.0),
            ),
            node(
                advanced_rust,
                PrerequisiteKind::SkillLevel,
                CompareOp::GreaterOrEqual,
                RequiredValue::Number(2.0),
                Some("ownership"),
                false,
                2,
                None,
            ),
            custom,
        ],
    };

    let ready_subject = Uuid::new_v4();
    let new_subject = Uuid::new_v4();

    let mut ready_history = LearningHistory::default();
    ready_history.completed_courses.insert(intro_rust);
    ready_history
        .assessment_scores
        .insert("rust-basics-exam".to_string(), 84.0);
    ready_history.skill_levels.insert("ownership".to_string(), 3.0);
    ready_history.total_minutes = 900.0;

    let histories = DemoHistories {
        histories: HashMap::from([(ready_subject, ready_history)]),
    };

    let evaluator = EligibilityEvaluator::new(Arc::new(catalog), Arc::new(histories));

    for (label, subject) in [("ready subject", ready_subject), ("new subject", new_subject)] {
        let report = evaluator.check_eligibility(advanced_rust, subject).await;

        println!("=== {label} ===\n");
        println!("  eligible: {}", report.is_eligible);
        for check in &report.blocked_by {
            println!(
                "  BLOCKED by {:?} ({:.0}% there): {}",
                check.prerequisite.kind, check.progress_percent, check.message
            );
        }
        for check in &report.warnings {
            println!(
                "  warning {:?}: {}",
                check.prerequisite.kind, check.message
            );
        }
        if let Some(hours) = report.estimated_hours_to_eligibility {
            println!("  estimated effort to eligibility: ~{hours}h");
        }
        println!();
    }
}
