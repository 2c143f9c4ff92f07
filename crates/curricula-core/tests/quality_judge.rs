mod common;

use common::clean_draft;
use curricula_core::{
    analyze, ConfusionSignal, Cooldown, Critique, CurriculumDraft, DeterministicQualityJudge,
    Diagnostic, DiagnosticSource, Dimension, JudgeConfig, Node, QualityReport, RepairAction,
    RepairPlanner, RuleId, Severity,
};

fn judge(draft: &CurriculumDraft, critique: Option<&Critique>) -> QualityReport {
    DeterministicQualityJudge::new(JudgeConfig::default()).evaluate(draft, &analyze(draft), critique)
}

#[test]
fn clean_draft_is_accepted_with_full_marks() {
    let report = judge(&clean_draft(), None);

    assert!(report.diagnostics.is_empty(), "unexpected: {:?}", report.diagnostics);
    assert_eq!(report.aggregate, 100);
    assert_eq!(report.hard_gate_count, 0);
    assert!(report.accepted);
    for dimension in Dimension::ALL {
        assert_eq!(report.score(dimension), 100);
    }
}

#[test]
fn mutual_prerequisite_hard_gates_on_cycle() {
    let mut draft = clean_draft();
    draft.nodes[0].prerequisites = vec!["N2".to_string()];

    let report = judge(&draft, None);
    assert!(report.has_rule(RuleId::Cycle));
    assert!(report.hard_gate_count >= 1);
    assert!(!report.accepted);
    assert!(report.score(Dimension::StructuralValidity) <= 50);
}

fn rewires(report: &QualityReport, node_id: &str) -> bool {
    let expected = RepairAction::RewirePrereqs {
        node_id: node_id.to_string(),
    };
    RepairPlanner::default()
        .plan(report, &Cooldown::new())
        .actions
        .iter()
        .any(|planned| planned.action == expected)
}

#[test]
fn cycle_names_only_nodes_on_the_cycle() {
    // "A0" sorts first but only depends on the N1 -> N2 -> N3 -> N1 loop.
    let mut draft = clean_draft();
    draft.nodes[0].prerequisites = vec!["N3".to_string()];
    draft.nodes.push(
        Node::new("A0", "Cache review", "Explain a cache lookup end to end")
            .with_prerequisites(["N3"])
            .with_estimate(30.0),
    );

    let report = judge(&draft, None);
    let cycle = report
        .diagnostics
        .iter()
        .find(|d| d.rule == RuleId::Cycle)
        .expect("cycle diagnostic");
    assert_eq!(cycle.node_ids, vec!["N1", "N2", "N3"]);
    assert_eq!(cycle.primary_node(), Some("N1"));
    assert!(rewires(&report, "N1"));
    assert!(!rewires(&report, "A0"));
}

#[test]
fn dangling_prerequisite_is_a_hard_gate() {
    let mut draft = clean_draft();
    draft.nodes[1].prerequisites.push("N9".to_string());

    let report = judge(&draft, None);
    let missing: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.rule == RuleId::MissingPrerequisite)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].severity, Severity::HardFail);
    assert_eq!(missing[0].primary_node(), Some("N2"));
    assert!(report.hard_gate_count >= 1);
    assert!(!report.accepted);
    assert!(rewires(&report, "N2"));
}

#[test]
fn self_prerequisite_is_a_hard_gate() {
    let mut draft = clean_draft();
    draft.nodes[2].prerequisites.push("N3".to_string());

    let report = judge(&draft, None);
    assert!(report.has_rule(RuleId::SelfPrerequisite));
    assert!(report
        .diagnostics
        .iter()
        .filter(|d| d.rule == RuleId::SelfPrerequisite)
        .all(|d| d.is_hard_gate() && d.primary_node() == Some("N3")));
    assert!(report.hard_gate_count >= 1);
    assert!(!report.accepted);
    assert!(rewires(&report, "N3"));
}

#[test]
fn compound_capability_is_an_atomicity_hard_gate() {
    let mut draft = clean_draft();
    draft.nodes[1].capability = "implement and test the cache".to_string();

    let report = judge(&draft, None);
    let compound: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.rule == RuleId::CompoundCapability)
        .collect();
    assert_eq!(compound.len(), 1);
    assert_eq!(compound[0].severity, Severity::HardFail);
    assert_eq!(compound[0].primary_node(), Some("N2"));
    assert_eq!(report.score(Dimension::Atomicity), 80);
    assert!(!report.accepted);
}

#[test]
fn judging_is_idempotent() {
    let mut draft = clean_draft();
    draft.nodes[2].estimate_minutes = 400.0;
    draft.nodes[0].mastery_check.pass_criteria = "Looks good".to_string();

    let first = judge(&draft, None);
    let second = judge(&draft, None);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn critic_cannot_hard_gate() {
    let critique = Critique {
        diagnostics: vec![Diagnostic::new(
            RuleId::ConceptJump,
            Severity::HardFail,
            "novice lost between N1 and N2",
        )
        .for_node("N2")
        .from_critic()],
        confusion: Default::default(),
    };

    let report = judge(&clean_draft(), Some(&critique));
    assert_eq!(report.hard_gate_count, 0);
    let merged = report
        .diagnostics
        .iter()
        .find(|d| d.rule == RuleId::ConceptJump)
        .expect("critic diagnostic merged");
    assert_eq!(merged.severity, Severity::Warn);
    assert_eq!(merged.source, DiagnosticSource::Critic);
    assert_eq!(report.score(Dimension::LearnerPathCoherence), 90);
    assert!(report.accepted);
}

#[test]
fn critic_findings_deduct_from_learner_coherence_only() {
    let critique = Critique {
        diagnostics: vec![Diagnostic::new(
            RuleId::CompoundCapability,
            Severity::Warn,
            "N2 reads as two skills to a novice",
        )
        .for_node("N2")
        .from_critic()],
        confusion: Default::default(),
    };

    let report = judge(&clean_draft(), Some(&critique));
    assert_eq!(report.score(Dimension::Atomicity), 100);
    assert_eq!(report.score(Dimension::LearnerPathCoherence), 90);
    let split = RepairAction::SplitNode {
        node_id: "N2".to_string(),
    };
    let plan = RepairPlanner::default().plan(&report, &Cooldown::new());
    assert!(plan.actions.iter().any(|planned| planned.action == split));
}

#[test]
fn high_confusion_flags_the_node() {
    let mut critique = Critique::default();
    critique.confusion.insert(
        "N3".to_string(),
        ConfusionSignal {
            score: 75,
            summary: "staleness is never defined".to_string(),
        },
    );
    critique.confusion.insert(
        "N1".to_string(),
        ConfusionSignal {
            score: 20,
            summary: String::new(),
        },
    );

    let report = judge(&clean_draft(), Some(&critique));
    let flagged: Vec<&str> = report
        .diagnostics
        .iter()
        .filter(|d| d.rule == RuleId::NoviceConfusion)
        .filter_map(|d| d.primary_node())
        .collect();
    assert_eq!(flagged, vec!["N3"]);
}

#[test]
fn missing_mastery_task_blocks_acceptance() {
    let mut draft = clean_draft();
    draft.nodes[2].mastery_check.task = "   ".to_string();

    let report = judge(&draft, None);
    assert!(report.has_rule(RuleId::MissingTask));
    assert_eq!(report.hard_gate_count, 1);
    assert!(!report.accepted);
}

#[test]
fn learner_floor_blocks_otherwise_passing_draft() {
    let critique = Critique {
        diagnostics: ["N1", "N2", "N3"]
            .iter()
            .map(|id| {
                Diagnostic::new(RuleId::PrerequisiteOverload, Severity::Warn, "overloaded")
                    .for_node(*id)
                    .from_critic()
            })
            .collect(),
        confusion: Default::default(),
    };

    let report = judge(&clean_draft(), Some(&critique));
    assert_eq!(report.score(Dimension::LearnerPathCoherence), 70);
    assert!(report.accepted);

    let strict = DeterministicQualityJudge::new(JudgeConfig {
        learner_floor: 71,
        ..Default::default()
    });
    let draft = clean_draft();
    let report = strict.evaluate(&draft, &analyze(&draft), Some(&critique));
    assert_eq!(report.hard_gate_count, 0);
    assert!(report.aggregate >= 82);
    assert!(!report.accepted);
}

#[test]
fn empty_draft_is_a_hard_gate() {
    let report = judge(&CurriculumDraft::new("caching", Vec::new()), None);
    assert!(report.has_rule(RuleId::EmptyDraft));
    assert_eq!(report.score(Dimension::StructuralValidity), 0);
    assert!(!report.accepted);
}
