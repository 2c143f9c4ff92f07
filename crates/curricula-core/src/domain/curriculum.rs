//! Curriculum draft model and boundary validation.
//!
//! Drafts arrive from untrusted generative collaborators as raw JSON. They are
//! decoded strictly (unknown fields rejected, closed enums) and then checked
//! against the structural invariants a draft must satisfy before any local
//! analysis runs. Everything else (cycles, atomicity, dangling prerequisites)
//! is left to the judge so it can be routed through repair.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{CurriculaError, Result};

/// Kind of learning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[serde(alias = "documentation")]
    Doc,
    Paper,
    Video,
    Book,
    Spec,
    Other,
}

/// Pedagogical role a resource plays for its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    Definition,
    Example,
    Reference,
    Other,
}

/// A single learning resource attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ResourceRole>,
}

impl Resource {
    pub fn new(title: impl Into<String>, url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            kind,
            citation: None,
            role: None,
        }
    }

    pub fn with_role(mut self, role: ResourceRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }
}

/// Mastery task plus the criteria used to judge it.
///
/// Both fields default to empty so that a draft missing them still decodes
/// and the judge can flag it as a hard gate instead of failing the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasteryCheck {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub pass_criteria: String,
}

/// One atomic learning node in the curriculum DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    pub id: String,
    pub title: String,
    pub capability: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub core_ideas: Vec<String>,
    #[serde(default)]
    pub pitfalls: Vec<String>,
    #[serde(default)]
    pub mastery_check: MasteryCheck,
    pub estimate_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_confidence: Option<f64>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Node {
    /// Minimal node with a 60 minute estimate and no prerequisites.
    pub fn new(id: impl Into<String>, title: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            capability: capability.into(),
            prerequisites: Vec::new(),
            core_ideas: Vec::new(),
            pitfalls: Vec::new(),
            mastery_check: MasteryCheck::default(),
            estimate_minutes: 60.0,
            estimate_confidence: None,
            resources: Vec::new(),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_estimate(mut self, minutes: f64) -> Self {
        self.estimate_minutes = minutes;
        self
    }

    pub fn with_mastery(mut self, task: impl Into<String>, pass_criteria: impl Into<String>) -> Self {
        self.mastery_check = MasteryCheck {
            task: task.into(),
            pass_criteria: pass_criteria.into(),
        };
        self
    }

    pub fn with_core_ideas<I, S>(mut self, ideas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_ideas = ideas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn has_mastery_task(&self) -> bool {
        !self.mastery_check.task.trim().is_empty()
    }

    pub fn has_pass_criteria(&self) -> bool {
        !self.mastery_check.pass_criteria.trim().is_empty()
    }
}

/// Status of an open question attached to the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Open,
    Resolved,
}

/// Unresolved question raised during generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenQuestion {
    pub question: String,
    #[serde(default)]
    pub related_nodes: Vec<String>,
    pub status: QuestionStatus,
}

/// A candidate curriculum. Graph-derived data is never stored here; it is
/// recomputed by [`crate::graph::analyze`] on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurriculumDraft {
    pub topic: String,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_questions: Vec<OpenQuestion>,
}

impl CurriculumDraft {
    pub fn new(topic: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            topic: topic.into(),
            nodes,
            open_questions: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn total_minutes(&self) -> f64 {
        self.nodes.iter().map(|n| n.estimate_minutes).sum()
    }

    /// Decode a collaborator payload into a draft, rejecting anything that
    /// does not match the schema or violates a structural invariant.
    pub fn from_response(stage: &str, value: serde_json::Value) -> Result<Self> {
        let draft: CurriculumDraft =
            serde_json::from_value(value).map_err(|e| CurriculaError::SchemaViolation {
                stage: stage.to_string(),
                detail: e.to_string(),
            })?;
        let problems = draft.schema_problems();
        if !problems.is_empty() {
            return Err(CurriculaError::SchemaViolation {
                stage: stage.to_string(),
                detail: problems.join("; "),
            });
        }
        Ok(draft)
    }

    /// Structural schema problems. Empty when the draft is well-formed.
    pub fn schema_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.topic.trim().is_empty() {
            problems.push("topic must be a non-empty string".to_string());
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !is_valid_node_id(&node.id) {
                problems.push(format!("node id {:?} is not a valid identifier", node.id));
            }
            if !seen.insert(node.id.as_str()) {
                problems.push(format!("duplicate node id {}", node.id));
            }
            if node.title.trim().is_empty() {
                problems.push(format!("node {}: title must be non-empty", node.id));
            }
            if !node.estimate_minutes.is_finite() || node.estimate_minutes <= 0.0 {
                problems.push(format!("node {}: estimate_minutes must be > 0", node.id));
            }
            if let Some(confidence) = node.estimate_confidence {
                if !(0.0..=1.0).contains(&confidence) {
                    problems.push(format!(
                        "node {}: estimate_confidence must be in [0, 1]",
                        node.id
                    ));
                }
            }
            for (idx, resource) in node.resources.iter().enumerate() {
                if !is_well_formed_url(&resource.url) {
                    problems.push(format!(
                        "node {}: resources[{}].url {:?} is not a well-formed URL",
                        node.id, idx, resource.url
                    ));
                }
            }
        }
        problems
    }
}

/// Proposer input describing what the curriculum should teach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub goal: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub scope_in: Vec<String>,
    #[serde(default)]
    pub scope_out: Vec<String>,
    #[serde(default)]
    pub focus_terms: Vec<String>,
    #[serde(default)]
    pub misconceptions: Vec<String>,
    #[serde(default)]
    pub evidence_mode: EvidenceMode,
    #[serde(default)]
    pub max_prerequisites_per_node: Option<usize>,
}

impl TopicSpec {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }
}

/// How much supporting evidence each node must carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    #[default]
    Minimal,
    Standard,
    Strict,
}

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid id regex"))
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[A-Za-z0-9\-._~%]+(:\d+)?(/\S*)?$").expect("valid url regex"))
}

/// Node ids are stable, non-empty ASCII identifiers.
pub fn is_valid_node_id(id: &str) -> bool {
    id_pattern().is_match(id)
}

/// `http`/`https` URL with a host and no whitespace.
pub fn is_well_formed_url(url: &str) -> bool {
    url_pattern().is_match(url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Cache basics",
            "capability": "Explain cache eviction",
            "prerequisites": [],
            "core_ideas": ["eviction"],
            "pitfalls": [],
            "mastery_check": {"task": "Write a note", "pass_criteria": "Must include LRU"},
            "estimate_minutes": 45,
            "resources": [{"title": "LRU", "url": "https://example.com/lru", "kind": "doc"}]
        })
    }

    #[test]
    fn test_decode_valid_draft() {
        let value = json!({"topic": "caching", "nodes": [node_json("N1")]});
        let draft = CurriculumDraft::from_response("proposer", value).expect("decode");
        assert_eq!(draft.nodes.len(), 1);
        assert_eq!(draft.nodes[0].resources[0].kind, ResourceKind::Doc);
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let mut node = node_json("N1");
        node["difficulty"] = json!("hard");
        let value = json!({"topic": "caching", "nodes": [node]});
        let err = CurriculumDraft::from_response("proposer", value).unwrap_err();
        assert!(matches!(err, CurriculaError::SchemaViolation { .. }));
    }

    #[test]
    fn test_decode_rejects_duplicate_ids_and_bad_urls() {
        let mut second = node_json("N1");
        second["resources"][0]["url"] = json!("not a url");
        let value = json!({"topic": "caching", "nodes": [node_json("N1"), second]});
        match CurriculumDraft::from_response("repair", value).unwrap_err() {
            CurriculaError::SchemaViolation { stage, detail } => {
                assert_eq!(stage, "repair");
                assert!(detail.contains("duplicate node id N1"));
                assert!(detail.contains("well-formed URL"));
            }
            other => panic!("expected SchemaViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_mastery_decodes_as_empty() {
        let mut node = node_json("N1");
        node.as_object_mut().unwrap().remove("mastery_check");
        let value = json!({"topic": "caching", "nodes": [node]});
        let draft = CurriculumDraft::from_response("proposer", value).expect("decode");
        assert!(!draft.nodes[0].has_mastery_task());
    }

    #[test]
    fn test_url_and_id_validation() {
        assert!(is_well_formed_url("https://doc.rust-lang.org/book/"));
        assert!(is_well_formed_url("http://localhost:8080/x"));
        assert!(!is_well_formed_url("ftp://example.com"));
        assert!(!is_well_formed_url(""));
        assert!(is_valid_node_id("N12"));
        assert!(is_valid_node_id("cache.intro-1"));
        assert!(!is_valid_node_id(""));
        assert!(!is_valid_node_id("has space"));
    }
}
