//! Research record: the durable state of one research workflow.
//!
//! The record is an explicit state machine. Stage handlers never poke at
//! `status` or `stage_progress` directly; they call [`ResearchRecord::complete_stage`]
//! or [`ResearchRecord::fail_stage`], which refuse any transition that would
//! break the record invariants:
//!
//! - `completed` ⇒ every stage completed and a report present
//! - `failed` ⇒ exactly one stage failed, every later stage still pending
//! - `initiated` ⇒ no stage failed, at least one stage not completed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TransitionError;

/// How broad the gathering stage should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl Depth {
    /// Maximum number of plan topics researched at this depth.
    pub fn topic_count(&self) -> usize {
        match self {
            Depth::Quick => 3,
            Depth::Standard => 4,
            Depth::Deep => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Quick => "quick",
            Depth::Standard => "standard",
            Depth::Deep => "deep",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            other => Err(format!(
                "unknown depth '{other}' (expected quick, standard, or deep)"
            )),
        }
    }
}

/// Overall lifecycle status of a research record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Initiated,
    Failed,
    Completed,
}

impl ResearchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResearchStatus::Initiated)
    }
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResearchStatus::Initiated => "initiated",
            ResearchStatus::Failed => "failed",
            ResearchStatus::Completed => "completed",
        })
    }
}

/// The four sequential processing phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Gathering,
    Analysis,
    Synthesis,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Planning,
        Stage::Gathering,
        Stage::Analysis,
        Stage::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Gathering => "gathering",
            Stage::Analysis => "analysis",
            Stage::Synthesis => "synthesis",
        }
    }

    fn index(&self) -> usize {
        match self {
            Stage::Planning => 0,
            Stage::Gathering => 1,
            Stage::Analysis => 2,
            Stage::Synthesis => 3,
        }
    }

    /// The stage that must complete before this one may run.
    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageState::Pending => "pending",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
        })
    }
}

/// Per-stage progress map. Starts all pending; entries only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageProgress {
    planning: StageState,
    gathering: StageState,
    analysis: StageState,
    synthesis: StageState,
}

impl StageProgress {
    pub fn get(&self, stage: Stage) -> StageState {
        match stage {
            Stage::Planning => self.planning,
            Stage::Gathering => self.gathering,
            Stage::Analysis => self.analysis,
            Stage::Synthesis => self.synthesis,
        }
    }

    fn set(&mut self, stage: Stage, state: StageState) {
        let slot = match stage {
            Stage::Planning => &mut self.planning,
            Stage::Gathering => &mut self.gathering,
            Stage::Analysis => &mut self.analysis,
            Stage::Synthesis => &mut self.synthesis,
        };
        *slot = state;
    }

    /// Iterate `(stage, state)` pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, StageState)> + '_ {
        Stage::ALL.into_iter().map(|s| (s, self.get(s)))
    }

    pub fn all_completed(&self) -> bool {
        self.iter().all(|(_, state)| state == StageState::Completed)
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.iter()
            .find(|(_, state)| *state == StageState::Failed)
            .map(|(stage, _)| stage)
    }
}

// ── Artifacts ───────────────────────────────────────────────────────────────

/// Output of the planning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    #[serde(default)]
    pub research_topics: Vec<String>,

    #[serde(default)]
    pub key_questions: Vec<String>,

    #[serde(default)]
    pub approach: String,

    /// Estimated time in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
}

/// Output of the gathering stage for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Filled in from the plan topic when the model leaves it out
    #[serde(default)]
    pub topic: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub key_points: Vec<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Output of the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub overall_assessment: String,

    #[serde(default)]
    pub key_insights: Vec<String>,

    #[serde(default)]
    pub patterns_identified: Vec<String>,

    #[serde(default)]
    pub gaps: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Output of the synthesis stage: the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub executive_summary: String,

    #[serde(default)]
    pub methodology: String,

    #[serde(default)]
    pub findings_summary: String,

    #[serde(default)]
    pub key_takeaways: Vec<String>,

    #[serde(default)]
    pub conclusions: String,

    #[serde(default)]
    pub next_steps: Vec<String>,

    /// "high", "medium", or "low"
    pub confidence_level: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

/// A successful stage result, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum StageArtifact {
    Plan(ResearchPlan),
    Findings(Vec<Finding>),
    Analysis(Analysis),
    Report(Report),
}

impl StageArtifact {
    pub fn stage(&self) -> Stage {
        match self {
            StageArtifact::Plan(_) => Stage::Planning,
            StageArtifact::Findings(_) => Stage::Gathering,
            StageArtifact::Analysis(_) => Stage::Analysis,
            StageArtifact::Report(_) => Stage::Synthesis,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            StageArtifact::Plan(plan) => serde_json::to_value(plan),
            StageArtifact::Findings(findings) => serde_json::to_value(findings),
            StageArtifact::Analysis(analysis) => serde_json::to_value(analysis),
            StageArtifact::Report(report) => serde_json::to_value(report),
        }
    }
}

/// Richer failure context stored next to the user-facing `error` text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// The raw underlying error message
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub suggestion: String,
}

// ── Record ──────────────────────────────────────────────────────────────────

/// Where a record currently sits in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for this stage to run
    Awaiting(Stage),
    Completed,
    /// Terminated by a failure in this stage
    Failed(Stage),
}

/// The durable object tracking one workflow's inputs, progress, artifacts,
/// and terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRecord {
    #[serde(rename = "researchId")]
    pub id: String,
    pub query: String,
    pub depth: Depth,
    pub status: ResearchStatus,
    pub stage_progress: StageProgress,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ResearchPlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchRecord {
    /// Create a fresh record: `initiated`, every stage pending.
    pub fn new(query: impl Into<String>, depth: Depth) -> Self {
        Self {
            id: format!("research-{}", Uuid::new_v4()),
            query: query.into(),
            depth,
            status: ResearchStatus::Initiated,
            stage_progress: StageProgress::default(),
            plan: None,
            findings: None,
            analysis: None,
            report: None,
            error: None,
            error_details: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.status {
            ResearchStatus::Completed => Phase::Completed,
            ResearchStatus::Failed => {
                Phase::Failed(self.stage_progress.failed_stage().unwrap_or(Stage::Planning))
            }
            ResearchStatus::Initiated => Phase::Awaiting(
                self.stage_progress
                    .iter()
                    .find(|(_, state)| *state != StageState::Completed)
                    .map(|(stage, _)| stage)
                    .unwrap_or(Stage::Synthesis),
            ),
        }
    }

    /// Check that `stage` may run now: record not terminal, stage pending,
    /// predecessor completed.
    pub fn ensure_can_run(&self, stage: Stage) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                status: self.status,
            });
        }

        let state = self.stage_progress.get(stage);
        if state != StageState::Pending {
            return Err(TransitionError::StageNotPending { stage, state });
        }

        if let Some(prerequisite) = stage.previous() {
            if self.stage_progress.get(prerequisite) != StageState::Completed {
                return Err(TransitionError::OutOfOrder {
                    stage,
                    prerequisite,
                });
            }
        }

        Ok(())
    }

    /// Merge a stage's artifact and mark the stage completed.
    ///
    /// Completing synthesis also completes the record and stamps `completed_at`.
    pub fn complete_stage(&mut self, artifact: StageArtifact) -> Result<(), TransitionError> {
        let stage = artifact.stage();
        self.ensure_can_run(stage)?;

        match artifact {
            StageArtifact::Plan(plan) => self.plan = Some(plan),
            StageArtifact::Findings(findings) => self.findings = Some(findings),
            StageArtifact::Analysis(analysis) => self.analysis = Some(analysis),
            StageArtifact::Report(report) => self.report = Some(report),
        }
        self.stage_progress.set(stage, StageState::Completed);

        if stage == Stage::Synthesis {
            self.status = ResearchStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminate the workflow with a failure attributed to `stage`.
    pub fn fail_stage(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
        details: ErrorDetails,
    ) -> Result<(), TransitionError> {
        self.ensure_can_run(stage)?;

        self.status = ResearchStatus::Failed;
        self.stage_progress.set(stage, StageState::Failed);
        self.error = Some(message.into());
        self.error_details = Some(details);
        Ok(())
    }

    fn has_artifact(&self, stage: Stage) -> bool {
        match stage {
            Stage::Planning => self.plan.is_some(),
            Stage::Gathering => self.findings.is_some(),
            Stage::Analysis => self.analysis.is_some(),
            Stage::Synthesis => self.report.is_some(),
        }
    }

    /// Verify the record-level invariants.
    pub fn check_invariants(&self) -> Result<(), TransitionError> {
        let violation = |msg: String| Err(TransitionError::InvariantViolated(msg));

        // Progress must read: completed*, then at most one failed, then pending*.
        let mut seen_gap = false;
        for (stage, state) in self.stage_progress.iter() {
            match state {
                StageState::Completed if seen_gap => {
                    return violation(format!("{stage} completed after an unfinished stage"));
                }
                StageState::Completed if !self.has_artifact(stage) => {
                    return violation(format!("{stage} completed without its artifact"));
                }
                StageState::Completed => {}
                StageState::Failed if seen_gap => {
                    return violation(format!("{stage} failed after an unfinished stage"));
                }
                StageState::Failed | StageState::Pending => seen_gap = true,
            }
        }

        let failed = self
            .stage_progress
            .iter()
            .filter(|(_, state)| *state == StageState::Failed)
            .count();

        match self.status {
            ResearchStatus::Completed => {
                if !self.stage_progress.all_completed() || self.report.is_none() {
                    return violation("completed without every stage and a report".into());
                }
                if self.completed_at.is_none() {
                    return violation("completed without completedAt".into());
                }
            }
            ResearchStatus::Failed => {
                if failed != 1 {
                    return violation(format!("failed with {failed} failed stages"));
                }
                if self.error.is_none() {
                    return violation("failed without an error message".into());
                }
            }
            ResearchStatus::Initiated => {
                if failed != 0 {
                    return violation("initiated with a failed stage".into());
                }
                if self.stage_progress.all_completed() {
                    return violation("initiated with every stage completed".into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ResearchPlan {
        ResearchPlan {
            research_topics: vec!["a".into(), "b".into()],
            key_questions: vec![],
            approach: "survey".into(),
            estimated_time: None,
        }
    }

    fn report() -> Report {
        Report {
            title: "Research Report: test".into(),
            executive_summary: String::new(),
            methodology: String::new(),
            findings_summary: String::new(),
            key_takeaways: vec![],
            conclusions: String::new(),
            next_steps: vec![],
            confidence_level: "high".into(),
            generated_at: None,
        }
    }

    fn analysis() -> Analysis {
        Analysis {
            overall_assessment: "fine".into(),
            key_insights: vec![],
            patterns_identified: vec![],
            gaps: vec![],
            confidence_score: Some(0.8),
            recommendations: vec![],
        }
    }

    fn details() -> ErrorDetails {
        ErrorDetails {
            message: "boom".into(),
            timestamp: Utc::now(),
            suggestion: "check logs".into(),
        }
    }

    #[test]
    fn new_record_is_initiated_and_pending() {
        let record = ResearchRecord::new("rust async runtimes", Depth::Quick);
        assert!(record.id.starts_with("research-"));
        assert_eq!(record.status, ResearchStatus::Initiated);
        assert!(record.stage_progress.iter().all(|(_, s)| s == StageState::Pending));
        assert_eq!(record.phase(), Phase::Awaiting(Stage::Planning));
        record.check_invariants().unwrap();
    }

    #[test]
    fn ids_are_unique() {
        let a = ResearchRecord::new("q", Depth::Quick);
        let b = ResearchRecord::new("q", Depth::Quick);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn full_forward_progression_completes() {
        let mut record = ResearchRecord::new("query", Depth::Quick);
        record.complete_stage(StageArtifact::Plan(plan())).unwrap();
        assert_eq!(record.phase(), Phase::Awaiting(Stage::Gathering));
        record.complete_stage(StageArtifact::Findings(vec![])).unwrap();
        record.complete_stage(StageArtifact::Analysis(analysis())).unwrap();
        assert_eq!(record.status, ResearchStatus::Initiated);
        record.complete_stage(StageArtifact::Report(report())).unwrap();

        assert_eq!(record.status, ResearchStatus::Completed);
        assert_eq!(record.phase(), Phase::Completed);
        assert!(record.completed_at.is_some());
        assert!(record.stage_progress.all_completed());
        record.check_invariants().unwrap();
    }

    #[test]
    fn out_of_order_completion_rejected() {
        let mut record = ResearchRecord::new("query", Depth::Quick);
        let err = record
            .complete_stage(StageArtifact::Analysis(analysis()))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::OutOfOrder {
                stage: Stage::Analysis,
                prerequisite: Stage::Gathering,
            }
        );
        assert!(record.analysis.is_none());
    }

    #[test]
    fn completed_stage_never_regresses() {
        let mut record = ResearchRecord::new("query", Depth::Quick);
        record.complete_stage(StageArtifact::Plan(plan())).unwrap();

        let again = record.complete_stage(StageArtifact::Plan(plan()));
        assert!(matches!(again, Err(TransitionError::StageNotPending { .. })));

        let fail = record.fail_stage(Stage::Planning, "late failure", details());
        assert!(fail.is_err());
        assert_eq!(record.stage_progress.get(Stage::Planning), StageState::Completed);
        assert_eq!(record.status, ResearchStatus::Initiated);
    }

    #[test]
    fn failure_is_terminal_and_leaves_later_stages_pending() {
        let mut record = ResearchRecord::new("query", Depth::Quick);
        record.complete_stage(StageArtifact::Plan(plan())).unwrap();
        record
            .fail_stage(Stage::Gathering, "API request failed (status: 503)", details())
            .unwrap();

        assert_eq!(record.status, ResearchStatus::Failed);
        assert_eq!(record.phase(), Phase::Failed(Stage::Gathering));
        assert_eq!(record.stage_progress.get(Stage::Analysis), StageState::Pending);
        assert_eq!(record.stage_progress.get(Stage::Synthesis), StageState::Pending);
        record.check_invariants().unwrap();

        let err = record
            .complete_stage(StageArtifact::Findings(vec![]))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Terminal {
                status: ResearchStatus::Failed
            }
        );
    }

    #[test]
    fn invariant_check_catches_inconsistent_status() {
        let mut record = ResearchRecord::new("query", Depth::Quick);
        record.status = ResearchStatus::Completed;
        assert!(record.check_invariants().is_err());

        let mut record = ResearchRecord::new("query", Depth::Quick);
        record.stage_progress.set(Stage::Analysis, StageState::Completed);
        assert!(record.check_invariants().is_err());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = ResearchRecord::new("query", Depth::Deep);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("researchId").is_some());
        assert!(json.get("stageProgress").is_some());
        assert_eq!(json["stageProgress"]["gathering"], "pending");
        assert_eq!(json["depth"], "deep");
        assert!(json.get("report").is_none());

        let back: ResearchRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn depth_parsing_and_topic_counts() {
        assert_eq!("Quick".parse::<Depth>().unwrap(), Depth::Quick);
        assert_eq!(" deep ".parse::<Depth>().unwrap(), Depth::Deep);
        assert!("exhaustive".parse::<Depth>().is_err());
        assert_eq!(Depth::Quick.topic_count(), 3);
        assert_eq!(Depth::default(), Depth::Standard);
        assert!(Depth::Deep.topic_count() > Depth::Standard.topic_count());
    }

    #[test]
    fn stage_ordering_helpers() {
        assert_eq!(Stage::Planning.previous(), None);
        assert_eq!(Stage::Gathering.previous(), Some(Stage::Planning));
        assert_eq!(Stage::Analysis.next(), Some(Stage::Synthesis));
        assert_eq!(Stage::Synthesis.next(), None);
    }

    #[test]
    fn report_requires_confidence_level() {
        let parsed: Result<Report, _> = serde_json::from_str(r#"{"title": "x"}"#);
        assert!(parsed.is_err());
    }
}
