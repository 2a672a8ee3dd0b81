//! Prompt templates for each stage.

use deepdive_core::research::{Analysis, Depth, Finding};

const JSON_ONLY: &str = "Respond ONLY with valid JSON, no markdown formatting.";

pub fn planning(query: &str, depth: Depth) -> String {
    format!(
        r#"You are a research planning AI agent. Create a structured research plan for the following query:

Query: "{query}"
Depth: {depth}

Generate a JSON response with:
1. "research_topics": array of 3-5 specific topics to research
2. "key_questions": array of 3-5 key questions to answer
3. "approach": brief description of the research approach
4. "estimated_time": estimated time in minutes

{JSON_ONLY}"#
    )
}

pub fn gathering(query: &str, topic: &str) -> String {
    format!(
        r#"You are a research AI agent. Research the following topic in the context of this query:

Main Query: "{query}"
Research Topic: "{topic}"

Provide comprehensive findings in JSON format:
{{
  "topic": "{topic}",
  "summary": "2-3 paragraph summary of findings",
  "key_points": ["point1", "point2", "point3"],
  "sources": ["source1", "source2"],
  "confidence": 0.85
}}

{JSON_ONLY}"#
    )
}

pub fn analysis(query: &str, findings: &[Finding]) -> String {
    let summary = findings
        .iter()
        .map(|f| {
            format!(
                "Topic: {}\nSummary: {}\nKey Points: {}",
                f.topic,
                f.summary,
                f.key_points.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an analysis AI agent. Analyze the following research findings for this query:

Query: "{query}"

Research Findings:
{summary}

Provide a comprehensive analysis in JSON format:
{{
  "overall_assessment": "2-3 paragraph analysis of all findings",
  "key_insights": ["insight1", "insight2", "insight3"],
  "patterns_identified": ["pattern1", "pattern2"],
  "gaps": ["gap1", "gap2"],
  "confidence_score": 0.85,
  "recommendations": ["rec1", "rec2"]
}}

{JSON_ONLY}"#
    )
}

pub fn synthesis(query: &str, analysis: &Analysis, findings_count: usize, generated_at: &str) -> String {
    format!(
        r#"You are a synthesis AI agent. Create a comprehensive, well-structured research report based on the analysis:

Query: "{query}"

Analysis Summary:
{assessment}

Key Insights: {insights}
Patterns: {patterns}
Recommendations: {recommendations}

Number of findings: {findings_count}

Generate a complete research report in JSON format:
{{
  "title": "Research Report: [Topic]",
  "executive_summary": "2-3 paragraph summary",
  "methodology": "Brief description of research approach",
  "findings_summary": "Comprehensive summary of all findings",
  "key_takeaways": ["takeaway1", "takeaway2", "takeaway3"],
  "conclusions": "Final conclusions paragraph",
  "next_steps": ["step1", "step2", "step3"],
  "confidence_level": "high/medium/low",
  "generated_at": "{generated_at}"
}}

{JSON_ONLY}"#,
        assessment = analysis.overall_assessment,
        insights = analysis.key_insights.join(", "),
        patterns = analysis.patterns_identified.join(", "),
        recommendations = analysis.recommendations.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_embed_their_inputs() {
        let p = planning("How does io_uring work?", Depth::Deep);
        assert!(p.contains("Query: \"How does io_uring work?\""));
        assert!(p.contains("Depth: deep"));

        let g = gathering("io_uring", "submission queues");
        assert!(g.contains("\"topic\": \"submission queues\""));
        assert!(g.ends_with(JSON_ONLY));
    }

    #[test]
    fn analysis_prompt_lists_findings() {
        let findings = vec![Finding {
            topic: "SQ polling".into(),
            summary: "Kernel thread polls the ring.".into(),
            key_points: vec!["fewer syscalls".into(), "cpu cost".into()],
            sources: vec![],
            confidence: None,
        }];
        let p = analysis("io_uring", &findings);
        assert!(p.contains("Topic: SQ polling"));
        assert!(p.contains("Key Points: fewer syscalls, cpu cost"));
    }
}
