//! Terminal rendering of dialectic results.

use hegelion_core::HegelionResult;
use std::fmt::Write;

/// Render a result as readable sections.
pub fn render_sections(result: &HegelionResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Thesis\n\n{}\n", result.thesis.trim());
    let _ = writeln!(out, "# Antithesis\n\n{}\n", result.antithesis.trim());
    let _ = writeln!(out, "# Synthesis\n\n{}\n", result.synthesis.trim());

    if !result.contradictions.is_empty() {
        let _ = writeln!(out, "# Contradictions\n");
        for (i, c) in result.contradictions.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, c.description);
            let _ = writeln!(out, "   Evidence: {}", c.evidence);
        }
        out.push('\n');
    }

    if !result.research_proposals.is_empty() {
        let _ = writeln!(out, "# Research Proposals\n");
        for (i, p) in result.research_proposals.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, p.description);
            let _ = writeln!(out, "   Prediction: {}", p.testable_prediction);
        }
        out.push('\n');
    }

    if let Some(ref judge) = result.judge {
        let _ = writeln!(out, "# Judge\n");
        let _ = writeln!(out, "Score: {:.2}", judge.score);
        if !judge.feedback.is_empty() {
            let _ = writeln!(out, "Feedback: {}", judge.feedback);
        }
        out.push('\n');
    }

    let meta = &result.metadata;
    let _ = write!(
        out,
        "mode={} provider={} model={} total={}ms retries={}",
        result.mode, meta.provider, meta.model, meta.total_duration_ms, meta.retry_count
    );
    if meta.cache_hit {
        out.push_str(" (cached)");
    }
    out.push('\n');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hegelion_core::{
        Contradiction, DialecticMode, JudgeEvaluation, QueryOptions, ResearchProposal, RunMetadata,
    };

    fn sample() -> HegelionResult {
        HegelionResult {
            query: "q".to_string(),
            options: QueryOptions::default(),
            mode: DialecticMode::Judge,
            thesis: "T".to_string(),
            antithesis: "A".to_string(),
            synthesis: "S".to_string(),
            contradictions: vec![Contradiction {
                description: "gap".to_string(),
                evidence: "proof".to_string(),
            }],
            research_proposals: vec![ResearchProposal {
                description: "measure it".to_string(),
                testable_prediction: "it moves".to_string(),
            }],
            judge: Some(JudgeEvaluation {
                score: 0.82,
                feedback: "solid".to_string(),
            }),
            metadata: RunMetadata {
                provider: "mock".to_string(),
                model: "mock-model".to_string(),
                total_duration_ms: 123,
                retry_count: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_sections_contain_everything() {
        let text = render_sections(&sample());
        assert!(text.contains("# Thesis"));
        assert!(text.contains("# Antithesis"));
        assert!(text.contains("# Synthesis"));
        assert!(text.contains("1. gap"));
        assert!(text.contains("Evidence: proof"));
        assert!(text.contains("Prediction: it moves"));
        assert!(text.contains("Score: 0.82"));
        assert!(text.contains("retries=1"));
    }

    #[test]
    fn test_empty_sections_omitted() {
        let mut result = sample();
        result.contradictions.clear();
        result.research_proposals.clear();
        result.judge = None;

        let text = render_sections(&result);
        assert!(!text.contains("# Contradictions"));
        assert!(!text.contains("# Research Proposals"));
        assert!(!text.contains("# Judge"));
    }

    #[test]
    fn test_cache_hit_marker() {
        let mut result = sample();
        result.metadata.cache_hit = true;
        assert!(render_sections(&result).contains("(cached)"));
    }
}
