//! Phase prompt construction.
//!
//! Pure, deterministic mapping from (query, prior phase outputs, options) to
//! instruction text. No ordering logic lives here; the engine decides when
//! each prompt is used. The marker-tag instructions match what
//! [`crate::parser`] extracts.

use crate::parser::{
    CONTRADICTION_TAG, EVIDENCE_TAG, FEEDBACK_TAG, PREDICTION_TAG, PROPOSAL_TAG, SCORE_TAG,
};
use crate::types::{CriticPersona, Query, ResponseStyle};

/// Build the thesis prompt: the strongest defensible case for the query.
pub fn thesis(query: &Query) -> String {
    let mut prompt = format!(
        "Present the strongest, most rigorous position on the following question. \
         Commit to a clear claim and argue for it directly.\n\n\
         Question: {}\n",
        query.text
    );
    push_directives(&mut prompt, query);
    prompt
}

/// Build the single-critic antithesis prompt.
pub fn antithesis(query: &Query, thesis: &str) -> String {
    let mut prompt = format!(
        "You are a rigorous critic. A position has been taken on this question:\n\n\
         Question: {}\n\n\
         Position:\n{}\n\n\
         Attack this position. Find its weakest assumptions, counterexamples, \
         and internal tensions. For each genuine contradiction you identify, \
         emit a pair of lines in exactly this format:\n\
         {} <what the contradiction is>\n\
         {} <the evidence or reasoning backing it>\n",
        query.text, thesis, CONTRADICTION_TAG, EVIDENCE_TAG
    );
    push_directives(&mut prompt, query);
    prompt
}

/// Build one council critic's prompt. Each persona receives the same
/// question and thesis but attacks a different facet.
pub fn critic(persona: CriticPersona, query: &Query, thesis: &str) -> String {
    let mut prompt = format!(
        "You are the {} of a critical council reviewing a position.\n\n\
         Question: {}\n\n\
         Position:\n{}\n\n\
         {}\n\
         For each genuine contradiction you identify, emit a pair of lines in \
         exactly this format:\n\
         {} <what the contradiction is>\n\
         {} <the evidence or reasoning backing it>\n",
        persona_title(persona),
        query.text,
        thesis,
        persona_instruction(persona),
        CONTRADICTION_TAG,
        EVIDENCE_TAG
    );
    push_directives(&mut prompt, query);
    prompt
}

/// Build the synthesis prompt. When `prior_feedback` is present (a
/// judge-triggered retry), it is embedded verbatim with a directive to
/// address it without restarting from scratch.
pub fn synthesis(
    query: &Query,
    thesis: &str,
    antithesis: &str,
    prior_feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "A question has been argued from two sides.\n\n\
         Question: {}\n\n\
         Position:\n{}\n\n\
         Critique:\n{}\n\n\
         Produce a synthesis that preserves what survives the critique and \
         transcends the contradiction between the two. Do not merely split the \
         difference. Where the synthesis opens a genuinely new line of inquiry, \
         emit a pair of lines in exactly this format:\n\
         {} <the proposed line of inquiry>\n\
         {} <a concrete prediction that would confirm or refute it>\n",
        query.text, thesis, antithesis, PROPOSAL_TAG, PREDICTION_TAG
    );

    if let Some(feedback) = prior_feedback {
        prompt.push_str(&format!(
            "\nA reviewer evaluated your previous synthesis and found it wanting. \
             Revise the synthesis to address this feedback directly. Keep what was \
             sound; do not start over from scratch.\n\n\
             Reviewer feedback:\n{}\n",
            feedback
        ));
    }

    push_directives(&mut prompt, query);
    prompt
}

/// Build the judge prompt: score the synthesis and explain what to improve.
pub fn judge(query: &Query, synthesis: &str) -> String {
    format!(
        "You are an impartial judge evaluating the quality of a synthesis.\n\n\
         Question: {}\n\n\
         Synthesis:\n{}\n\n\
         Assess rigor, fidelity to the question, and whether the synthesis \
         genuinely resolves the tension rather than papering over it. \
         Respond with exactly these two lines first:\n\
         {} <a number between 0.0 and 1.0>\n\
         {} <specific, actionable feedback>\n",
        query.text, synthesis, SCORE_TAG, FEEDBACK_TAG
    )
}

fn persona_title(persona: CriticPersona) -> &'static str {
    match persona {
        CriticPersona::Logician => "Logician",
        CriticPersona::Empiricist => "Empiricist",
        CriticPersona::Ethicist => "Ethicist",
    }
}

fn persona_instruction(persona: CriticPersona) -> &'static str {
    match persona {
        CriticPersona::Logician => {
            "Attack the logical structure: hidden premises, circular reasoning, \
             non sequiturs, and conclusions that outrun their arguments."
        }
        CriticPersona::Empiricist => {
            "Attack the empirical grounding: claims without evidence, untestable \
             assertions, and places where available data cuts the other way."
        }
        CriticPersona::Ethicist => {
            "Attack the value assumptions: whose interests are privileged, what \
             is silently taken as good, and which stakeholders are ignored."
        }
    }
}

/// Append the response-style directive and, when enabled, the evidence
/// grounding directive. Applied uniformly to generation phases.
fn push_directives(prompt: &mut String, query: &Query) {
    prompt.push('\n');
    prompt.push_str(style_directive(query.options.response_style));
    prompt.push('\n');
    if query.options.use_search {
        prompt.push_str(
            "Ground every factual claim in retrieved evidence where it exists, \
             and say explicitly when you are reasoning without evidence.\n",
        );
    }
}

fn style_directive(style: ResponseStyle) -> &'static str {
    match style {
        ResponseStyle::Sections => {
            "Structure your answer in clearly headed sections."
        }
        ResponseStyle::Json => {
            "Answer with a single JSON object; put prose inside string values."
        }
        ResponseStyle::SynthesisOnly => {
            "Be concise; only the final synthesis will be shown to the reader."
        }
        ResponseStyle::Conversational => {
            "Answer in flowing conversational prose, no headings."
        }
        ResponseStyle::BulletPoints => "Answer in terse bullet points.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryOptions;

    fn query() -> Query {
        Query::simple("Is honesty always the best policy?")
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let q = query();
        assert_eq!(thesis(&q), thesis(&q));
        assert_eq!(
            critic(CriticPersona::Ethicist, &q, "T"),
            critic(CriticPersona::Ethicist, &q, "T")
        );
    }

    #[test]
    fn test_thesis_contains_question() {
        let p = thesis(&query());
        assert!(p.contains("Is honesty always the best policy?"));
    }

    #[test]
    fn test_antithesis_requires_thesis_text() {
        let p = antithesis(&query(), "the thesis text");
        assert!(p.contains("the thesis text"));
        assert!(p.contains(CONTRADICTION_TAG));
        assert!(p.contains(EVIDENCE_TAG));
    }

    #[test]
    fn test_critic_prompts_differ_by_persona() {
        let q = query();
        let logician = critic(CriticPersona::Logician, &q, "T");
        let empiricist = critic(CriticPersona::Empiricist, &q, "T");
        let ethicist = critic(CriticPersona::Ethicist, &q, "T");

        assert_ne!(logician, empiricist);
        assert_ne!(empiricist, ethicist);
        assert!(logician.contains("logical structure"));
        assert!(empiricist.contains("empirical grounding"));
        assert!(ethicist.contains("value assumptions"));
        // All three receive the same thesis.
        for p in [&logician, &empiricist, &ethicist] {
            assert!(p.contains("Position:\nT"));
        }
    }

    #[test]
    fn test_synthesis_embeds_judge_feedback_on_retry() {
        let q = query();
        let first = synthesis(&q, "T", "A", None);
        assert!(!first.contains("Reviewer feedback"));

        let retry = synthesis(&q, "T", "A", Some("cite your sources"));
        assert!(retry.contains("Reviewer feedback"));
        assert!(retry.contains("cite your sources"));
        assert!(retry.contains("do not start over"));
    }

    #[test]
    fn test_judge_prompt_instructs_score_markers() {
        let p = judge(&query(), "S");
        assert!(p.contains(SCORE_TAG));
        assert!(p.contains(FEEDBACK_TAG));
    }

    #[test]
    fn test_search_directive_only_when_enabled() {
        let mut q = query();
        assert!(!thesis(&q).contains("retrieved evidence"));

        q.options.use_search = true;
        assert!(thesis(&q).contains("retrieved evidence"));
    }

    #[test]
    fn test_style_directives() {
        let mut q = query();
        q.options.response_style = ResponseStyle::BulletPoints;
        assert!(thesis(&q).contains("bullet points"));

        q.options.response_style = ResponseStyle::Json;
        assert!(thesis(&q).contains("JSON object"));
    }

    #[test]
    fn test_options_do_not_leak_into_judge_prompt() {
        let mut q = query();
        q.options.use_search = true;
        // The judge scores text; it does not generate claims.
        assert!(!judge(&q, "S").contains("retrieved evidence"));
    }
}
