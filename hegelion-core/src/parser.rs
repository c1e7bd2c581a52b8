//! Structured output parsing.
//!
//! Extracts typed records from free-text phase output using a tagged-line
//! convention. The parser is a tolerant scanner, not a grammar: absence of
//! structure is normal, malformed markers are skipped with a warning, and
//! nothing here ever fails — the raw phase text is always preserved upstream
//! regardless of what parsing finds.

use crate::types::{Contradiction, JudgeEvaluation, ResearchProposal};
use tracing::warn;

/// Opens a contradiction record in antithesis/judge output.
pub const CONTRADICTION_TAG: &str = "CONTRADICTION:";
/// Completes a contradiction record.
pub const EVIDENCE_TAG: &str = "EVIDENCE:";
/// Opens a research proposal record in synthesis output.
pub const PROPOSAL_TAG: &str = "RESEARCH_PROPOSAL:";
/// Completes a research proposal record.
pub const PREDICTION_TAG: &str = "TESTABLE_PREDICTION:";
/// The judge's numeric score line.
pub const SCORE_TAG: &str = "SCORE:";
/// The judge's feedback line.
pub const FEEDBACK_TAG: &str = "FEEDBACK:";

/// Extract contradictions from phase text, in order of appearance.
///
/// A record begins at a `CONTRADICTION:` line and completes at the next
/// `EVIDENCE:` line. Openers without a companion are dropped.
pub fn parse_contradictions(text: &str) -> Vec<Contradiction> {
    parse_paired(text, CONTRADICTION_TAG, EVIDENCE_TAG)
        .into_iter()
        .map(|(description, evidence)| Contradiction {
            description,
            evidence,
        })
        .collect()
}

/// Extract research proposals from phase text, in order of appearance.
pub fn parse_research_proposals(text: &str) -> Vec<ResearchProposal> {
    parse_paired(text, PROPOSAL_TAG, PREDICTION_TAG)
        .into_iter()
        .map(|(description, testable_prediction)| ResearchProposal {
            description,
            testable_prediction,
        })
        .collect()
}

/// Extract the judge's evaluation from judge phase text.
///
/// Requires a parseable `SCORE:` line; the score is clamped to [0, 1].
/// Feedback is the `FEEDBACK:` line plus any following lines up to the next
/// recognized tag. Returns `None` when no usable score is present — the
/// caller decides what an absent evaluation means.
pub fn parse_judge(text: &str) -> Option<JudgeEvaluation> {
    let mut score: Option<f64> = None;
    let mut feedback_lines: Vec<&str> = Vec::new();
    let mut in_feedback = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(rest) = strip_tag(trimmed, SCORE_TAG) {
            in_feedback = false;
            match parse_leading_float(rest) {
                Some(value) => score = Some(value.clamp(0.0, 1.0)),
                None => {
                    warn!(line = trimmed, "Unparseable judge score line, skipping");
                }
            }
        } else if let Some(rest) = strip_tag(trimmed, FEEDBACK_TAG) {
            in_feedback = true;
            if !rest.is_empty() {
                feedback_lines.push(rest);
            }
        } else if is_tag_line(trimmed) {
            in_feedback = false;
        } else if in_feedback && !trimmed.is_empty() {
            feedback_lines.push(trimmed);
        }
    }

    score.map(|score| JudgeEvaluation {
        score,
        feedback: feedback_lines.join("\n"),
    })
}

/// Scan for (open_tag, close_tag) pairs over the lines of `text`.
///
/// Markers may appear anywhere relative to surrounding prose; only the pair
/// ordering matters. An opener that is followed by another opener before its
/// companion arrives is discarded, as is a companion with no opener pending.
fn parse_paired(text: &str, open_tag: &str, close_tag: &str) -> Vec<(String, String)> {
    let mut records = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(rest) = strip_tag(trimmed, open_tag) {
            if pending.is_some() {
                warn!(tag = open_tag, "Unmatched marker dropped before companion");
            }
            pending = if rest.is_empty() {
                warn!(tag = open_tag, "Empty marker line, skipping");
                None
            } else {
                Some(rest.to_string())
            };
        } else if let Some(rest) = strip_tag(trimmed, close_tag) {
            match pending.take() {
                Some(opener) if !rest.is_empty() => {
                    records.push((opener, rest.to_string()));
                }
                Some(_) => {
                    warn!(tag = close_tag, "Empty companion line, record dropped");
                }
                None => {
                    warn!(tag = close_tag, "Companion marker with no opener, skipping");
                }
            }
        }
    }

    if pending.is_some() {
        warn!(tag = open_tag, "Trailing unmatched marker dropped");
    }

    records
}

/// Case-sensitive tag match at the start of a trimmed line; returns the
/// trimmed remainder.
fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag).map(str::trim)
}

fn is_tag_line(line: &str) -> bool {
    [
        CONTRADICTION_TAG,
        EVIDENCE_TAG,
        PROPOSAL_TAG,
        PREDICTION_TAG,
        SCORE_TAG,
        FEEDBACK_TAG,
    ]
    .iter()
    .any(|tag| line.starts_with(tag))
}

/// Parse the leading float out of a score value like `0.8`, `0.8/1.0`,
/// or `0.8 (solid)`. Returns `None` when no number leads the value.
fn parse_leading_float(value: &str) -> Option<f64> {
    let numeric: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
        .collect();
    numeric.parse::<f64>().ok()
}
