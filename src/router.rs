//! Query router.
//!
//! Decides per question whether source files must be fetched, and which.
//! Cheap pattern rules run first; the model is consulted only when a
//! question carries a code signal and no issue/PR intent.
//!
//! Rules live in one ordered table of `(pattern, verdict)` pairs evaluated
//! top to bottom, first match wins:
//!
//! 1. issue, PR, and contribution intent → [`Verdict::NoFiles`]
//! 2. code signals (architecture, "how does X work", "where is", ...) →
//!    [`Verdict::ConsultModel`]
//! 3. no match → [`Verdict::NoFiles`]
//!
//! A model reply that cannot be parsed downgrades to "no files needed"; the
//! router never fails the question.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashSet;

use crate::llm::{extract_text, ChatMessage, LanguageModel};
use crate::models::{QueryDecision, RepositorySnapshot};
use crate::snapshot::MAX_FILES_PER_QUESTION;

/// Candidate paths offered to the model.
pub const MAX_CANDIDATE_PATHS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Snapshot data already answers the question.
    NoFiles,
    /// Ask the model which files to read.
    ConsultModel,
}

/// How a decision was reached, for the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTier {
    /// An issue/PR/contribution rule matched.
    IssueIntent,
    /// No code signal matched.
    NoCodeSignal,
    /// Code signal, but the snapshot has no files to offer.
    EmptyTree,
    /// The model answered with a usable decision.
    Model,
    /// The model call failed or its reply was unparseable.
    ModelFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub decision: QueryDecision,
    pub tier: RouteTier,
}

fn rule(pattern: &str, verdict: Verdict) -> (Regex, Verdict) {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("valid routing pattern");
    (regex, verdict)
}

static RULES: Lazy<Vec<(Regex, Verdict)>> = Lazy::new(|| {
    use Verdict::*;
    vec![
        rule(r"good[\s-]*first[\s-]*issues?", NoFiles),
        rule(r"help[\s-]*wanted", NoFiles),
        rule(r"\b(beginner|newcomer|first[\s-]time)", NoFiles),
        rule(r"how\s+(can|do|should|to)\s+(i\s+|we\s+)?contribut", NoFiles),
        rule(r"\bcontribut\w*\s+(guide|guidelines|process)", NoFiles),
        rule(r"\b(list|show|what are|find|any)\b.*\b(issues?|prs?|pull requests?|bugs)\b", NoFiles),
        rule(r"\bopen\s+(issues?|prs?|pull requests?)\b", NoFiles),
        rule(r"\barchitecture\b", ConsultModel),
        rule(r"\bstructure[ds]?\b", ConsultModel),
        rule(r"\bhow\s+(does|do|is|are)\b.*\bwork", ConsultModel),
        rule(r"\bexplain", ConsultModel),
        rule(r"\bimplement", ConsultModel),
        rule(r"\bwhere\s+(is|are)\b", ConsultModel),
        rule(r"\bshow\s+me\b", ConsultModel),
        rule(r"\bwhat\s+(does|do)\b.*\bdo\b", ConsultModel),
        rule(r"\bentry[\s-]*point", ConsultModel),
        rule(r"\bmain\s+file", ConsultModel),
        rule(r"\bconfig", ConsultModel),
        rule(r"\bset\s*up\b", ConsultModel),
        rule(r"\bsnippet", ConsultModel),
    ]
});

/// First matching rule's verdict, if any.
fn first_match(question: &str) -> Option<Verdict> {
    RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(question))
        .map(|(_, verdict)| *verdict)
}

/// Evaluate the rule table against `question`.
pub fn classify(question: &str) -> Verdict {
    first_match(question).unwrap_or(Verdict::NoFiles)
}

/// Route one question against a snapshot.
pub async fn route_query(
    question: &str,
    snapshot: &RepositorySnapshot,
    model: &dyn LanguageModel,
    max_tokens: u32,
) -> RouteOutcome {
    let tier = match first_match(question) {
        Some(Verdict::ConsultModel) => None,
        Some(Verdict::NoFiles) => Some(RouteTier::IssueIntent),
        None => Some(RouteTier::NoCodeSignal),
    };
    if let Some(tier) = tier {
        return RouteOutcome {
            decision: QueryDecision::none(),
            tier,
        };
    }

    let candidates: Vec<&str> = snapshot
        .file_tree
        .iter()
        .filter(|e| e.is_file())
        .take(MAX_CANDIDATE_PATHS)
        .map(|e| e.path.as_str())
        .collect();

    if candidates.is_empty() {
        return RouteOutcome {
            decision: QueryDecision::none(),
            tier: RouteTier::EmptyTree,
        };
    }

    let messages = vec![
        ChatMessage::system(ROUTING_DIRECTIVE),
        ChatMessage::user(routing_prompt(question, &candidates)),
    ];

    let reply = match model.generate(&messages, max_tokens).await {
        Ok(raw) => extract_text(&raw),
        Err(e) => {
            tracing::warn!(error = %e, "routing model call failed, answering without files");
            None
        }
    };

    match reply.and_then(|text| parse_routing_reply(&text, &candidates)) {
        Some(decision) => RouteOutcome {
            decision,
            tier: RouteTier::Model,
        },
        None => {
            tracing::warn!("routing reply unusable, answering without files");
            RouteOutcome {
                decision: QueryDecision::none(),
                tier: RouteTier::ModelFallback,
            }
        }
    }
}

const ROUTING_DIRECTIVE: &str = "You decide which source files must be read to answer a question \
about a GitHub repository. Reply with JSON only, no prose.";

fn routing_prompt(question: &str, candidates: &[&str]) -> String {
    format!(
        "Question: {}\n\n\
         Available files:\n{}\n\n\
         Does answering this question require reading source files? If so, pick at most {} \
         paths from the list above, most relevant first.\n\
         Respond with exactly: {{\"needsFiles\": true|false, \"files\": [\"path\", ...]}}",
        question,
        candidates.join("\n"),
        MAX_FILES_PER_QUESTION
    )
}

#[derive(Deserialize)]
struct RoutingReply {
    #[serde(alias = "needs_files", rename = "needsFiles")]
    needs_files: bool,
    #[serde(default)]
    files: Vec<String>,
}

/// Parse a routing reply into a decision restricted to `candidates`.
///
/// Tolerates code fences and surrounding prose by reading the outermost
/// `{...}` span. Unknown paths are dropped, duplicates collapsed, and the
/// list capped at [`MAX_FILES_PER_QUESTION`]. Returns `None` when no JSON
/// object can be parsed.
pub fn parse_routing_reply(text: &str, candidates: &[&str]) -> Option<QueryDecision> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let reply: RoutingReply = serde_json::from_str(&text[start..=end]).ok()?;

    if !reply.needs_files {
        return Some(QueryDecision::none());
    }

    let allowed: HashSet<&str> = candidates.iter().copied().collect();
    let mut seen = HashSet::new();
    let files: Vec<String> = reply
        .files
        .into_iter()
        .map(|f| f.trim().trim_start_matches("./").to_string())
        .filter(|f| allowed.contains(f.as_str()) && seen.insert(f.clone()))
        .take(MAX_FILES_PER_QUESTION)
        .collect();

    if files.is_empty() {
        return Some(QueryDecision::none());
    }

    Some(QueryDecision {
        needs_files: true,
        files,
    })
}
