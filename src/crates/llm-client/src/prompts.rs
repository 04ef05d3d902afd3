//! Prompt construction for the three typed completion operations.
//!
//! Kept separate from the provider modules so Claude and OpenAI build the
//! same prompt text and only differ in wire format and response parsing.

use graph_client::Concept;

const CONCEPT_EXTRACTION_INSTRUCTIONS: &str = r#"You are a mathematics curriculum assistant. Identify every distinct mathematical concept the student's question touches, in the order they first appear. Respond with nothing but a JSON array of lowercase concept names, e.g. ["derivatives", "chain rule"]. If no mathematical concept is present, respond with []."#;

const EXPLANATION_INSTRUCTIONS: &str = r#"You are a patient math tutor. Write a complete explanation of the student's question that explicitly builds on the listed prerequisite concepts, in order from foundational to advanced, and that draws on the provided reference passages where they are relevant. Write in full paragraphs ending with terminal punctuation. Do not end mid-sentence."#;

const NEW_CONCEPT_INSTRUCTIONS: &str = r#"You are curating a mathematics prerequisite graph. A student's question touched a concept that is not yet in the graph. Analyze it and respond with nothing but a JSON object with the keys: description (string), suggested_prereqs (array of strings), suggested_difficulty (integer 1-10), suggested_category (string), reasoning (string), is_likely_new_concept (boolean, false if this looks like a rephrasing of an existing well-known concept rather than something genuinely new)."#;

pub fn concept_extraction_prompt(text: &str) -> String {
    format!("{CONCEPT_EXTRACTION_INSTRUCTIONS}\n\nQuestion: {text}")
}

pub fn explanation_prompt(query: &str, path: &[Concept], context_chunks: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(EXPLANATION_INSTRUCTIONS);
    prompt.push_str("\n\nStudent question: ");
    prompt.push_str(query);

    if !path.is_empty() {
        prompt.push_str("\n\nPrerequisite chain (foundational first):\n");
        for concept in path {
            prompt.push_str(&format!("- {}: {}\n", concept.name, concept.description));
        }
    }

    if !context_chunks.is_empty() {
        prompt.push_str("\nReference passages:\n");
        for (i, chunk) in context_chunks.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, chunk));
        }
    }

    prompt
}

pub fn new_concept_prompt(name: &str, query_context: &str) -> String {
    format!("{NEW_CONCEPT_INSTRUCTIONS}\n\nConcept name: {name}\nOriginating question: {query_context}")
}

/// Strips a markdown code fence around a JSON response, if present. Models
/// asked for "nothing but JSON" still wrap it in ```json fences often
/// enough that callers need to tolerate it.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Checks whether a model response looks cut off mid-sentence. Used by the
/// orchestrator (spec §4.7) to decide whether to re-request or enhance an
/// explanation.
pub fn looks_truncated(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return true;
    }
    !matches!(trimmed.chars().last(), Some('.') | Some('!') | Some('?') | Some('"') | Some('\''))
}
