//! Prompt texts. Field names in these prompts are the wire contract the
//! parsers in `parse::codec` and the stages expect.

use crate::models::{Item, Result};
use crate::parse::codec::{encode, encode_numbered, to_prompt_json};

pub const GENERATOR_SYSTEM: &str =
    "You are a helpful assistant that excels in generating ideas and brainstorming.";

pub const EVALUATOR_SYSTEM: &str =
    "You are a helpful assistant that evaluates the quality of brainstorming ideas.";

pub const IMPROVER_SYSTEM: &str = GENERATOR_SYSTEM;

pub const CATEGORIZER_SYSTEM: &str =
    "You are a helpful assistant that excels at grouping ideas into relevant themes.";

pub fn generation(question: &str, count: usize) -> String {
    format!(
        r#"Generate {count} creative ideas in a JSON array to address the following question:
"{question}"

Each idea must be an object with:
- "title": Short descriptive title
- "description": A one or two sentence explanation of the idea

Return exactly {count} objects in a valid JSON list, for example:
[
  {{
    "title": "Idea Title 1",
    "description": "A short description."
  }}
]"#
    )
}

pub fn evaluation(items: &[Item]) -> Result<String> {
    let ideas = to_prompt_json(&encode_numbered(items))?;
    Ok(format!(
        r#"You are given a list of ideas, each with an "id", a "title" and a "description".
For each idea, evaluate its creativity, practicality, and relevance.

Return a JSON array with exactly one object per idea, in the same order, each with:
- "id": the id of the idea being rated
- "rating": "Good enough" or "Needs improvement"
- "reason": A short explanation of why it got that rating

Ideas:
{ideas}"#
    ))
}

pub fn improvement(accepted: &[Item], pending: &[Item]) -> Result<String> {
    let good = to_prompt_json(&encode(accepted))?;
    let weak = to_prompt_json(&encode(pending))?;
    let count = pending.len();
    Ok(format!(
        r#"You are given a list of ideas that need improvement to be more creative, practical,
and relevant. Each idea has "title" and "description".

You are also provided examples of ideas rated "Good enough". Use these examples
as inspiration when improving the weaker ideas. Do not return the examples.

Good enough ideas:
{good}

Ideas to improve:
{weak}

Return exactly {count} improved ideas, in the same order, as a JSON array of
objects with "title" and "description"."#
    ))
}

pub fn categorization(items: &[Item]) -> Result<String> {
    let ideas = to_prompt_json(&encode(items))?;
    Ok(format!(
        r#"You are given a list of ideas, each with a "title" and "description".
Your task is to sort them into 3-5 relevant themes or categories.

Return the result as a JSON object where the keys are the theme names,
and the values are lists of idea titles that belong to each theme.

Ideas:
{ideas}"#
    ))
}
