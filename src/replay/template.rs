use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::TemplateDataMap;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Result of substituting placeholders in one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub value: String,
    /// Keys that had no entry and were left in place
    pub unresolved: Vec<String>,
}

/// Replace every `{key}` with its entry in `templates`. Unknown keys stay
/// verbatim.
pub fn substitute(input: &str, templates: &TemplateDataMap) -> Substitution {
    let mut unresolved = Vec::new();
    let value = placeholder()
        .replace_all(input, |caps: &Captures| match templates.get(&caps[1]) {
            Some(v) => v.clone(),
            None => {
                unresolved.push(caps[1].to_string());
                caps[0].to_string()
            }
        })
        .into_owned();
    Substitution { value, unresolved }
}

pub fn has_placeholders(input: &str) -> bool {
    placeholder().is_match(input)
}
