//! Generative enhancement helpers used by the editor: rewrite a passage,
//! suggest skills for a job title, draft a summary.

pub mod prompts;

use serde_json::Value;

use crate::errors::AppError;
use crate::llm_client::prompts::{ARABIC_OUTPUT, JSON_ONLY_SYSTEM};
use crate::llm_client::{complete_json, LanguageModel, LlmError};

use prompts::*;

pub const MAX_SKILLS: usize = 8;

pub async fn enhance_text(
    model: &dyn LanguageModel,
    text: &str,
    job_description: Option<&str>,
) -> Result<String, AppError> {
    let text = required(text, "text")?;
    let job_context = job_description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| JOB_CONTEXT.replace("{job_description}", d))
        .unwrap_or_default();
    let prompt = ENHANCE_PROMPT
        .replace("{job_context}", &job_context)
        .replace("{text}", text);

    model
        .complete(&prompt, &system(ENHANCE_SYSTEM))
        .await
        .map_err(llm_error("enhance text"))
}

pub async fn suggest_skills(
    model: &dyn LanguageModel,
    job_title: &str,
) -> Result<Vec<String>, AppError> {
    let job_title = required(job_title, "job_title")?;
    let prompt = SKILLS_PROMPT.replace("{job_title}", job_title);
    let reply: Value = complete_json(model, &prompt, &json_system(SKILLS_SYSTEM))
        .await
        .map_err(llm_error("suggest skills"))?;

    let items = match &reply {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => obj
            .get("skills")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    Ok(clean_skill_list(
        items.iter().filter_map(Value::as_str).map(String::from),
    ))
}

pub async fn suggest_summary(
    model: &dyn LanguageModel,
    job_title: &str,
) -> Result<String, AppError> {
    let job_title = required(job_title, "job_title")?;
    let prompt = SUMMARY_PROMPT.replace("{job_title}", job_title);
    model
        .complete(&prompt, &system(SUMMARY_SYSTEM))
        .await
        .map_err(llm_error("suggest summary"))
}

/// Trims, drops blanks and case-insensitive duplicates, keeps the first
/// `MAX_SKILLS` in order.
pub fn clean_skill_list(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|s| s.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_SKILLS)
        .collect()
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn system(base: &str) -> String {
    format!("{base} {ARABIC_OUTPUT}")
}

fn json_system(base: &str) -> String {
    format!("{} {JSON_ONLY_SYSTEM}", system(base))
}

fn llm_error(action: &'static str) -> impl Fn(LlmError) -> AppError {
    move |e| AppError::Llm(format!("Failed to {action}: {e}"))
}
