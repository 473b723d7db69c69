//! Text-to-curriculum extraction.
//!
//! Parsing goes to [`serde_json::Value`] first and the typed plan is built by
//! an explicit walk, so every rejection can name the offending path.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::schema::{CurriculumPlan, Lesson, Level, MAX_REQUIREMENTS, MIN_REQUIREMENTS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("output is not valid JSON: {0}")]
    Malformed(String),

    #[error("{path}: {reason}")]
    SchemaViolation { path: String, reason: String },
}

/// Parse and validate a curriculum from raw model output.
///
/// A strict parse is tried first. If that fails, the content of a fenced
/// code block is tried, then the slice from the first `{` to the last `}`.
/// Whatever candidate is used must parse completely.
pub fn extract(raw: &str) -> Result<CurriculumPlan, ExtractError> {
    let value = parse_lenient(raw)?;
    validate(&value)
}

/// Check a parsed document against the curriculum shape.
pub fn validate(value: &Value) -> Result<CurriculumPlan, ExtractError> {
    let root = value
        .as_object()
        .ok_or_else(|| violation("$", "top level must be an object"))?;

    let levels = non_empty_array(root, "levels", "levels")?;
    let levels = levels
        .iter()
        .enumerate()
        .map(|(i, level)| level_from(level, &format!("levels[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CurriculumPlan { levels })
}

fn parse_lenient(raw: &str) -> Result<Value, ExtractError> {
    let strict_err = match serde_json::from_str::<Value>(raw) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let Some(block) = fenced_block(raw)
        && let Ok(v) = serde_json::from_str::<Value>(block)
    {
        debug!("recovered JSON from fenced code block");
        return Ok(v);
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
        && start < end
        && let Ok(v) = serde_json::from_str::<Value>(&raw[start..=end])
    {
        debug!("recovered JSON object from surrounding text");
        return Ok(v);
    }

    Err(ExtractError::Malformed(strict_err.to_string()))
}

/// Body of the first ```` ``` ```` fence, with an optional `json` tag removed.
fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after = &raw[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let close = after.find("```")?;
    Some(after[..close].trim())
}

fn level_from(value: &Value, path: &str) -> Result<Level, ExtractError> {
    let obj = object_at(value, path)?;
    let title = string_field(obj, "title", path)?;
    let description = string_field(obj, "description", path)?;
    let lessons = non_empty_array(obj, "lessons", &format!("{path}.lessons"))?
        .iter()
        .enumerate()
        .map(|(i, lesson)| lesson_from(lesson, &format!("{path}.lessons[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Level {
        title,
        description,
        lessons,
    })
}

fn lesson_from(value: &Value, path: &str) -> Result<Lesson, ExtractError> {
    let obj = object_at(value, path)?;
    let title = string_field(obj, "title", path)?;
    let synopsis = string_field(obj, "synopsis", path)?;
    let instructions = string_field(obj, "instructions", path)?;

    let req_path = format!("{path}.graduationRequirements");
    let requirements = obj
        .get("graduationRequirements")
        .ok_or_else(|| violation(&req_path, "missing field"))?
        .as_array()
        .ok_or_else(|| violation(&req_path, "must be an array of strings"))?;
    if !(MIN_REQUIREMENTS..=MAX_REQUIREMENTS).contains(&requirements.len()) {
        return Err(violation(
            &req_path,
            &format!(
                "must have {MIN_REQUIREMENTS}-{MAX_REQUIREMENTS} entries, found {}",
                requirements.len()
            ),
        ));
    }
    let graduation_requirements = requirements
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.as_str()
                .map(str::to_owned)
                .ok_or_else(|| violation(&format!("{req_path}[{i}]"), "must be a string"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Lesson {
        title,
        synopsis,
        instructions,
        graduation_requirements,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn violation(path: &str, reason: &str) -> ExtractError {
    ExtractError::SchemaViolation {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn object_at<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ExtractError> {
    value
        .as_object()
        .ok_or_else(|| violation(path, "must be an object"))
}

fn string_field(obj: &Map<String, Value>, key: &str, parent: &str) -> Result<String, ExtractError> {
    let path = format!("{parent}.{key}");
    match obj.get(key) {
        None => Err(violation(&path, "missing field")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(violation(&path, "must be a string")),
    }
}

fn non_empty_array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ExtractError> {
    let items = obj
        .get(key)
        .ok_or_else(|| violation(path, "missing field"))?
        .as_array()
        .ok_or_else(|| violation(path, "must be an array"))?;
    if items.is_empty() {
        return Err(violation(path, "must not be empty"));
    }
    Ok(items)
}
