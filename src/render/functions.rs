//! Tera filters and functions used by the job and dashboard templates.
//!
//! The list-valued fields of the template data hold pre-formatted YAML
//! lines; these helpers only take care of indentation:
//!
//! ```text
//! args:
//!       {{ command | indent_array(indent=6) }}
//! {{ env | indent_section(indent=8, title="env") }}
//! ```

use std::collections::HashMap;

use tera::{Error, Tera, Value};

/// Joins `items`, one per line, prefixing each with `prefix`.
///
/// Every line but the first is indented; the first one is indented too when
/// `indent_first_line` is set, otherwise the template provides it.
fn indent_base(indentation: usize, prefix: &str, indent_first_line: bool, items: &[String]) -> String {
    let indent = " ".repeat(indentation);
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let lead = if i > 0 || indent_first_line {
                indent.as_str()
            } else {
                ""
            };
            format!("{lead}{prefix}{item}\n")
        })
        .collect()
}

fn indent_section_base(indentation: usize, title: &str, prefix: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    format!(
        "{title}:\n{}",
        indent_base(indentation, prefix, true, items)
    )
}

fn string_items(value: &Value, filter: &str) -> tera::Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::msg(format!("{filter} expects a list of strings")))
            })
            .collect(),
        _ => Err(Error::msg(format!("{filter} expects a list of strings"))),
    }
}

fn indentation(args: &HashMap<String, Value>, filter: &str) -> tera::Result<usize> {
    args.get("indent")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::msg(format!("{filter} requires an integer `indent` argument")))
}

fn title(args: &HashMap<String, Value>, filter: &str) -> tera::Result<String> {
    args.get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::msg(format!("{filter} requires a string `title` argument")))
}

/// `["a", "b"] | indent_array(indent=2)` renders `- a` / `  - b`.
pub fn indent_array(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items = string_items(value, "indent_array")?;
    let indent = indentation(args, "indent_array")?;
    Ok(Value::String(indent_base(indent, "- ", false, &items)))
}

/// Like `indent_array`, without the list marker.
pub fn indent_keys(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items = string_items(value, "indent_keys")?;
    let indent = indentation(args, "indent_keys")?;
    Ok(Value::String(indent_base(indent, "", false, &items)))
}

/// Renders `title:` followed by the indented lines; nothing when empty.
pub fn indent_section(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items = string_items(value, "indent_section")?;
    let indent = indentation(args, "indent_section")?;
    let title = title(args, "indent_section")?;
    Ok(Value::String(indent_section_base(indent, &title, "", &items)))
}

/// Renders `title:` followed by an indented list; nothing when empty.
pub fn indent_array_section(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items = string_items(value, "indent_array_section")?;
    let indent = indentation(args, "indent_array_section")?;
    let title = title(args, "indent_array_section")?;
    Ok(Value::String(indent_section_base(indent, &title, "- ", &items)))
}

/// Renders a map as sorted `key: value` lines.
pub fn indent_map(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let map = match value {
        Value::Null => return Ok(Value::String(String::new())),
        Value::Object(map) => map,
        _ => return Err(Error::msg("indent_map expects a map")),
    };
    let mut lines: Vec<String> = map
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect();
    lines.sort();
    let indent = indentation(args, "indent_map")?;
    Ok(Value::String(indent_base(indent, "", false, &lines)))
}

/// Builds the `repo` template function: `repo(uri=repo_uri, branch=repo_branch)`
/// yields `uri=branch`, or the repository override when one is configured.
pub fn repo_function(
    repository_override: Option<String>,
) -> impl Fn(&HashMap<String, Value>) -> tera::Result<Value> + Sync + Send {
    move |args: &HashMap<String, Value>| {
        if let Some(repository) = &repository_override {
            return Ok(Value::String(repository.clone()));
        }
        let uri = args
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::msg("repo requires a string `uri` argument"))?;
        let reference = match args.get("branch").and_then(Value::as_str) {
            Some(branch) if !branch.is_empty() => format!("{uri}={branch}"),
            _ => uri.to_string(),
        };
        Ok(Value::String(reference))
    }
}

/// Registers every helper on `tera`.
pub fn register(tera: &mut Tera, repository_override: Option<String>) {
    tera.register_filter("indent_array", indent_array);
    tera.register_filter("indent_keys", indent_keys);
    tera.register_filter("indent_section", indent_section);
    tera.register_filter("indent_array_section", indent_array_section);
    tera.register_filter("indent_map", indent_map);
    tera.register_function("repo", repo_function(repository_override));
}
