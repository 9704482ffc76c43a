//! `SKILL.md` parsing and structural validation.
//!
//! Parsing is tolerant: only an unreadable file is an error. Anything else a
//! hand-written manifest gets wrong shows up later in [`validate`].

use std::path::Path;

use {
    serde::Serialize,
    serde_json::{Map, Value},
    skillgate_config::is_truthy,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    metadata::normalize_metadata,
    types::SkillManifest,
};

const DELIMITER: &str = "---";

/// Name used when a frontmatter-less document has no heading.
const UNKNOWN_NAME: &str = "unknown";
const NO_DESCRIPTION: &str = "No description available";

/// A skill name: one or more lowercase ASCII letters, digits, or hyphens.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read and parse a manifest file.
///
/// Fails only when the file cannot be read as UTF-8 text.
pub async fn parse_manifest_file(path: &Path) -> Result<SkillManifest> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::parse(path, e.to_string()))?;
    let content = String::from_utf8(bytes).map_err(|e| Error::parse(path, e.to_string()))?;
    Ok(parse_manifest(&content, path))
}

/// Parse manifest text. `source_path` is the manifest file's own path.
pub fn parse_manifest(content: &str, source_path: &Path) -> SkillManifest {
    let (frontmatter, body) = match split_frontmatter(content) {
        Some((block, body)) => (load_frontmatter(block, source_path), body),
        None => {
            debug!(path = %source_path.display(), "no frontmatter, inferring identity from body");
            (infer_from_content(content), content)
        },
    };

    let mut parse_warnings = Vec::new();
    let metadata = normalize_metadata(frontmatter.get("metadata"));
    if let Some(diagnostic) = metadata.diagnostic {
        warn!(path = %source_path.display(), %diagnostic, "unreadable metadata, using empty mapping");
        parse_warnings.push(diagnostic);
    }

    SkillManifest {
        name: scalar_string(frontmatter.get("name")).unwrap_or_default(),
        description: scalar_string(frontmatter.get("description")).unwrap_or_default(),
        metadata: metadata.value,
        content: body.trim().to_string(),
        source_path: source_path.to_path_buf(),
        source_directory: source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        homepage: scalar_string(frontmatter.get("homepage")),
        user_invocable: frontmatter.get("user-invocable").map(normalize_bool),
        disable_model_invocation: frontmatter
            .get("disable-model-invocation")
            .map(normalize_bool),
        command_dispatch: scalar_string(frontmatter.get("command-dispatch")),
        command_tool: scalar_string(frontmatter.get("command-tool")),
        command_arg_mode: scalar_string(frontmatter.get("command-arg-mode")),
        parse_warnings,
    }
}

/// Coerce a frontmatter flag to a boolean.
///
/// Strings are true only for `true`, `yes`, or `1` (any case); other values
/// use their natural truthiness.
pub fn normalize_bool(value: &Value) -> bool {
    match value {
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        other => is_truthy(other),
    }
}

/// Split a document into (frontmatter block, body).
///
/// The block opens on the first line and closes at the next line, both
/// consisting of exactly `---` (trailing whitespace and `\r` tolerated).
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            return Some((&content[start..offset], &content[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Load a frontmatter block as YAML, falling back to `key: value` lines.
fn load_frontmatter(block: &str, source_path: &Path) -> Map<String, Value> {
    let parsed = serde_yaml::from_str::<serde_yaml::Value>(block)
        .map_err(|e| e.to_string())
        .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string()));
    match parsed {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            debug!(path = %source_path.display(), "frontmatter is not a mapping, using line parser");
            parse_simple_frontmatter(block)
        },
        Err(error) => {
            debug!(path = %source_path.display(), %error, "invalid YAML frontmatter, using line parser");
            parse_simple_frontmatter(block)
        },
    }
}

/// Line-oriented `key: value` parser. Scalars only; indented lines and
/// lines without a key are ignored.
fn parse_simple_frontmatter(block: &str) -> Map<String, Value> {
    block
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let value = value.trim();
            let key_ok = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            (key_ok && !value.is_empty()).then(|| (key.to_string(), Value::String(value.into())))
        })
        .collect()
}

/// Identity for documents without frontmatter: the first `# ` heading.
fn infer_from_content(content: &str) -> Map<String, Value> {
    let heading = content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim);

    let (name, description) = match heading {
        Some(title) => (
            title
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-"),
            title.to_string(),
        ),
        None => (UNKNOWN_NAME.to_string(), NO_DESCRIPTION.to_string()),
    };

    let mut map = Map::new();
    map.insert("name".into(), Value::String(name));
    map.insert("description".into(), Value::String(description));
    map
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Result of [`validate`]. Errors block loading, warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check a manifest's structure.
pub fn validate(manifest: &SkillManifest) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if manifest.name.is_empty() {
        errors.push("missing required field: name".to_string());
    } else if !is_valid_name(&manifest.name) {
        warnings.push(format!(
            "skill name \"{}\" contains invalid characters; use lowercase letters, numbers, and hyphens only",
            manifest.name
        ));
    }

    if !manifest.metadata.is_object() {
        errors.push("metadata must be a mapping".to_string());
    }

    if manifest.description.is_empty() {
        warnings.push("missing description field".to_string());
    }

    warnings.extend(manifest.parse_warnings.iter().cloned());

    Validation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
