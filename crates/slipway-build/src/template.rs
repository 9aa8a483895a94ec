//! `**TOKEN**` substitution for project templates
//!
//! Tokens are upper-case letters and underscores between double asterisks.
//! Unknown tokens are left in the output untouched unless the values are in
//! [`TemplateMode::Strict`], where any leftover token is an error.

use crate::error::{BuildError, BuildResult};
use log::debug;
use regex::Regex;
use std::collections::BTreeMap;

const TOKEN_PATTERN: &str = r"\*\*([A-Z_]+)\*\*";

/// What to do with tokens that have no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateMode {
    /// Leave them verbatim
    #[default]
    Lenient,
    /// Fail the render
    Strict,
}

/// Replace every known `**TOKEN**` in `template`
///
/// Templates with Windows line endings are rejected.
pub fn replace_tokens(template: &str, values: &BTreeMap<String, String>) -> BuildResult<String> {
    substitute("template", template, values)
}

/// Tokens in `template` that `values` does not cover, in order of appearance
pub fn unresolved_tokens(
    template: &str,
    values: &BTreeMap<String, String>,
) -> BuildResult<Vec<String>> {
    let pattern = Regex::new(TOKEN_PATTERN)?;
    let mut missing: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(template) {
        let name = &caps[1];
        if !values.contains_key(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }
    Ok(missing)
}

fn substitute(
    name: &str,
    template: &str,
    values: &BTreeMap<String, String>,
) -> BuildResult<String> {
    if template.contains("\r\n") {
        return Err(BuildError::template(name, "contains windows line endings"));
    }

    let pattern = Regex::new(TOKEN_PATTERN)?;
    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for caps in pattern.captures_iter(template) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        output.push_str(&template[last..whole.start()]);
        match values.get(&caps[1]) {
            Some(value) => output.push_str(value),
            None => output.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    output.push_str(&template[last..]);
    Ok(output)
}

/// String-keyed values shared by several templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    values: BTreeMap<String, String>,
    mode: TemplateMode,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: TemplateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Append to a value, creating it when missing
    pub fn append(&mut self, key: &str, text: &str) {
        self.values.entry(key.to_string()).or_default().push_str(text);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Render `template`; `name` identifies it in errors
    pub fn render(&self, name: &str, template: &str) -> BuildResult<String> {
        let missing = unresolved_tokens(template, &self.values)?;
        if !missing.is_empty() {
            match self.mode {
                TemplateMode::Strict => {
                    return Err(BuildError::template(
                        name,
                        format!("unresolved tokens: {}", missing.join(", ")),
                    ))
                }
                TemplateMode::Lenient => {
                    debug!("{}: leaving unresolved tokens {}", name, missing.join(", "));
                }
            }
        }
        substitute(name, template, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_known_tokens_replaced() {
        let out = replace_tokens(
            "minSdkVersion **MINSDKVERSION**\ntargetSdkVersion **TARGETSDKVERSION**\n",
            &values(&[("MINSDKVERSION", "19"), ("TARGETSDKVERSION", "29")]),
        )
        .unwrap();
        assert_eq!(out, "minSdkVersion 19\ntargetSdkVersion 29\n");
    }

    #[test]
    fn test_unknown_tokens_left_verbatim() {
        let out = replace_tokens("a **KNOWN** b **UNKNOWN** c", &values(&[("KNOWN", "k")])).unwrap();
        assert_eq!(out, "a k b **UNKNOWN** c");
    }

    #[test]
    fn test_lowercase_is_not_a_token() {
        let out = replace_tokens("**lower** **UP**", &values(&[("UP", "u"), ("lower", "x")])).unwrap();
        assert_eq!(out, "**lower** u");
    }

    #[test]
    fn test_crlf_rejected() {
        let err = replace_tokens("a\r\nb", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::Template { .. }));
    }

    #[test]
    fn test_unresolved_tokens_listed_once() {
        let missing =
            unresolved_tokens("**A** **B** **A** **C**", &values(&[("B", "")])).unwrap();
        assert_eq!(missing, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_strict_mode_rejects_leftovers() {
        let mut template_values = TemplateValues::new().with_mode(TemplateMode::Strict);
        template_values.insert("DEPS", "");
        assert!(template_values.render("build.gradle", "**DEPS**").is_ok());
        let err = template_values
            .render("build.gradle", "**DEPS** **SPLITS**")
            .unwrap_err();
        assert!(err.to_string().contains("SPLITS"));
    }

    #[test]
    fn test_append_builds_up_value() {
        let mut template_values = TemplateValues::new();
        template_values.append("DEPS", "a\n");
        template_values.append("DEPS", "b\n");
        assert_eq!(template_values.get("DEPS"), Some("a\nb\n"));
    }
}
