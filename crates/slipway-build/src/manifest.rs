//! Textual patching of `AndroidManifest.xml` templates
//!
//! Edits are done on the raw text so that formatting and comments in the
//! template survive. Only the handful of elements the packaging stage touches
//! are understood: the root `<manifest>`, `<activity>`, `<uses-permission>`,
//! `<uses-sdk>` and application `<meta-data>`.

use crate::error::{BuildError, BuildResult};
use regex::Regex;
use std::fs;
use std::path::Path;

const MAIN_ACTION: &str = "android.intent.action.MAIN";
const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";
/// Opening `<activity>` tag; `<activity-alias>` does not match
const ACTIVITY_TAG: &str = r"<activity(?:\s[^>]*)?>";

/// Config changes an engine activity handles itself
pub const CONFIG_CHANGES: &str = "mcc|mnc|locale|touchscreen|keyboard|keyboardHidden|navigation|orientation|screenLayout|uiMode|screenSize|smallestScreenSize|fontScale|layoutDirection";

/// A manifest being patched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidManifest {
    name: String,
    contents: String,
}

impl AndroidManifest {
    /// Wrap manifest text; `name` identifies it in errors
    pub fn parse(name: impl Into<String>, contents: impl Into<String>) -> BuildResult<Self> {
        let name = name.into();
        let contents = contents.into();
        if !contents.contains("<manifest") {
            return Err(BuildError::template(name, "no <manifest> element"));
        }
        Ok(Self { name, contents })
    }

    pub fn load(path: &Path) -> BuildResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::parse(path.display().to_string(), contents)
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn into_contents(self) -> String {
        self.contents
    }

    pub fn package_name(&self) -> BuildResult<Option<String>> {
        let (start, end) = self.manifest_tag()?;
        attribute(&self.contents[start..end], "package")
    }

    pub fn set_package_name(&mut self, package: &str) -> BuildResult<()> {
        self.set_manifest_attribute("package", package)
    }

    /// `auto`, `preferExternal` or `internalOnly`
    pub fn set_install_location(&mut self, location: &str) -> BuildResult<()> {
        self.set_manifest_attribute("android:installLocation", location)
    }

    /// Names of all declared activities
    pub fn activities(&self) -> BuildResult<Vec<String>> {
        let pattern = Regex::new(ACTIVITY_TAG)?;
        let mut names = Vec::new();
        for tag in pattern.find_iter(&self.contents) {
            if let Some(name) = attribute(tag.as_str(), "android:name")? {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Set an attribute on the named activity; false when no such activity exists
    pub fn set_activity_attribute(
        &mut self,
        activity: &str,
        attr: &str,
        value: &str,
    ) -> BuildResult<bool> {
        let pattern = Regex::new(ACTIVITY_TAG)?;
        let mut target = None;
        for tag in pattern.find_iter(&self.contents) {
            if attribute(tag.as_str(), "android:name")?.as_deref() == Some(activity) {
                target = Some((tag.start(), tag.end()));
                break;
            }
        }

        let Some((start, end)) = target else {
            return Ok(false);
        };
        let patched = set_attribute(&self.contents[start..end], attr, value)?;
        self.contents.replace_range(start..end, &patched);
        Ok(true)
    }

    /// The activity with a MAIN action and LAUNCHER category, if any
    pub fn activity_with_launch_intent(&self) -> BuildResult<Option<String>> {
        let pattern = Regex::new(ACTIVITY_TAG)?;
        for tag in pattern.find_iter(&self.contents) {
            if tag.as_str().ends_with("/>") {
                continue;
            }
            let rest = &self.contents[tag.end()..];
            let body = match rest.find("</activity>") {
                Some(end) => &rest[..end],
                None => rest,
            };
            if body.contains(MAIN_ACTION) && body.contains(LAUNCHER_CATEGORY) {
                return attribute(tag.as_str(), "android:name");
            }
        }
        Ok(None)
    }

    /// Add a `<uses-permission>`; false when already present
    pub fn add_uses_permission(&mut self, permission: &str) -> BuildResult<bool> {
        let existing = Regex::new(&format!(
            r#"<uses-permission\b[^>]*android:name\s*=\s*"{}""#,
            regex::escape(permission)
        ))?;
        if existing.is_match(&self.contents) {
            return Ok(false);
        }

        let element = format!(
            "<uses-permission android:name=\"{}\" />",
            escape_attribute(permission)
        );
        self.insert_before_application(&element)?;
        Ok(true)
    }

    /// Set min and target API levels on `<uses-sdk>`, adding it when missing
    pub fn set_uses_sdk(&mut self, min_api: u32, target_api: u32) -> BuildResult<()> {
        let pattern = Regex::new(r"<uses-sdk\b[^>]*>")?;
        if let Some(tag) = pattern.find(&self.contents) {
            let (start, end) = (tag.start(), tag.end());
            let patched = set_attribute(tag.as_str(), "android:minSdkVersion", &min_api.to_string())?;
            let patched = set_attribute(&patched, "android:targetSdkVersion", &target_api.to_string())?;
            self.contents.replace_range(start..end, &patched);
            return Ok(());
        }

        let element = format!(
            "<uses-sdk android:minSdkVersion=\"{}\" android:targetSdkVersion=\"{}\" />",
            min_api, target_api
        );
        self.insert_before_application(&element)
    }

    /// Set an application `<meta-data>` value, adding the element when missing
    pub fn add_application_meta_data(&mut self, name: &str, value: &str) -> BuildResult<()> {
        let existing = Regex::new(&format!(
            r#"<meta-data\b[^>]*android:name\s*=\s*"{}"[^>]*>"#,
            regex::escape(name)
        ))?;
        if let Some(tag) = existing.find(&self.contents) {
            let (start, end) = (tag.start(), tag.end());
            let patched = set_attribute(tag.as_str(), "android:value", value)?;
            self.contents.replace_range(start..end, &patched);
            return Ok(());
        }

        let application = Regex::new(r"<application\b[^>]*>")?;
        let tag = application
            .find(&self.contents)
            .ok_or_else(|| BuildError::template(&self.name, "no <application> element"))?;
        if tag.as_str().ends_with("/>") {
            return Err(BuildError::template(
                &self.name,
                "<application> element has no body",
            ));
        }

        let element = format!(
            "\n        <meta-data android:name=\"{}\" android:value=\"{}\" />",
            escape_attribute(name),
            escape_attribute(value)
        );
        self.contents.insert_str(tag.end(), &element);
        Ok(())
    }

    fn manifest_tag(&self) -> BuildResult<(usize, usize)> {
        let pattern = Regex::new(r"<manifest\b[^>]*>")?;
        pattern
            .find(&self.contents)
            .map(|m| (m.start(), m.end()))
            .ok_or_else(|| BuildError::template(&self.name, "no <manifest> element"))
    }

    fn set_manifest_attribute(&mut self, attr: &str, value: &str) -> BuildResult<()> {
        let (start, end) = self.manifest_tag()?;
        let patched = set_attribute(&self.contents[start..end], attr, value)?;
        self.contents.replace_range(start..end, &patched);
        Ok(())
    }

    fn insert_before_application(&mut self, element: &str) -> BuildResult<()> {
        let index = self
            .contents
            .find("<application")
            .or_else(|| self.contents.find("</manifest>"))
            .ok_or_else(|| BuildError::template(&self.name, "no place to insert elements"))?;

        let indent: String = self.contents[..index]
            .chars()
            .rev()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        self.contents
            .insert_str(index, &format!("{}\n{}", element, indent));
        Ok(())
    }
}

/// Value of `attr` inside a single tag
fn attribute(tag: &str, attr: &str) -> BuildResult<Option<String>> {
    let pattern = Regex::new(&format!(r#"(?:^|\s){}\s*=\s*"([^"]*)""#, regex::escape(attr)))?;
    Ok(pattern.captures(tag).map(|caps| caps[1].to_string()))
}

/// Set or add `attr` inside a single tag
fn set_attribute(tag: &str, attr: &str, value: &str) -> BuildResult<String> {
    let escaped = escape_attribute(value);
    let pattern = Regex::new(&format!(r#"(\s){}\s*=\s*"[^"]*""#, regex::escape(attr)))?;
    if let Some(caps) = pattern.captures(tag) {
        if let Some(whole) = caps.get(0) {
            let mut patched = String::with_capacity(tag.len() + escaped.len());
            patched.push_str(&tag[..whole.start()]);
            patched.push_str(&caps[1]);
            patched.push_str(&format!("{}=\"{}\"", attr, escaped));
            patched.push_str(&tag[whole.end()..]);
            return Ok(patched);
        }
    }

    let close = if tag.ends_with("/>") { tag.len() - 2 } else { tag.len() - 1 };
    let head = tag[..close].trim_end();
    Ok(format!(
        "{} {}=\"{}\"{}{}",
        head,
        attr,
        escaped,
        if tag.ends_with("/>") { " " } else { "" },
        &tag[close..]
    ))
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
