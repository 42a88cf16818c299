//! Relative path syntax shared by document keys and reference fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, ContentResult};

/// A syntactically well-formed, slash-separated logical path inside a collection.
///
/// A relative path is non-empty, has no leading or trailing `/`, no empty segments,
/// no `.` or `..` segments, and contains neither backslashes nor control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Parses and validates a relative path.
    pub fn parse(value: impl Into<String>) -> ContentResult<Self> {
        let value = value.into();
        check(&value).map_err(|reason| ContentError::validation("relativePath", reason))?;

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Returns `true` if `value` satisfies the relative path syntax.
pub fn is_well_formed(value: &str) -> bool {
    check(value).is_ok()
}

fn check(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("path is empty".to_string());
    }
    if value.contains('\\') {
        return Err(format!("path `{value}` contains a backslash"));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("path `{value}` contains a control character"));
    }

    for segment in value.split('/') {
        match segment {
            "" => return Err(format!("path `{value}` has an empty segment")),
            "." | ".." => return Err(format!("path `{value}` has a relative segment `{segment}`")),
            _ => {}
        }
    }

    Ok(())
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RelativePath {
    type Error = ContentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelativePath::parse(value)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = ContentError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        RelativePath::parse(value)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}
