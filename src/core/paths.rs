//! Relative-path safety for files carried inside a patch package.

use crate::core::schema::RESERVED_PATH_CHARS;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathViolation {
    Empty,
    Absolute,
    NulByte,
    ReservedChar(char),
    ParentTraversal,
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "path is empty"),
            Self::Absolute => write!(f, "path must be relative (no leading / or \\)"),
            Self::NulByte => write!(f, "path contains a NUL byte"),
            Self::ReservedChar(c) => write!(f, "path contains reserved character {:?}", c),
            Self::ParentTraversal => write!(f, "path escapes the tree via '..'"),
        }
    }
}

/// NFC-compose `raw`, then lexically normalize it with `/` and `\` both
/// treated as separators. Returns the `/`-joined normalized path, or every
/// violation found. A reserved character is reported once per distinct
/// character, independently of the root and traversal checks.
pub fn normalize_relative(raw: &str) -> Result<String, Vec<PathViolation>> {
    let composed: String = raw.nfc().collect();
    let mut violations = Vec::new();

    if composed.contains('\0') {
        violations.push(PathViolation::NulByte);
    }
    if composed.starts_with(['/', '\\']) {
        violations.push(PathViolation::Absolute);
    }
    for c in composed.chars().filter(|c| RESERVED_PATH_CHARS.contains(c)) {
        let violation = PathViolation::ReservedChar(c);
        if !violations.contains(&violation) {
            violations.push(violation);
        }
    }

    let mut segments: Vec<&str> = Vec::new();
    for seg in composed.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    if segments.contains(&"..") {
        violations.push(PathViolation::ParentTraversal);
    } else if segments.is_empty() {
        violations.push(PathViolation::Empty);
    }

    if violations.is_empty() {
        Ok(segments.join("/"))
    } else {
        Err(violations)
    }
}
