//! Lenient semantic version and constraint parsing.
//!
//! Release versions found in stores and spec files are not always strict
//! semver: they may carry a `v` prefix or omit the minor/patch components.
//! Constraints use the comparator dialect common in spec files, where a bare
//! version means an exact match and `||` separates alternatives.

use anyhow::{Context, Result, anyhow};
use semver::{Version, VersionReq};
use std::fmt;

/// Constraint used when a spec leaves its version empty.
pub const DEFAULT_VERSION_CONSTRAINT: &str = ">0";

/// Parses a version, accepting a leading `v` and padding missing components.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }
    let padded = pad_version(trimmed).ok_or_else(|| anyhow!("invalid version {:?}", input))?;
    Version::parse(&padded).with_context(|| format!("invalid version {:?}", input))
}

/// Pads `1` and `1.2` (optionally followed by pre-release/build data) to three components.
fn pad_version(input: &str) -> Option<String> {
    let split_at = input.find(['-', '+']).unwrap_or(input.len());
    let (core, rest) = input.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Some(padded)
}

/// A set of alternative version requirements; a version matches when any alternative does.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    pub fn parse(input: &str) -> Result<Self> {
        let source = if input.trim().is_empty() {
            DEFAULT_VERSION_CONSTRAINT.to_string()
        } else {
            input.trim().to_string()
        };

        let mut alternatives = Vec::new();
        for alternative in source.split("||") {
            let comparators = normalize_comparators(alternative)
                .with_context(|| format!("invalid version constraint {:?}", source))?;
            let req = VersionReq::parse(&comparators)
                .with_context(|| format!("invalid version constraint {:?}", source))?;
            alternatives.push(req);
        }

        Ok(Self {
            source,
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Rewrites one alternative into the comma-separated comparator list `semver` expects.
fn normalize_comparators(alternative: &str) -> Result<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for raw in alternative.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
        let op_len = raw
            .find(|c: char| !matches!(c, '>' | '<' | '=' | '~' | '^'))
            .unwrap_or(raw.len());
        let (op, operand) = raw.split_at(op_len);

        // "> 1.2" is written with a space between operator and version
        if operand.is_empty() {
            pending_op = Some(op.to_string());
            continue;
        }
        let op = match pending_op.take() {
            Some(p) if op.is_empty() => p,
            _ => op.to_string(),
        };
        tokens.push(comparator(&op, operand)?);
    }

    if pending_op.is_some() {
        anyhow::bail!("dangling comparison operator in {:?}", alternative);
    }
    if tokens.is_empty() {
        return Ok("*".to_string());
    }
    Ok(tokens.join(", "))
}

fn comparator(op: &str, operand: &str) -> Result<String> {
    let operand = operand.strip_prefix('v').unwrap_or(operand);
    if matches!(operand, "*" | "x" | "X") {
        return Ok("*".to_string());
    }
    let op = match op {
        // A bare version is an exact requirement, not a caret one
        "" => "=",
        "==" => "=",
        "~>" => "~",
        other => other,
    };
    // ">0" means "anything greater than 0.0.0", which semver spells with a full version
    if op == ">" && !operand.contains(['x', 'X', '*']) {
        if let Some(padded) = pad_version(operand) {
            return Ok(format!(">{}", padded));
        }
    }
    Ok(format!("{}{}", op, operand))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("7"), Version::new(7, 0, 0));
        assert_eq!(v("1.2-rc.1").pre.as_str(), "rc.1");
        assert!(parse_version("not-a-version").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn test_empty_constraint_matches_any_release() {
        let c = VersionConstraint::parse("").unwrap();
        assert_eq!(c.as_str(), ">0");
        assert!(c.matches(&v("0.1.0")));
        assert!(c.matches(&v("42.0.0")));
        assert!(!c.matches(&v("0.0.0")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let c = VersionConstraint::parse("1.2.3").unwrap();
        assert!(c.matches(&v("1.2.3")));
        assert!(!c.matches(&v("1.2.4")));
        assert!(!c.matches(&v("1.3.0")));
    }

    #[test]
    fn test_tilde_major_constraint() {
        let c = VersionConstraint::parse("~1").unwrap();
        assert!(c.matches(&v("1.0.0")));
        assert!(c.matches(&v("1.1.0")));
        assert!(!c.matches(&v("2.0.0")));
    }

    #[test]
    fn test_space_separated_and_alternatives() {
        let c = VersionConstraint::parse(">= 1.1, < 1.3 || 2.0.0").unwrap();
        assert!(c.matches(&v("1.2.9")));
        assert!(!c.matches(&v("1.3.0")));
        assert!(c.matches(&v("2.0.0")));
        assert!(!c.matches(&v("2.0.1")));
    }

    #[test]
    fn test_wildcards() {
        let c = VersionConstraint::parse("1.2.x").unwrap();
        assert!(c.matches(&v("1.2.7")));
        assert!(!c.matches(&v("1.3.0")));

        let any = VersionConstraint::parse("*").unwrap();
        assert!(any.matches(&v("3.4.5")));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(VersionConstraint::parse("not a constraint").is_err());
        assert!(VersionConstraint::parse(">=").is_err());
    }
}
