//! Path templates that locate release artifacts inside a store.
//!
//! The syntax is the small template dialect used by existing spec files:
//! literal text, field references such as `{{.Name}}`, and
//! `{{trimSuffix .Field "suffix"}}`. A template can be rendered for a spec or
//! inverted into a regular expression that captures chosen fields.

use regex::Regex;
use std::fmt;
use thiserror::Error;

use crate::model::ComponentSpec;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to parse path template {template:?}: {message}")]
    Syntax { template: String, message: String },

    #[error("path template {template:?} refers to unknown field .{field}")]
    UnknownField { template: String, field: String },

    #[error("path template {template:?} calls unknown function {function:?}")]
    UnknownFunction { template: String, function: String },

    #[error("path template {template:?} does not produce a valid pattern: {source}")]
    InvalidPattern {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// A spec field a template may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    Name,
    Version,
    StemcellOS,
    StemcellVersion,
}

impl TemplateField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Name" => Some(TemplateField::Name),
            "Version" => Some(TemplateField::Version),
            "StemcellOS" => Some(TemplateField::StemcellOS),
            "StemcellVersion" => Some(TemplateField::StemcellVersion),
            _ => None,
        }
    }

    /// Capture group name used by [`PathTemplate::pattern`].
    pub fn group_name(&self) -> &'static str {
        match self {
            TemplateField::Name => "name",
            TemplateField::Version => "version",
            TemplateField::StemcellOS => "stemcell_os",
            TemplateField::StemcellVersion => "stemcell_version",
        }
    }

    fn value<'a>(&self, spec: &'a ComponentSpec) -> &'a str {
        match self {
            TemplateField::Name => &spec.name,
            TemplateField::Version => &spec.version,
            TemplateField::StemcellOS => &spec.stemcell_os,
            TemplateField::StemcellVersion => &spec.stemcell_version,
        }
    }

    fn value_pattern(&self) -> &'static str {
        match self {
            TemplateField::Version | TemplateField::StemcellVersion => {
                r"v?\d+(?:\.\d+){0,2}(?:-[0-9A-Za-z.]+)?"
            }
            TemplateField::Name | TemplateField::StemcellOS => r"[^/]+?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Field(String),
    Call {
        function: String,
        field: String,
        argument: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    source: String,
    parts: Vec<Part>,
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let syntax = |message: String| TemplateError::Syntax {
            template: source.to_string(),
            message,
        };

        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or_else(|| syntax("unclosed action".to_string()))?;
            parts.push(parse_action(&after_open[..close]).map_err(syntax)?);
            rest = &after_open[close + 2..];
        }
        if rest.contains("}}") {
            return Err(syntax("unexpected \"}}\"".to_string()));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Renders the template with the spec's field values.
    pub fn render(&self, spec: &ComponentSpec) -> Result<String, TemplateError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(name) => out.push_str(self.field(name)?.value(spec)),
                Part::Call {
                    function,
                    field,
                    argument,
                } => {
                    self.check_function(function)?;
                    let value = self.field(field)?.value(spec);
                    out.push_str(value.strip_suffix(argument.as_str()).unwrap_or(value));
                }
            }
        }
        Ok(out)
    }

    /// Builds an anchored regex matching paths this template could render to.
    ///
    /// Fields listed in `captures` match any plausible value and are exposed as
    /// named groups (first occurrence only); all other fields match the spec's
    /// value literally.
    pub fn pattern(
        &self,
        spec: &ComponentSpec,
        captures: &[TemplateField],
    ) -> Result<Regex, TemplateError> {
        let mut expr = String::from("^");
        let mut named: Vec<TemplateField> = Vec::new();

        for part in &self.parts {
            let (field, suffix) = match part {
                Part::Literal(text) => {
                    expr.push_str(&regex::escape(text));
                    continue;
                }
                Part::Field(name) => (self.field(name)?, None),
                Part::Call {
                    function,
                    field,
                    argument,
                } => {
                    self.check_function(function)?;
                    (self.field(field)?, Some(argument.as_str()))
                }
            };

            if captures.contains(&field) {
                if named.contains(&field) {
                    expr.push_str(&format!("(?:{})", field.value_pattern()));
                } else {
                    named.push(field);
                    expr.push_str(&format!(
                        "(?P<{}>{})",
                        field.group_name(),
                        field.value_pattern()
                    ));
                }
            } else {
                let value = field.value(spec);
                let value = suffix
                    .and_then(|s| value.strip_suffix(s))
                    .unwrap_or(value);
                expr.push_str(&regex::escape(value));
            }
        }
        expr.push('$');

        Regex::new(&expr).map_err(|source| TemplateError::InvalidPattern {
            template: self.source.clone(),
            source,
        })
    }

    fn field(&self, name: &str) -> Result<TemplateField, TemplateError> {
        TemplateField::from_name(name).ok_or_else(|| TemplateError::UnknownField {
            template: self.source.clone(),
            field: name.to_string(),
        })
    }

    fn check_function(&self, function: &str) -> Result<(), TemplateError> {
        if function == "trimSuffix" {
            Ok(())
        } else {
            Err(TemplateError::UnknownFunction {
                template: self.source.clone(),
                function: function.to_string(),
            })
        }
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_action(action: &str) -> Result<Part, String> {
    let tokens = tokenize(action)?;
    match tokens.as_slice() {
        [] => Err("empty action".to_string()),
        [Token::Field(field)] => Ok(Part::Field(field.clone())),
        [Token::Ident(function), Token::Field(field), Token::Str(argument)] => Ok(Part::Call {
            function: function.clone(),
            field: field.clone(),
            argument: argument.clone(),
        }),
        _ => Err(format!("unsupported action {:?}", action.trim())),
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Field(String),
    Ident(String),
    Str(String),
}

fn tokenize(action: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err("unterminated quoted string".to_string()),
                    },
                    Some(other) => value.push(other),
                    None => return Err("unterminated quoted string".to_string()),
                }
            }
            tokens.push(Token::Str(value));
        } else {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_whitespace() || w == '"' {
                    break;
                }
                word.push(w);
                chars.next();
            }
            let field = word.strip_prefix('.').map(str::to_string);
            match field {
                Some(field) if is_identifier(&field) => tokens.push(Token::Field(field)),
                None if is_identifier(&word) => tokens.push(Token::Ident(word)),
                _ => return Err(format!("bad token {:?}", word)),
            }
        }
    }
    Ok(tokens)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
