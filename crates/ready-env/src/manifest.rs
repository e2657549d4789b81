//! Requirements-file parsing.
//!
//! The manifest is read-only input: an ordered list of package constraints plus
//! any pip option lines, which are kept verbatim and handed back to pip through
//! the requirements file itself.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read dependency manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: invalid package name in '{text}'")]
    InvalidName { line: usize, text: String },
    #[error("line {line}: invalid version specifier '{text}'")]
    InvalidSpecifier { line: usize, text: String },
    #[error("line {line}: unterminated extras in '{text}'")]
    UnterminatedExtras { line: usize, text: String },
    #[error("line {line}: package '{name}' already declared on line {first_line}")]
    Duplicate {
        line: usize,
        name: String,
        first_line: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VersionOp {
    ArbitraryEqual,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Compatible,
    Less,
    Greater,
}

impl VersionOp {
    // Longest operators first so `===` is not read as `==` followed by `=`.
    const PARSE_ORDER: [(&'static str, VersionOp); 8] = [
        ("===", VersionOp::ArbitraryEqual),
        ("==", VersionOp::Equal),
        ("!=", VersionOp::NotEqual),
        ("<=", VersionOp::LessEqual),
        (">=", VersionOp::GreaterEqual),
        ("~=", VersionOp::Compatible),
        ("<", VersionOp::Less),
        (">", VersionOp::Greater),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArbitraryEqual => "===",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Compatible => "~=",
            Self::Less => "<",
            Self::Greater => ">",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSpecifier {
    pub op: VersionOp,
    pub version: String,
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub line_number: usize,
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<VersionSpecifier>,
    pub url: Option<String>,
    pub marker: Option<String>,
}

impl Requirement {
    pub fn normalized_name(&self) -> String {
        normalize_package_name(&self.name)
    }

    /// The exact version when the requirement is a single non-wildcard `==` pin.
    pub fn pinned_version(&self) -> Option<&str> {
        match self.specifiers.as_slice() {
            [only] if only.op == VersionOp::Equal && !only.version.contains('*') => {
                Some(only.version.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestOption {
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DependencyManifest {
    pub requirements: Vec<Requirement>,
    pub options: Vec<ManifestOption>,
}

impl DependencyManifest {
    pub fn find(&self, package: &str) -> Option<&Requirement> {
        let wanted = normalize_package_name(package);
        self.requirements
            .iter()
            .find(|requirement| requirement.normalized_name() == wanted)
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.options.is_empty()
    }
}

/// PEP 503 name normalization: lowercase, runs of `-_.` collapse to `-`.
pub fn normalize_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut previous_separator = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !previous_separator {
                normalized.push('-');
            }
            previous_separator = true;
        } else {
            normalized.extend(ch.to_lowercase());
            previous_separator = false;
        }
    }
    normalized
}

pub fn load_manifest(path: &Path) -> Result<DependencyManifest, ManifestError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifest(&raw)
}

pub fn parse_manifest(raw: &str) -> Result<DependencyManifest, ManifestError> {
    let mut manifest = DependencyManifest::default();
    let mut first_seen: BTreeMap<String, usize> = BTreeMap::new();

    for (line_number, line) in logical_lines(raw) {
        let line = strip_inline_comment(&line);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('-') {
            manifest.options.push(ManifestOption {
                line_number,
                text: trimmed.to_string(),
            });
            continue;
        }

        let requirement = parse_requirement(line_number, trimmed)?;
        let normalized = requirement.normalized_name();
        if let Some(first_line) = first_seen.get(&normalized) {
            return Err(ManifestError::Duplicate {
                line: line_number,
                name: requirement.name,
                first_line: *first_line,
            });
        }
        first_seen.insert(normalized, line_number);
        manifest.requirements.push(requirement);
    }

    Ok(manifest)
}

/// Joins backslash continuations, reporting the line number where each logical line starts.
fn logical_lines(raw: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (index, line) in raw.lines().enumerate() {
        let (start, mut buffer) = pending.take().unwrap_or((index + 1, String::new()));
        if let Some(stripped) = line.strip_suffix('\\') {
            buffer.push_str(stripped);
            pending = Some((start, buffer));
            continue;
        }
        buffer.push_str(line);
        lines.push((start, buffer));
    }
    if let Some(rest) = pending {
        lines.push(rest);
    }
    lines
}

fn strip_inline_comment(line: &str) -> String {
    if line.trim_start().starts_with('#') {
        return String::new();
    }
    // pip only treats `#` as a comment when preceded by whitespace; URLs keep fragments.
    let bytes = line.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte == b'#' && index > 0 && bytes[index - 1].is_ascii_whitespace() {
            return line[..index].to_string();
        }
    }
    line.to_string()
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')
}

fn parse_requirement(line_number: usize, text: &str) -> Result<Requirement, ManifestError> {
    let (body, marker) = match text.split_once(';') {
        Some((body, marker)) => (body.trim(), Some(marker.trim().to_string())),
        None => (text, None),
    };
    let marker = marker.filter(|value| !value.is_empty());

    let name_len = body.chars().take_while(|ch| is_name_char(*ch)).count();
    let name = &body[..name_len];
    let starts_alphanumeric = name
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphanumeric());
    if !starts_alphanumeric {
        return Err(ManifestError::InvalidName {
            line: line_number,
            text: text.to_string(),
        });
    }

    let mut rest = body[name_len..].trim_start();
    let mut extras = Vec::new();
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let Some((inside, after)) = after_bracket.split_once(']') else {
            return Err(ManifestError::UnterminatedExtras {
                line: line_number,
                text: text.to_string(),
            });
        };
        extras = inside
            .split(',')
            .map(str::trim)
            .filter(|extra| !extra.is_empty())
            .map(str::to_string)
            .collect();
        rest = after.trim_start();
    }

    if let Some(url) = rest.strip_prefix('@') {
        let url = url.trim();
        if url.is_empty() {
            return Err(ManifestError::InvalidSpecifier {
                line: line_number,
                text: text.to_string(),
            });
        }
        return Ok(Requirement {
            line_number,
            name: name.to_string(),
            extras,
            specifiers: Vec::new(),
            url: Some(url.to_string()),
            marker,
        });
    }

    let specifiers = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',')
            .map(|clause| parse_specifier(line_number, clause.trim(), text))
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(Requirement {
        line_number,
        name: name.to_string(),
        extras,
        specifiers,
        url: None,
        marker,
    })
}

fn parse_specifier(
    line_number: usize,
    clause: &str,
    text: &str,
) -> Result<VersionSpecifier, ManifestError> {
    let invalid = || ManifestError::InvalidSpecifier {
        line: line_number,
        text: text.to_string(),
    };
    let (op, version) = VersionOp::PARSE_ORDER
        .iter()
        .find_map(|(token, op)| clause.strip_prefix(token).map(|rest| (*op, rest.trim())))
        .ok_or_else(invalid)?;
    let valid_version = !version.is_empty()
        && version
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '*' | '+' | '!' | '-' | '_'));
    if !valid_version {
        return Err(invalid());
    }
    Ok(VersionSpecifier {
        op,
        version: version.to_string(),
    })
}
