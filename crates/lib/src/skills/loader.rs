//! Load skills from dirs: each skill is a subdirectory holding a SKILL.md with a
//! `---` delimited `key: value` header followed by free-form instructions.
//!
//! Loading never fails as a whole: unreadable or malformed skills are logged and skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fixed name of the instruction file inside each skill directory.
pub const SKILL_FILE: &str = "SKILL.md";

const DELIMITER: &str = "---";

/// A loaded skill. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// Path of the SKILL.md this skill was read from.
    pub source_path: PathBuf,
    /// Body after the header, otherwise unmodified.
    pub instructions: String,
}

/// Why a SKILL.md was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkillParseError {
    #[error("missing opening '---' header delimiter")]
    MissingHeader,
    #[error("missing closing '---' header delimiter")]
    UnterminatedHeader,
    #[error("header has no '{0}' key")]
    MissingKey(&'static str),
}

/// Load skills from the immediate subdirectories of `root`.
///
/// Subdirectories without a SKILL.md are ignored. Order follows directory enumeration and is
/// not stable across platforms. A missing or unreadable `root` yields an empty list.
pub fn load_skills(root: &Path) -> Vec<SkillDescriptor> {
    let mut out = Vec::new();
    let read_dir = match std::fs::read_dir(root) {
        Ok(d) => d,
        Err(e) => {
            log::debug!("skills root {} not readable: {}", root.display(), e);
            return out;
        }
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_md = path.join(SKILL_FILE);
        if !skill_md.is_file() {
            continue;
        }
        let content = match std::fs::read_to_string(&skill_md) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("skipping skill {}: {}", skill_md.display(), e);
                continue;
            }
        };
        match parse_skill(&content, &skill_md) {
            Ok(skill) => out.push(skill),
            Err(e) => log::warn!("skipping skill {}: {}", skill_md.display(), e),
        }
    }
    out
}

/// Load several roots in order. A later root's skill replaces an earlier one with the same
/// name but keeps the earlier display position.
pub fn load_skill_roots(roots: &[PathBuf]) -> Vec<SkillDescriptor> {
    let mut out: Vec<SkillDescriptor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for root in roots {
        for skill in load_skills(root) {
            match index.get(&skill.name) {
                Some(&i) => {
                    log::debug!(
                        "skill {} from {} overrides {}",
                        skill.name,
                        skill.source_path.display(),
                        out[i].source_path.display()
                    );
                    out[i] = skill;
                }
                None => {
                    index.insert(skill.name.clone(), out.len());
                    out.push(skill);
                }
            }
        }
    }
    out
}

/// Parse one SKILL.md. `source_path` is recorded on the descriptor as-is. A leading UTF-8
/// byte order mark is ignored.
pub fn parse_skill(content: &str, source_path: &Path) -> Result<SkillDescriptor, SkillParseError> {
    let (header, body) = split_header(content.trim_start_matches('\u{feff}'))?;

    let mut name = None;
    let mut description = None;
    for line in header.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "name" => &mut name,
            "description" => &mut description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(unquote(value.trim()).to_string());
        }
    }

    let name = name
        .filter(|s| !s.is_empty())
        .ok_or(SkillParseError::MissingKey("name"))?;
    let description = description
        .filter(|s| !s.is_empty())
        .ok_or(SkillParseError::MissingKey("description"))?;

    Ok(SkillDescriptor {
        name,
        description,
        source_path: source_path.to_path_buf(),
        instructions: body.to_string(),
    })
}

/// Split into (header lines, body). The body is whatever follows the closing delimiter
/// line, so exactly one newline (the delimiter's own) is dropped.
fn split_header(content: &str) -> Result<(&str, &str), SkillParseError> {
    let (first, mut rest) = next_line(content);
    if !is_delimiter(first) {
        return Err(SkillParseError::MissingHeader);
    }
    let header_start = rest;
    while !rest.is_empty() {
        let (line, after) = next_line(rest);
        if is_delimiter(line) {
            let header = &header_start[..header_start.len() - rest.len()];
            return Ok((header, after));
        }
        rest = after;
    }
    Err(SkillParseError::UnterminatedHeader)
}

/// First line without its terminator, and the remainder after the terminator.
fn next_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches('\r') == DELIMITER
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}
