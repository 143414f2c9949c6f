// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover :: depfile  —  make-style dependency rule parser
//
//  Reads the text a GCC-compatible preprocessor prints under `-M`:
//
//      sketch.cpp.o: /build/sketch/sketch.cpp /libs/Servo/Servo.h \
//        /build/sketch/de\ bug.h Wire.h
//
//  and returns the prerequisite paths in first-seen order, without the
//  rule targets and without duplicates.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{DiscoverError, Result};

/// One logical rule: targets and prerequisites, escapes already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRule {
    pub targets:       Vec<String>,
    pub prerequisites: Vec<String>,
}

/// Parse dependency output into a de-duplicated, order-stable list of
/// prerequisite paths.
pub fn parse(text: &str) -> Result<Vec<PathBuf>> {
    let rules = parse_rules(text)?;

    let mut seen: HashSet<PathBuf> = rules
        .iter()
        .flat_map(|r| r.targets.iter())
        .map(|t| normalize(Path::new(t)))
        .collect();

    let mut out = Vec::new();
    for rule in &rules {
        for dep in &rule.prerequisites {
            let path = normalize(Path::new(dep));
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

/// Split the text into rules. Continuation lines are joined first; an escape
/// left open at the very end of the text is an error.
pub fn parse_rules(text: &str) -> Result<Vec<DependencyRule>> {
    let mut rules  = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut token  = String::new();
    let mut line   = 1usize;
    let mut rule_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                None => {
                    return Err(DiscoverError::parse(line, "text ends inside an escape sequence"));
                }
                Some('\n') => {
                    chars.next();
                    line += 1;
                    flush(&mut token, &mut tokens);
                    if chars.peek().is_none() {
                        return Err(DiscoverError::parse(line, "continuation marker on the last line"));
                    }
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    line += 1;
                    flush(&mut token, &mut tokens);
                    if chars.peek().is_none() {
                        return Err(DiscoverError::parse(line, "continuation marker on the last line"));
                    }
                }
                Some(' ') => { chars.next(); token.push(' '); }
                Some('#') => { chars.next(); token.push('#'); }
                // Anything else is a literal backslash (Windows separators).
                Some(_) => token.push('\\'),
            },
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                token.push('$');
            }
            ' ' | '\t' => flush(&mut token, &mut tokens),
            '\r' => {}
            '\n' => {
                flush(&mut token, &mut tokens);
                if let Some(rule) = finish_rule(std::mem::take(&mut tokens), rule_line)? {
                    rules.push(rule);
                }
                line += 1;
                rule_line = line;
            }
            _ => token.push(c),
        }
    }

    flush(&mut token, &mut tokens);
    if let Some(rule) = finish_rule(tokens, rule_line)? {
        rules.push(rule);
    }
    Ok(rules)
}

fn flush(token: &mut String, tokens: &mut Vec<String>) {
    if !token.is_empty() {
        tokens.push(std::mem::take(token));
    }
}

fn finish_rule(tokens: Vec<String>, line: usize) -> Result<Option<DependencyRule>> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let sep = tokens
        .iter()
        .position(|t| t.ends_with(':'))
        .ok_or_else(|| DiscoverError::parse(line, format!("no rule target in `{}`", tokens.join(" "))))?;

    let mut tokens = tokens;
    let prerequisites = tokens.split_off(sep + 1);
    let targets = tokens
        .into_iter()
        .map(|t| t.trim_end_matches(':').to_owned())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(Some(DependencyRule { targets, prerequisites }))
}

/// Lexical clean-up: drops `.` components and folds `dir/..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let folds = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if folds {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// `path` joined onto the working directory when relative, then normalized.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}
