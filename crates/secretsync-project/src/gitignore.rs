//! Keeps local-only files out of version control

use std::fs;
use std::io;
use std::path::Path;

use crate::SyncError;

/// Append `/<name>` to the `.gitignore` in `dir` unless a line already matches it
///
/// Returns whether the file was changed.
pub fn ensure_ignored(dir: &Path, name: &str) -> Result<bool, SyncError> {
    let path = dir.join(".gitignore");

    let mut content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(SyncError::io(&path, e)),
    };

    if content.lines().any(|line| line_matches(line, name)) {
        return Ok(false);
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("/{name}\n"));

    fs::write(&path, content).map_err(|e| SyncError::io(&path, e))?;
    tracing::debug!(path = %path.display(), entry = name, "Updated .gitignore");
    Ok(true)
}

fn line_matches(line: &str, name: &str) -> bool {
    let pattern = line.split('#').next().unwrap_or_default().trim();
    let pattern = pattern.trim_start_matches('/');
    !pattern.is_empty() && wildcard_match(pattern, name)
}

/// `*` matches any run of characters, `?` any single character
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
