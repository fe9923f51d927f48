//! Secret classes: which classed entries a checkout syncs
//!
//! The selection is persisted in `.localsecretclasses` as a single line such
//! as `+all,-staging` or `+dev,+ci`.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::{SecretEntry, SyncError};

/// Persisted class selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilter {
    pub default_all: bool,
    pub add: BTreeSet<String>,
    pub subtract: BTreeSet<String>,
}

impl ClassFilter {
    /// Entries without a class are always selected
    pub fn selects(&self, class: Option<&str>) -> bool {
        match class {
            None => true,
            Some(class) => {
                (self.default_all || self.add.contains(class)) && !self.subtract.contains(class)
            }
        }
    }

    /// Split entries into (selected, excluded), keeping their order
    pub fn partition<'a>(&self, entries: &'a [SecretEntry]) -> (Vec<&'a SecretEntry>, Vec<&'a SecretEntry>) {
        entries
            .iter()
            .partition(|entry| self.selects(entry.class.as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        !self.default_all && self.add.is_empty() && self.subtract.is_empty()
    }

    /// Parse the class file content; unknown tokens are ignored
    pub fn parse(content: &str) -> Self {
        let mut filter = Self::default();
        for token in content.split(',').map(str::trim) {
            if token == "+all" {
                filter.default_all = true;
            } else if let Some(class) = token.strip_prefix('+') {
                filter.add.insert(class.to_string());
            } else if let Some(class) = token.strip_prefix('-') {
                filter.subtract.insert(class.to_string());
            }
        }
        filter
    }

    /// Render as the one-line class file format (without newline)
    pub fn render(&self) -> String {
        if self.default_all {
            std::iter::once("+all".to_string())
                .chain(self.subtract.iter().map(|class| format!("-{class}")))
                .collect::<Vec<_>>()
                .join(",")
        } else {
            self.add
                .iter()
                .map(|class| format!("+{class}"))
                .collect::<Vec<_>>()
                .join(",")
        }
    }

    /// Read the class file; a missing file is the empty selection
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Write the class file; returns whether anything was written
    ///
    /// An empty selection is only written when a class file already exists.
    pub fn save(&self, path: &Path) -> Result<bool, SyncError> {
        if self.is_empty() && !path.exists() {
            return Ok(false);
        }
        fs::write(path, format!("{}\n", self.render())).map_err(|e| SyncError::io(path, e))?;
        Ok(true)
    }

    /// Merge a command-line update into this selection
    pub fn apply(&mut self, update: &ClassUpdate) {
        if update.reset {
            *self = Self::default();
        }
        if update.default_all {
            *self = Self {
                default_all: true,
                ..Self::default()
            };
        }

        for class in &update.add {
            let removed = self.subtract.remove(class);
            if !self.default_all && !removed {
                self.add.insert(class.clone());
            }
        }

        for class in &update.subtract {
            let removed = self.add.remove(class);
            if self.default_all && !removed {
                self.subtract.insert(class.clone());
            }
        }
    }
}

/// Class changes requested on the command line, e.g. `+all,-staging`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassUpdate {
    /// `-all`
    pub reset: bool,
    /// `+all`
    pub default_all: bool,
    pub add: Vec<String>,
    pub subtract: Vec<String>,
}

impl ClassUpdate {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let mut update = Self::default();
        for token in raw.split(',').map(str::trim) {
            match token {
                "" => {}
                "-all" => update.reset = true,
                "+all" => update.default_all = true,
                _ => {
                    if let Some(class) = token.strip_prefix('+') {
                        update.add.push(class.to_string());
                    } else if let Some(class) = token.strip_prefix('-') {
                        update.subtract.push(class.to_string());
                    } else {
                        return Err(SyncError::config(format!(
                            "Unexpected class argument '{token}', expected +class or -class"
                        )));
                    }
                }
            }
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(classes: &[&str]) -> BTreeSet<String> {
        classes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_selects() {
        let filter = ClassFilter {
            default_all: true,
            add: BTreeSet::new(),
            subtract: set(&["prod"]),
        };
        assert!(filter.selects(None));
        assert!(filter.selects(Some("dev")));
        assert!(!filter.selects(Some("prod")));

        let filter = ClassFilter {
            default_all: false,
            add: set(&["dev"]),
            subtract: BTreeSet::new(),
        };
        assert!(filter.selects(Some("dev")));
        assert!(!filter.selects(Some("prod")));
        assert!(filter.selects(None));
    }

    #[test]
    fn test_parse_and_render() {
        let filter = ClassFilter::parse("+all, -prod,-staging\n");
        assert!(filter.default_all);
        assert_eq!(filter.subtract, set(&["prod", "staging"]));
        assert_eq!(filter.render(), "+all,-prod,-staging");

        let filter = ClassFilter::parse("+dev,+ci");
        assert_eq!(filter.render(), "+ci,+dev");
    }

    #[test]
    fn test_update_parse() {
        let update = ClassUpdate::parse(",-all,+dev,-prod").unwrap();
        assert!(update.reset);
        assert!(!update.default_all);
        assert_eq!(update.add, vec!["dev"]);
        assert_eq!(update.subtract, vec!["prod"]);

        assert!(ClassUpdate::parse("").unwrap().is_empty());
        assert!(matches!(ClassUpdate::parse("dev"), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_apply_add_removes_from_subtract_first() {
        let mut filter = ClassFilter::parse("+all,-prod");
        filter.apply(&ClassUpdate::parse("+prod").unwrap());
        assert!(filter.default_all);
        assert!(filter.subtract.is_empty());
        assert!(filter.add.is_empty());
    }

    #[test]
    fn test_apply_subtract_under_default_all() {
        let mut filter = ClassFilter::default();
        filter.apply(&ClassUpdate::parse("+all,-prod").unwrap());
        assert!(filter.default_all);
        assert_eq!(filter.subtract, set(&["prod"]));
    }

    #[test]
    fn test_apply_subtract_without_default_all() {
        let mut filter = ClassFilter::parse("+dev,+ci");
        filter.apply(&ClassUpdate::parse("-dev,-prod").unwrap());
        assert_eq!(filter.add, set(&["ci"]));
        assert!(filter.subtract.is_empty());
    }

    #[test]
    fn test_apply_reset_then_add() {
        let mut filter = ClassFilter::parse("+all,-prod");
        filter.apply(&ClassUpdate::parse("-all,+dev").unwrap());
        assert!(!filter.default_all);
        assert_eq!(filter.add, set(&["dev"]));
        assert!(filter.subtract.is_empty());
    }

    #[test]
    fn test_save_skips_empty_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".localsecretclasses");

        assert!(!ClassFilter::default().save(&path).unwrap());
        assert!(!path.exists());

        assert!(ClassFilter::parse("+dev").save(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "+dev\n");

        // an existing file is cleared rather than left stale
        assert!(ClassFilter::default().save(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "\n");
    }
}
