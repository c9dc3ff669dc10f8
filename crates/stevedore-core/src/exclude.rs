//! Exclusion globs for file synchronization
//!
//! Patterns are matched against the slash-normalized path relative to the
//! synchronized root. Patterns starting with `/` are matched against the
//! absolute local path instead. `*` crosses directory separators.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::paths::to_slash;

/// Ignore files looked up in a component directory, in priority order
pub const IGNORE_FILES: &[&str] = &[".odoignore", ".gitignore"];

/// Rule that is always present when loading from a directory
pub const ALWAYS_IGNORED: &str = ".git";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled exclusion globs
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    patterns: Vec<Pattern>,
}

impl ExcludeRules {
    /// Compile a list of glob expressions
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| {
                let normalized = to_slash(g.as_ref());
                Pattern::new(&normalized).map_err(|e| CoreError::InvalidGlob {
                    pattern: g.as_ref().to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Read rules from `.odoignore`, falling back to `.gitignore`
    ///
    /// `.git` is always excluded. Blank lines, comments and `.git*` entries
    /// are skipped.
    pub fn rules_from_directory(directory: &Path) -> Result<Vec<String>> {
        let mut rules = vec![ALWAYS_IGNORED.to_string()];

        let Some(ignore_file) = IGNORE_FILES
            .iter()
            .map(|name| directory.join(name))
            .find(|p| p.is_file())
        else {
            return Ok(rules);
        };

        tracing::debug!(file = %ignore_file.display(), "loading ignore rules");
        let content = std::fs::read_to_string(&ignore_file)?;
        rules.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(".git"))
                .map(String::from),
        );
        Ok(rules)
    }

    /// Load and compile the rules of a directory, plus extra globs
    pub fn from_directory<S: AsRef<str>>(directory: &Path, extra: &[S]) -> Result<Self> {
        let mut rules = Self::rules_from_directory(directory)?;
        rules.extend(extra.iter().map(|s| s.as_ref().to_string()));
        Self::new(&rules)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether a path must be skipped
    ///
    /// `relative` is the path relative to the synchronized root, `absolute`
    /// the full local path.
    pub fn is_excluded(&self, relative: &str, absolute: &Path) -> bool {
        let relative = to_slash(relative);
        let absolute = to_slash(&absolute.to_string_lossy());

        let hit = self.patterns.iter().find(|p| {
            if p.as_str().starts_with('/') {
                p.matches_with(&absolute, MATCH_OPTIONS)
            } else {
                p.matches_with(&relative, MATCH_OPTIONS)
            }
        });

        if let Some(pattern) = hit {
            tracing::debug!(path = %relative, rule = %pattern, "ignoring path because of glob rule");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_relative_patterns() {
        let rules = ExcludeRules::new(&["build/*", "*.log"]).unwrap();
        let root = PathBuf::from("/work");

        assert!(rules.is_excluded("build/out.bin", &root.join("build/out.bin")));
        assert!(!rules.is_excluded("build", &root.join("build")));
        assert!(rules.is_excluded("logs/app.log", &root.join("logs/app.log")));
        assert!(!rules.is_excluded("src/main.go", &root.join("src/main.go")));
    }

    #[test]
    fn test_backslashes_are_normalized() {
        let rules = ExcludeRules::new(&["build\\*"]).unwrap();
        assert!(rules.is_excluded("build\\out.bin", Path::new("C:\\work\\build\\out.bin")));
    }

    #[test]
    fn test_absolute_patterns() {
        let rules = ExcludeRules::new(&["/work/tmp*"]).unwrap();
        assert!(rules.is_excluded("tmp", Path::new("/work/tmp")));
        assert!(!rules.is_excluded("tmp", Path::new("/other/tmp")));
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            ExcludeRules::new(&["[unclosed"]),
            Err(CoreError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_rules_from_directory_prefers_odoignore() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target\n").unwrap();
        std::fs::write(
            dir.path().join(".odoignore"),
            "# comment\n\nnode_modules\n.gitkeep\n  dist  \n",
        )
        .unwrap();

        let rules = ExcludeRules::rules_from_directory(dir.path()).unwrap();
        assert_eq!(rules, vec![".git", "node_modules", "dist"]);
    }

    #[test]
    fn test_rules_from_directory_gitignore_fallback() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target\n").unwrap();
        let rules = ExcludeRules::rules_from_directory(dir.path()).unwrap();
        assert_eq!(rules, vec![".git", "target"]);
    }

    #[test]
    fn test_rules_from_empty_directory() {
        let dir = TempDir::new().unwrap();
        let rules = ExcludeRules::from_directory(dir.path(), &["*.tmp"]).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.is_excluded(".git", &dir.path().join(".git")));
    }
}
