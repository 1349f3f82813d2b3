use std::path::{Path, PathBuf};
use triage_core::paths::triage_dir;

/// Resolve the workspace root holding `.triage/`.
///
/// Priority:
/// 1. `--root` flag / `TRIAGE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.triage/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or(cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| triage_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use triage_core::paths::TRIAGE_DIR;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_triage_dir_from_nested_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(TRIAGE_DIR)).unwrap();
        let nested = dir.path().join("playbooks/phishing");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_upward(&nested).as_deref(), Some(dir.path()));
    }

    #[test]
    fn plain_file_named_triage_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(TRIAGE_DIR), "").unwrap();
        assert_ne!(find_upward(dir.path()).as_deref(), Some(dir.path()));
    }
}
