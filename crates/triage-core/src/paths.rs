use std::path::{Path, PathBuf};

pub const TRIAGE_DIR: &str = ".triage";
pub const CONFIG_FILE: &str = ".triage/config.yaml";

pub fn triage_dir(root: &Path) -> PathBuf {
    root.join(TRIAGE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}
