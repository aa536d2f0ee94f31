use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const MIGRA_DIR: &str = ".migra";
pub const STATE_FILE: &str = ".migra/state.json";
pub const CONFIG_FILE: &str = "migra.yaml";
pub const DEFAULT_TENANTS_FILE: &str = "tenants.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn migra_dir(root: &Path) -> PathBuf {
    root.join(MIGRA_DIR)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            state_path(root),
            PathBuf::from("/tmp/proj/.migra/state.json")
        );
        assert_eq!(migra_dir(root), PathBuf::from("/tmp/proj/.migra"));
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/migra.yaml"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/app");
        assert_eq!(
            resolve_against(base, Path::new("/opt/users")),
            PathBuf::from("/opt/users")
        );
        assert_eq!(
            resolve_against(base, Path::new("services/users")),
            PathBuf::from("/srv/app/services/users")
        );
    }
}
