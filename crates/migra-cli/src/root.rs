use migra_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the directory whose `.migra/` holds execution state.
///
/// Priority:
/// 1. `--root` flag / `MIGRA_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.migra/`
/// 3. Walk upward from `cwd` looking for `migra.yaml`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| dir.join(paths::MIGRA_DIR).is_dir())
        .or_else(|| find_upward(&cwd, |dir| dir.join(paths::CONFIG_FILE).is_file()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| found(dir)).map(Path::to_path_buf)
}

/// A relative config path is taken from `cwd` when it exists there,
/// otherwise from `root`.
pub fn resolve_config(root: &Path, config: &Path) -> PathBuf {
    if config.is_absolute() || config.exists() {
        config.to_path_buf()
    } else {
        paths::resolve_against(root, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn walks_up_to_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".migra")).unwrap();
        let deep = dir.path().join("services/users/app");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_upward(&deep, |d| d.join(".migra").is_dir());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }

    #[test]
    fn missing_config_resolves_under_root() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_config(dir.path(), Path::new("no-such-migra-config.yaml"));
        assert_eq!(resolved, dir.path().join("no-such-migra-config.yaml"));
    }
}
