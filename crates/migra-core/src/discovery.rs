//! Service discovery: find framework projects under a directory tree.

use crate::adapter::{FRAMEWORK_DJANGO, FRAMEWORK_LARAVEL, FRAMEWORK_PRISMA};
use crate::error::{MigraError, Result};
use crate::types::Service;
use std::path::Path;

const SKIPPED_DIRS: &[&str] = &["node_modules", "venv"];

/// Walk `root` and return one service per detected project directory.
///
/// Hidden directories, `node_modules` and `venv` are skipped, and a project
/// directory is not descended into. Results are sorted by path.
pub fn discover_services(root: &Path) -> Result<Vec<Service>> {
    let mut found = Vec::new();
    walk(root, &mut found).map_err(|source| MigraError::Discovery {
        root: root.to_path_buf(),
        source,
    })?;
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<Service>) -> std::io::Result<()> {
    if let Some(kind) = detect_framework(dir) {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        tracing::debug!(service = %name, kind, path = %dir.display(), "discovered service");
        let mut service = Service::new(name, kind, dir);
        service.working_dir = Some(dir.to_path_buf());
        found.push(service);
        return Ok(());
    }

    let mut children: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    children.sort();

    for child in children {
        let name = child
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }
        walk(&child, found)?;
    }
    Ok(())
}

/// Framework of the project rooted at `dir`, if any.
pub fn detect_framework(dir: &Path) -> Option<&'static str> {
    if dir.join("manage.py").is_file() {
        return Some(FRAMEWORK_DJANGO);
    }
    if dir.join("artisan").is_file() {
        return Some(FRAMEWORK_LARAVEL);
    }
    let prisma = dir.join("prisma");
    if prisma.is_dir() {
        let has_schema = std::fs::read_dir(&prisma)
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    e.path().extension().and_then(|x| x.to_str()) == Some("prisma")
                })
            })
            .unwrap_or(false);
        if has_schema {
            return Some(FRAMEWORK_PRISMA);
        }
    }
    None
}
