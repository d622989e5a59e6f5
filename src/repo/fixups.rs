//! Fixups applied to a staged root after packages are unpacked into it.
//!
//! Unpacked packages assume they live at `/`. Inside a staged root that is
//! no longer true: absolute symlinks escape the root, setuid/setgid binaries
//! must not ship, and python scripts hardcode the system interpreter.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Directories whose scripts get their python shebang rewritten
const SHEBANG_DIRS: &[&str] = &["bin", "sbin", "usr/bin", "usr/sbin"];

const PYTHON_SHEBANG: &[u8] = b"#!/usr/bin/python";
const ENV_PYTHON_SHEBANG: &[u8] = b"#!/usr/bin/env python";

const SETUID_SETGID: u32 = 0o6000;
/// Mode bits kept when setuid/setgid are stripped: sticky + rwx for all
const KEEP_BITS: u32 = 0o1777;

/// Counts of what [`fix_staged_root`] changed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixupReport {
    pub symlinks: usize,
    pub modes: usize,
    pub shebangs: usize,
}

/// Run every fixup on `root`.
pub fn fix_staged_root(root: &Path) -> Result<FixupReport> {
    let mut report = fix_symlinks(root)?;
    report.shebangs = fix_shebangs(root)?;
    info!(target: "fixups", root = %root.display(), symlinks = report.symlinks,
        modes = report.modes, shebangs = report.shebangs, "fixed staged root");
    Ok(report)
}

/// Rewrite absolute symlinks that resolve inside `debdir` as relative links,
/// and clear setuid/setgid bits on regular files and directories.
///
/// Relative links, absolute links whose target does not exist under
/// `debdir`, and absolute links whose `..` components climb out of it are
/// left alone. Symlinks are never followed while walking.
/// Running it twice changes nothing the second time.
pub fn fix_symlinks(debdir: &Path) -> Result<FixupReport> {
    let mut report = FixupReport::default();
    walk(debdir, debdir, &mut report)?;
    Ok(report)
}

fn walk(debdir: &Path, dir: &Path, report: &mut FixupReport) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type of {}", path.display()))?;

        if file_type.is_symlink() {
            if fix_symlink(debdir, &path)? {
                report.symlinks += 1;
            }
        } else if file_type.is_dir() {
            if fix_filemode(&path)? {
                report.modes += 1;
            }
            walk(debdir, &path, report)?;
        } else if file_type.is_file() && fix_filemode(&path)? {
            report.modes += 1;
        }
    }

    Ok(())
}

fn fix_symlink(debdir: &Path, link: &Path) -> Result<bool> {
    let target =
        fs::read_link(link).with_context(|| format!("reading symlink {}", link.display()))?;
    if !target.is_absolute() {
        return Ok(false);
    }

    let Some(inside) = resolve_under(debdir, &target) else {
        return Ok(false);
    };
    if !inside.exists() {
        return Ok(false);
    }

    let parent = link.parent().unwrap_or(debdir);
    let relative = relative_path(&inside, parent);
    debug!(target: "fixups", link = %link.display(), from = %target.display(),
        to = %relative.display(), "rewriting absolute symlink");

    fs::remove_file(link).with_context(|| format!("removing symlink {}", link.display()))?;
    symlink(&relative, link).with_context(|| format!("creating symlink {}", link.display()))?;
    Ok(true)
}

fn fix_filemode(path: &Path) -> Result<bool> {
    let metadata =
        fs::metadata(path).with_context(|| format!("reading metadata of {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o7777;
    if mode & SETUID_SETGID == 0 {
        return Ok(false);
    }

    let fixed = mode & KEEP_BITS;
    debug!(target: "fixups", path = %path.display(), "stripping setuid/setgid: {:o} -> {:o}", mode, fixed);
    fs::set_permissions(path, fs::Permissions::from_mode(fixed))
        .with_context(|| format!("setting permissions on {}", path.display()))?;
    Ok(true)
}

/// Where absolute `target` lands inside `debdir`, lexically. `None` when its
/// `..` components climb out of `debdir`.
fn resolve_under(debdir: &Path, target: &Path) -> Option<PathBuf> {
    let root: PathBuf = normalize(debdir).iter().collect();
    let inside: PathBuf = normalize(&debdir.join(target.strip_prefix("/").unwrap_or(target)))
        .iter()
        .collect();
    let rest = inside.strip_prefix(&root).ok()?;
    if rest.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(inside)
    } else {
        None
    }
}

/// Path of `path` as seen from directory `base`. Both must share a root.
fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component> = normalize(path);
    let base: Vec<Component> = normalize(base);

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out
}

/// Point `#!/usr/bin/python` scripts in the bin directories of `root` at
/// `#!/usr/bin/env python`, including their subdirectories. Returns the
/// number of files rewritten.
///
/// Only an exact `#!/usr/bin/python` first line matches; `python3` and
/// other interpreters are untouched, as is everything after the first line.
pub fn fix_shebangs(root: &Path) -> Result<usize> {
    let mut fixed = 0;

    for dir in SHEBANG_DIRS {
        let dir = root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        fixed += fix_shebangs_in(&dir)?;
    }

    Ok(fixed)
}

fn fix_shebangs_in(dir: &Path) -> Result<usize> {
    let mut fixed = 0;
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type of {}", path.display()))?;

        if file_type.is_dir() {
            fixed += fix_shebangs_in(&path)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let content = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        if let Some(rewritten) = rewrite_shebang(&content) {
            debug!(target: "fixups", path = %path.display(), "rewriting python shebang");
            fs::write(&path, rewritten).with_context(|| format!("writing {}", path.display()))?;
            fixed += 1;
        }
    }

    Ok(fixed)
}

fn rewrite_shebang(content: &[u8]) -> Option<Vec<u8>> {
    let first_line_end = content
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(content.len());
    if &content[..first_line_end] != PYTHON_SHEBANG {
        return None;
    }

    let mut out = Vec::with_capacity(content.len() + 4);
    out.extend_from_slice(ENV_PYTHON_SHEBANG);
    out.extend_from_slice(&content[first_line_end..]);
    Some(out)
}
