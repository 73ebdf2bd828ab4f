//! Level transitions at run time: the hook scripts and the status line.
//!
//! Each level `L` has two scripts in the scripts directory, `L.from` run
//! when leaving it and `L.to` run when entering it. Both get the
//! destination and origin level names as arguments.

use std::path::PathBuf;

use rips_core::typecheck::is_executable;
use rips_core::{check_transition, gravity, Transition, TransitionError};

use crate::builtins::run_program;
use crate::context::Context;

pub fn from_script(dir: &std::path::Path, level: &str) -> PathBuf {
    dir.join(format!("{}.from", level))
}

pub fn to_script(dir: &std::path::Path, level: &str) -> PathBuf {
    dir.join(format!("{}.to", level))
}

/// Scripts that are missing or not executable.
pub fn check_level_scripts(ctx: &Context) -> Vec<PathBuf> {
    let Some(dir) = ctx.scripts_dir.as_deref() else {
        return Vec::new();
    };
    let mut missing = Vec::new();
    for level in ctx.levels() {
        for path in [from_script(dir, &level.name), to_script(dir, &level.name)] {
            if !is_executable(&path) {
                tracing::warn!(script = %path.display(), "level script is not executable");
                missing.push(path);
            }
        }
    }
    missing
}

/// Status document announcing level `index`.
pub fn status_line(name: &str, index: usize, count: usize) -> String {
    format!("---\nlevel: '{}'\ngravity: {:.6}\n...\n", name, gravity(index, count))
}

/// Move the active level from `from` to `to`. Returns whether the
/// transition happened; every failure is logged and leaves the level as
/// it was.
pub fn trigger(ctx: &mut Context, from: usize, to: usize) -> bool {
    let first = !ctx.initialized;
    let transition = check_transition(ctx.levels(), from, to, first);
    if !matches!(transition, Err(TransitionError::OutOfRange { .. })) {
        ctx.initialized = true;
    }
    match transition {
        Ok(Transition::Stay) => return true,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "trigger rejected");
            return false;
        }
    }

    let (Some(from_name), Some(to_name)) = (ctx.level_name(from), ctx.level_name(to)) else {
        return false;
    };
    let (from_name, to_name) = (from_name.to_owned(), to_name.to_owned());
    let Some(dir) = ctx.scripts_dir.as_deref().filter(|d| !d.as_os_str().is_empty()) else {
        tracing::warn!(to = %to_name, "trigger: no scripts directory");
        return false;
    };
    let leave = from_script(dir, &from_name);
    let enter = to_script(dir, &to_name);
    for script in [&leave, &enter] {
        if !is_executable(script) {
            tracing::warn!(script = %script.display(), "trigger: program is not executable");
            return false;
        }
    }

    let args = [to_name.as_str(), from_name.as_str()];
    if !first && !run_program(&leave.to_string_lossy(), &args, None) {
        return false;
    }
    if !run_program(&enter.to_string_lossy(), &args, None) {
        return false;
    }

    ctx.current_level = to;
    tracing::info!(from = %from_name, to = %to_name, first, "level changed");
    ctx.emit(status_line(&to_name, to, ctx.levels().len()));
    true
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rips_core::{Level, Position};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tokio::sync::mpsc;

    fn ladder() -> Vec<Level> {
        [("green", false), ("yellow", true), ("red", false)]
            .iter()
            .enumerate()
            .map(|(index, (name, soft))| Level {
                name: name.to_string(),
                index,
                soft: *soft,
                reachable: true,
                pos: Position::new("t.rul", 1),
            })
            .collect()
    }

    /// Scripts that append their arguments to `log`.
    fn write_scripts(dir: &Path, log: &Path, failing: &[&str]) {
        for level in ["green", "yellow", "red"] {
            for suffix in ["from", "to"] {
                let name = format!("{}.{}", level, suffix);
                let status = if failing.contains(&name.as_str()) { 1 } else { 0 };
                let body = format!(
                    "#!/bin/sh\necho \"{} $1 $2\" >> {}\nexit {}\n",
                    name,
                    log.display(),
                    status
                );
                let path = dir.join(&name);
                fs::write(&path, body).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
        }
    }

    #[test]
    fn initial_trigger_runs_only_the_entry_script() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        write_scripts(dir.path(), &log, &[]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = Context::new(ladder()).with_scripts(dir.path()).with_peer(tx);

        assert!(trigger(&mut ctx, 0, 0));
        assert!(ctx.initialized);
        assert_eq!(fs::read_to_string(&log).unwrap(), "green.to green green\n");
        assert_eq!(
            rx.try_recv().unwrap(),
            "---\nlevel: 'green'\ngravity: 0.000000\n...\n"
        );

        // same level again is a no-op
        assert!(trigger(&mut ctx, 0, 0));
        assert!(rx.try_recv().is_err());

        assert!(trigger(&mut ctx, 0, 1));
        assert_eq!(ctx.current_level, 1);
        let log_text = fs::read_to_string(&log).unwrap();
        assert!(log_text.ends_with("green.from yellow green\nyellow.to yellow green\n"));
        assert_eq!(
            rx.try_recv().unwrap(),
            "---\nlevel: 'yellow'\ngravity: 0.500000\n...\n"
        );
    }

    #[test]
    fn failing_script_keeps_the_level() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        write_scripts(dir.path(), &log, &["red.to"]);
        let mut ctx = Context::new(ladder()).with_scripts(dir.path());
        assert!(trigger(&mut ctx, 0, 0));
        assert!(!trigger(&mut ctx, 0, 2));
        assert_eq!(ctx.current_level, 0);
    }

    #[test]
    fn direction_is_checked_after_the_first_transition() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        write_scripts(dir.path(), &log, &[]);
        let mut ctx = Context::new(ladder()).with_scripts(dir.path());
        ctx.current_level = 2;
        assert!(trigger(&mut ctx, 2, 2));
        assert!(!trigger(&mut ctx, 2, 1), "red is not soft");
        assert!(trigger(&mut ctx, 2, 2));
        ctx.current_level = 1;
        assert!(trigger(&mut ctx, 1, 0), "yellow is soft");
        assert!(!trigger(&mut ctx, 0, 7));
    }

    #[test]
    fn missing_scripts_fail_without_crashing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new(ladder()).with_scripts(dir.path());
        assert!(!trigger(&mut ctx, 0, 1));
        assert_eq!(check_level_scripts(&ctx).len(), 6);

        let mut ctx = Context::new(ladder());
        assert!(!trigger(&mut ctx, 0, 1));
        assert_eq!(ctx.current_level, 0);
    }

    #[test]
    fn gravity_has_six_decimals() {
        assert_eq!(status_line("red", 2, 3), "---\nlevel: 'red'\ngravity: 1.000000\n...\n");
        assert_eq!(status_line("only", 0, 1), "---\nlevel: 'only'\ngravity: 0.000000\n...\n");
    }
}
