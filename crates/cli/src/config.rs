//! Settings for `rips run`: built-in defaults, then the TOML file, then
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use rips_eval::watcher::{DEFAULT_IDS_DIR, DEFAULT_IDS_PATTERN};
use rips_eval::FaultPolicy;
use serde::Deserialize;

pub(crate) const DEFAULT_SOCKET: &str = "/tmp/sock.rips";
pub(crate) const DEFAULT_SCRIPTS: &str = "/etc/rips/scripts";
pub(crate) const DEFAULT_POLL_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("error reading config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid ids_pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("poll interval must be positive")]
    ZeroPoll,
}

/// Contents of the `--config` file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub socket: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub scripts: Option<PathBuf>,
    pub ids_dir: Option<PathBuf>,
    pub ids_pattern: Option<String>,
    pub poll_ms: Option<u64>,
    pub keep_going: Option<bool>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunOverrides {
    pub socket: Option<PathBuf>,
    pub stdin: bool,
    pub root: Option<PathBuf>,
    pub scripts: Option<PathBuf>,
    pub ids_dir: Option<PathBuf>,
    pub poll_ms: Option<u64>,
    pub keep_going: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Input {
    Socket(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub input: Input,
    pub scripts: PathBuf,
    pub ids_dir: PathBuf,
    pub ids_pattern: Regex,
    pub poll: Duration,
    pub fault_policy: FaultPolicy,
}

impl RunConfig {
    pub(crate) fn load(file: Option<&Path>, overrides: RunOverrides) -> Result<Self, ConfigError> {
        let from_file = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => FileConfig::default(),
        };
        RunConfig::resolve(from_file, overrides)
    }

    pub(crate) fn resolve(file: FileConfig, flags: RunOverrides) -> Result<Self, ConfigError> {
        let root = flags.root.or(file.root);
        let place = |p: PathBuf| match &root {
            Some(root) => under_root(root, &p),
            None => p,
        };

        let input = if flags.stdin {
            Input::Stdin
        } else {
            Input::Socket(place(
                flags.socket.or(file.socket).unwrap_or_else(|| DEFAULT_SOCKET.into()),
            ))
        };
        let poll_ms = flags.poll_ms.or(file.poll_ms).unwrap_or(DEFAULT_POLL_MS);
        if poll_ms == 0 {
            return Err(ConfigError::ZeroPoll);
        }
        let pattern = file.ids_pattern.as_deref().unwrap_or(DEFAULT_IDS_PATTERN);
        let fault_policy = if flags.keep_going || file.keep_going.unwrap_or(false) {
            FaultPolicy::Continue
        } else {
            FaultPolicy::Terminate
        };

        Ok(RunConfig {
            input,
            scripts: place(flags.scripts.or(file.scripts).unwrap_or_else(|| DEFAULT_SCRIPTS.into())),
            ids_dir: place(flags.ids_dir.or(file.ids_dir).unwrap_or_else(|| DEFAULT_IDS_DIR.into())),
            ids_pattern: Regex::new(pattern)?,
            poll: Duration::from_millis(poll_ms),
            fault_policy,
        })
    }
}

/// `path` re-anchored below `root`.
fn under_root(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let cfg = RunConfig::resolve(FileConfig::default(), RunOverrides::default()).unwrap();
        assert_eq!(cfg.input, Input::Socket(PathBuf::from("/tmp/sock.rips")));
        assert_eq!(cfg.scripts, PathBuf::from("/etc/rips/scripts"));
        assert_eq!(cfg.ids_dir, PathBuf::from("/var/log/snort"));
        assert_eq!(cfg.ids_pattern.as_str(), r"^.*/rips\.");
        assert_eq!(cfg.poll, Duration::from_millis(200));
        assert_eq!(cfg.fault_policy, FaultPolicy::Terminate);
    }

    #[test]
    fn flags_override_file_values() {
        let file: FileConfig = toml::from_str(
            "socket = \"/run/rips.sock\"\nscripts = \"/opt/scripts\"\npoll_ms = 50\nkeep_going = true\n",
        )
        .unwrap();
        let flags = RunOverrides {
            scripts: Some("/srv/scripts".into()),
            ..Default::default()
        };
        let cfg = RunConfig::resolve(file, flags).unwrap();
        assert_eq!(cfg.input, Input::Socket(PathBuf::from("/run/rips.sock")));
        assert_eq!(cfg.scripts, PathBuf::from("/srv/scripts"));
        assert_eq!(cfg.poll, Duration::from_millis(50));
        assert_eq!(cfg.fault_policy, FaultPolicy::Continue);
    }

    #[test]
    fn root_prefixes_every_path() {
        let flags = RunOverrides {
            root: Some("/tmp/chroot".into()),
            ..Default::default()
        };
        let cfg = RunConfig::resolve(FileConfig::default(), flags).unwrap();
        assert_eq!(cfg.input, Input::Socket(PathBuf::from("/tmp/chroot/tmp/sock.rips")));
        assert_eq!(cfg.scripts, PathBuf::from("/tmp/chroot/etc/rips/scripts"));
        assert_eq!(cfg.ids_dir, PathBuf::from("/tmp/chroot/var/log/snort"));
    }

    #[test]
    fn stdin_replaces_the_socket() {
        let flags = RunOverrides {
            stdin: true,
            ..Default::default()
        };
        let cfg = RunConfig::resolve(FileConfig::default(), flags).unwrap();
        assert_eq!(cfg.input, Input::Stdin);
    }

    #[test]
    fn bad_settings_are_rejected() {
        let file = FileConfig {
            ids_pattern: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            RunConfig::resolve(file, RunOverrides::default()),
            Err(ConfigError::Pattern(_))
        ));
        let flags = RunOverrides {
            poll_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            RunConfig::resolve(FileConfig::default(), flags),
            Err(ConfigError::ZeroPoll)
        ));
        assert!(toml::from_str::<FileConfig>("sockets = \"x\"").is_err());
    }
}
