//! Macro expansion backed by GNU m4.
//!
//! An [`M4Expander`] freezes the definitions of a batch of policy files one
//! file at a time, then expands individual macro bodies against the last
//! good frozen state.
//! Plugins only see the [`MacroExpander`] trait.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Turns a raw macro body into its expanded value.
pub trait MacroExpander {
    fn expand(&self, name: &str, raw: &str) -> Result<String, ExpandError>;
}

/// The expansion engine could not be set up for a batch.
#[derive(Debug, Error)]
pub enum ExpanderError {
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("m4 exited with status {status} while freezing definitions: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// A single macro body could not be expanded.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to talk to m4: {0}")]
    Io(#[from] io::Error),

    #[error("m4 exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("m4 produced non-UTF-8 output")]
    NonUtf8,
}

/// How to build an [`M4Expander`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpanderOptions {
    /// m4 binary, looked up on `PATH` when not absolute
    pub m4: PathBuf,
    /// Caller-owned scratch directory; a managed one is created when unset
    pub tmpdir: Option<PathBuf>,
    /// Extra `-D name=value` definitions passed before the policy files
    pub extra_defs: BTreeMap<String, String>,
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        Self {
            m4: PathBuf::from("m4"),
            tmpdir: None,
            extra_defs: BTreeMap::new(),
        }
    }
}

enum Scratch {
    Managed(TempDir),
    Borrowed(PathBuf),
}

impl Scratch {
    fn managed() -> Result<Self, ExpanderError> {
        let dir = tempfile::Builder::new()
            .prefix("policy-macros-")
            .tempdir()
            .map_err(ExpanderError::Scratch)?;
        Ok(Scratch::Managed(dir))
    }

    fn path(&self) -> &Path {
        match self {
            Scratch::Managed(dir) => dir.path(),
            Scratch::Borrowed(path) => path.as_path(),
        }
    }
}

/// m4-backed expander. A managed scratch directory is removed on drop; a
/// caller-supplied one is left alone.
pub struct M4Expander {
    m4: PathBuf,
    scratch: Scratch,
    freeze_file: PathBuf,
}

impl M4Expander {
    /// Freeze `extra_defs` and then each file in order on top of the
    /// previous state. A file m4 rejects (unreadable, unterminated quote) is
    /// logged and left out; the batch continues with the state before it.
    pub fn new<P: AsRef<Path>>(files: &[P], options: &ExpanderOptions) -> Result<Self, ExpanderError> {
        let scratch = match &options.tmpdir {
            Some(dir) if dir.is_dir() => Scratch::Borrowed(dir.clone()),
            Some(dir) => {
                warn!(
                    "Scratch directory \"{}\" is not a directory, using a temporary one",
                    dir.display()
                );
                Scratch::managed()?
            }
            None => Scratch::managed()?,
        };

        let mut freeze_file = scratch.path().join(freeze_name(0));
        let mut base = Command::new(&options.m4);
        for (name, value) in &options.extra_defs {
            base.arg(format!("-D{}={}", name, value));
        }
        base.arg("-F").arg(&freeze_file);
        run_freeze(base, &options.m4)?;

        let mut frozen = 0usize;
        for (idx, file) in files.iter().enumerate() {
            let file: &Path = file.as_ref();
            let next = scratch.path().join(freeze_name(idx + 1));

            let mut cmd = Command::new(&options.m4);
            cmd.arg("-R").arg(&freeze_file).arg("-F").arg(&next).arg(file);
            match run_freeze(cmd, &options.m4) {
                Ok(()) => {
                    freeze_file = next;
                    frozen += 1;
                }
                Err(ExpanderError::Failed { stderr, .. }) => {
                    warn!("m4 could not load \"{}\": {}", file.display(), stderr);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Froze m4 definitions of {}/{} files into \"{}\"",
            frozen,
            files.len(),
            freeze_file.display()
        );

        Ok(Self {
            m4: options.m4.clone(),
            scratch,
            freeze_file,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn freeze_file(&self) -> &Path {
        &self.freeze_file
    }

    /// True when the scratch directory was created here and dies with `self`.
    pub fn tmpdir_managed(&self) -> bool {
        matches!(self.scratch, Scratch::Managed(_))
    }
}

fn freeze_name(step: usize) -> String {
    format!("macros-{}.m4f", step)
}

fn run_freeze(mut cmd: Command, m4: &Path) -> Result<(), ExpanderError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ExpanderError::Spawn {
            binary: m4.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExpanderError::Failed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

impl MacroExpander for M4Expander {
    fn expand(&self, name: &str, raw: &str) -> Result<String, ExpandError> {
        let mut child = Command::new(&self.m4)
            .arg("-R")
            .arg(&self.freeze_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExpandError::Spawn {
                binary: self.m4.display().to_string(),
                source,
            })?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(raw.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;
        written?;
        if !output.status.success() {
            return Err(ExpandError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let value = String::from_utf8(output.stdout).map_err(|_| ExpandError::NonUtf8)?;
        trace!("Expanded \"{}\"", name);
        Ok(value.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn m4_available() -> bool {
        Command::new("m4")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn default_options_use_m4_from_path() {
        let options = ExpanderOptions::default();
        assert_eq!(options.m4, PathBuf::from("m4"));
        assert!(options.tmpdir.is_none());
        assert!(options.extra_defs.is_empty());
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let options = ExpanderOptions {
            m4: PathBuf::from("policy-macros-no-such-m4"),
            ..Default::default()
        };
        let err = M4Expander::new::<&Path>(&[], &options).err().unwrap();
        assert!(matches!(err, ExpanderError::Spawn { .. }));
    }

    /// Shell stand-in for m4: `-F` creates the freeze file, an unreadable
    /// input file fails, and plain `-R` echoes stdin.
    #[cfg(unix)]
    fn fake_m4(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-m4");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    const ECHO_M4: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -R) shift ;;
    -F) shift; out="$1" ;;
    -D*) ;;
    *) [ -r "$1" ] || { echo "m4: cannot open '$1'" >&2; exit 1; } ;;
  esac
  shift
done
if [ -n "$out" ]; then : > "$out"; else cat; fi
"#;

    #[cfg(unix)]
    #[test]
    fn scratch_path_that_is_not_a_directory_falls_back_to_managed() {
        let tmp = TempDir::new().unwrap();
        let options = ExpanderOptions {
            m4: fake_m4(tmp.path(), ECHO_M4),
            tmpdir: Some(tmp.path().join("nope")),
            ..Default::default()
        };
        let expander = M4Expander::new::<&Path>(&[], &options).unwrap();
        assert!(expander.tmpdir_managed());
        assert_ne!(expander.scratch_dir(), tmp.path().join("nope"));
        assert!(expander.freeze_file().exists());
    }

    #[cfg(unix)]
    #[test]
    fn unloadable_file_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("global_macros");
        fs::write(&good, "define(`FOO', `{ read }')\n").unwrap();
        let missing = tmp.path().join("missing_macros");
        let options = ExpanderOptions {
            m4: fake_m4(tmp.path(), ECHO_M4),
            ..Default::default()
        };

        let expander = M4Expander::new(&[&missing, &good], &options).unwrap();
        assert_eq!(
            expander.freeze_file().file_name().unwrap(),
            freeze_name(2).as_str()
        );
        assert!(expander.freeze_file().exists());
        assert_eq!(expander.expand("FOO", "{ read }").unwrap(), "{ read }");
    }

    #[cfg(unix)]
    #[test]
    fn base_freeze_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let options = ExpanderOptions {
            m4: fake_m4(tmp.path(), "#!/bin/sh\necho nope >&2\nexit 2\n"),
            ..Default::default()
        };
        let err = M4Expander::new::<&Path>(&[], &options).err().unwrap();
        match err {
            ExpanderError::Failed { status, stderr } => {
                assert_eq!(status, 2);
                assert_eq!(stderr, "nope");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_reports_status_instead_of_broken_pipe() {
        let tmp = TempDir::new().unwrap();
        // Freezing succeeds; expansion exits before reading stdin.
        let script = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = "-F" ]; then : > "$2"; exit 0; fi
  shift
done
echo boom >&2
exit 3
"#;
        let options = ExpanderOptions {
            m4: fake_m4(tmp.path(), script),
            ..Default::default()
        };
        let expander = M4Expander::new::<&Path>(&[], &options).unwrap();

        let body = "x".repeat(1 << 20);
        match expander.expand("big", &body) {
            Err(ExpandError::Failed { status, stderr }) => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn expands_against_frozen_definitions() {
        if !m4_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let macros = tmp.path().join("global_macros");
        fs::write(&macros, "define(`r_perms', `read open')\n").unwrap();

        let expander = M4Expander::new(&[&macros], &ExpanderOptions::default()).unwrap();
        assert!(expander.tmpdir_managed());
        assert!(expander.freeze_file().exists());

        let value = expander.expand("rw_perms", "{ r_perms write }").unwrap();
        assert_eq!(value, "{ read open write }");
    }

    #[test]
    fn extra_defs_are_visible() {
        if !m4_available() {
            return;
        }
        let mut extra_defs = BTreeMap::new();
        extra_defs.insert("target_build_variant".to_string(), "user".to_string());
        let options = ExpanderOptions {
            extra_defs,
            ..Default::default()
        };

        let expander = M4Expander::new::<&Path>(&[], &options).unwrap();
        assert_eq!(expander.expand("v", "target_build_variant").unwrap(), "user");
    }

    #[test]
    fn managed_scratch_removed_on_drop() {
        if !m4_available() {
            return;
        }
        let expander = M4Expander::new::<&Path>(&[], &ExpanderOptions::default()).unwrap();
        let dir = expander.scratch_dir().to_path_buf();
        assert!(dir.exists());
        drop(expander);
        assert!(!dir.exists());
    }

    #[test]
    fn borrowed_scratch_survives_drop() {
        if !m4_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let options = ExpanderOptions {
            tmpdir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let expander = M4Expander::new::<&Path>(&[], &options).unwrap();
        assert!(!expander.tmpdir_managed());
        assert_eq!(expander.scratch_dir(), tmp.path());
        drop(expander);
        assert!(tmp.path().exists());
    }
}
