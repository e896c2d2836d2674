//! Shell command execution with scoped environments.
//!
//! Every child process starts from an empty environment: a minimal `PATH`, a C locale, a fixed
//! `SOURCE_DATE_EPOCH`, the configured passthrough variables and whatever the stage adds. The
//! parent's environment is never modified.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::ActionError;
use crate::config::ToolSettings;

/// January 1, 1980 00:00:00 UTC, for tools that stamp archives.
const SOURCE_DATE_EPOCH: &str = "315532800";

/// Build the environment for one child process.
pub fn scoped_env(tools: &ToolSettings, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
  let mut env = BTreeMap::new();
  env.insert("PATH".to_string(), tools.path.clone());
  env.insert("LANG".to_string(), "C".to_string());
  env.insert("LC_ALL".to_string(), "C".to_string());
  env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());

  for name in &tools.passthrough_env {
    if let Ok(value) = std::env::var(name) {
      env.insert(name.clone(), value);
    }
  }

  for (key, value) in extra {
    env.insert(key.clone(), value.clone());
  }

  env
}

/// Run `script` through the shell in `cwd`, appending stdout and stderr to `log`.
pub async fn execute_cmd(
  script: &str,
  cwd: &Path,
  env: &BTreeMap<String, String>,
  log: &Path,
  shell: Option<&str>,
) -> Result<(), ActionError> {
  info!(cmd = %script, cwd = ?cwd, "executing command");

  let log_file = open_log(log)?;
  writeln!(&log_file, "==> {}", script)?;

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(script)
    .current_dir(cwd)
    .env_clear()
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::from(log_file.try_clone()?))
    .stderr(Stdio::from(log_file));

  debug!(shell = %shell_cmd, log = ?log, "spawning process");

  let status = command.status().await?;

  if !status.success() {
    return Err(ActionError::CmdFailed {
      cmd: script.to_string(),
      code: status.code(),
    });
  }

  Ok(())
}

/// Run `program` directly and return its trimmed stdout.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn run_program<I, S>(program: &str, args: I, env: &BTreeMap<String, String>) -> Result<String, ActionError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let output = std::process::Command::new(program)
    .args(args)
    .env_clear()
    .envs(env)
    .stdin(Stdio::null())
    .output()?;

  if !output.status.success() {
    return Err(ActionError::ProgramFailed {
      program: program.to_string(),
      code: output.status.code(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Quote `value` for interpolation into a `/bin/sh` command line.
pub fn shell_quote(value: &str) -> String {
  let safe = !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '=' | ':' | '+' | ','));
  if safe {
    value.to_string()
  } else {
    format!("'{}'", value.replace('\'', r"'\''"))
  }
}

fn open_log(log: &Path) -> Result<File, ActionError> {
  if let Some(parent) = log.parent() {
    fs::create_dir_all(parent)?;
  }
  Ok(OpenOptions::new().create(true).append(true).open(log)?)
}

/// Get the shell command and argument.
///
/// Defaults to `/bin/sh` rather than `$SHELL`; interactive shells may source profiles that
/// change `PATH`.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  match override_shell {
    Some(shell) => (shell.to_string(), vec!["-c".to_string()]),
    None => ("/bin/sh".to_string(), vec!["-c".to_string()]),
  }
}
