// OfCheck: Semantic checks of OpenFlow controller configurations
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Execution of commands on the host that runs the switch, either locally or over SSH.

use std::{
    ffi::OsStr,
    process::{Command as StdCommand, Output},
    string::FromUtf8Error,
    time::Duration,
};

use itertools::Itertools;
use thiserror::Error;
use tokio::{process::Command, time::timeout};

/// Options passed to every `ssh` invocation, such that all commands share a single control
/// master and never ask for a password.
const SSH_OPTIONS: [&str; 4] = [
    "-oControlMaster=auto",
    "-oControlPath=/tmp/.ssh-%r@%h:%p",
    "-oControlPersist=30m",
    "-oBatchMode=yes",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH session with a remote host.
///
/// **Warning** Make sure that the destination is properly configured in `~/.ssh/config`, such that
/// no password is required when logging in.
#[derive(Debug, Clone)]
pub struct SshSession {
    destination: String,
}

impl SshSession {
    /// Connect to the destination and check that commands can be executed.
    pub async fn new(destination: impl Into<String>) -> Result<Self, SshError> {
        let session = Self {
            destination: destination.into(),
        };
        log::trace!("[{}] connecting...", session.name());

        let mut check = session.command("echo");
        check.arg("ready");
        let result = timeout(CONNECT_TIMEOUT, run(session.name(), &mut check, || "echo ready")).await;
        match result {
            Ok(Ok((stdout, _))) if String::from_utf8_lossy(&stdout).trim() == "ready" => {
                log::debug!("[{}] connection established", session.name());
                Ok(session)
            }
            Ok(Ok((stdout, _))) => {
                let stdout = String::from_utf8_lossy(&stdout);
                log::error!("[{}] Unexpected stdout:\n{stdout}", session.name());
                Err(SshError::Setup(format!("expected `ready`, got {stdout:?}")))
            }
            Ok(Err(e)) => {
                log::error!("[{}] Cannot connect: {e}", session.name());
                Err(e)
            }
            Err(_) => {
                log::error!("[{}] connection timeout!", session.name());
                Err(SshError::Timeout)
            }
        }
    }

    /// SSH destination
    pub fn name(&self) -> &str {
        &self.destination
    }

    /// Raw `ssh` command with the shared options, the `args` for `ssh` and the destination.
    pub fn std_command(&self, args: &[impl AsRef<OsStr>]) -> StdCommand {
        let mut cmd = StdCommand::new("ssh");
        cmd.args(SSH_OPTIONS).args(args).arg(self.name());
        cmd
    }

    /// Command that executes `program` on the remote host. The process is killed when the command
    /// is dropped.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::from(self.std_command(&[] as &[&str]));
        cmd.arg(program).kill_on_drop(true);
        cmd
    }
}

/// Machine on which commands are executed.
#[derive(Debug, Clone)]
pub enum Host {
    /// The machine running this program.
    Local,
    /// A remote machine reached over SSH.
    Remote(SshSession),
}

impl Host {
    /// Connect to a remote host, or use the local machine if `destination` is `None`.
    pub async fn connect(destination: Option<&str>) -> Result<Self, SshError> {
        match destination {
            Some(dst) => Ok(Host::Remote(SshSession::new(dst).await?)),
            None => Ok(Host::Local),
        }
    }

    /// Name used in log messages.
    pub fn name(&self) -> &str {
        match self {
            Host::Local => "localhost",
            Host::Remote(session) => session.name(),
        }
    }

    /// Build the command for `args`, where the first argument is the program.
    pub fn command(&self, args: &[impl AsRef<str>]) -> Result<Command, SshError> {
        let (program, rest) = args.split_first().ok_or(SshError::EmptyCommand)?;
        let mut cmd = match self {
            Host::Local => {
                let mut cmd = Command::new(program.as_ref());
                cmd.kill_on_drop(true);
                cmd
            }
            Host::Remote(session) => session.command(program.as_ref()),
        };
        cmd.args(rest.iter().map(AsRef::as_ref));
        Ok(cmd)
    }

    /// Execute a command, check its exit code, and return `STDOUT` and `STDERR`.
    pub async fn execute_cmd(
        &self,
        args: &[impl AsRef<str> + Sync],
    ) -> Result<(Vec<u8>, Vec<u8>), SshError> {
        let cmd_str = || args.iter().map(AsRef::as_ref).join(" ");
        log::trace!("[{}] `{}`", self.name(), cmd_str());
        let mut cmd = self.command(args)?;
        run(self.name(), &mut cmd, cmd_str).await
    }

    /// Execute a command, check its exit code, and return `STDOUT` as a string. Anything written
    /// to `STDERR` is logged.
    pub async fn execute_cmd_stdout(
        &self,
        args: &[impl AsRef<str> + Sync],
    ) -> Result<String, SshError> {
        let (stdout, stderr) = self.execute_cmd(args).await?;
        if !stderr.is_empty() {
            log::warn!(
                "[{}] {} wrote to stderr:\n{}",
                self.name(),
                args.iter().map(AsRef::as_ref).join(" "),
                String::from_utf8_lossy(&stderr)
            );
        }
        Ok(String::from_utf8(stdout)?)
    }
}

async fn run<F, S>(
    host: &str,
    cmd: &mut Command,
    cmd_str: F,
) -> Result<(Vec<u8>, Vec<u8>), SshError>
where
    F: FnOnce() -> S,
    S: std::fmt::Display,
{
    match cmd.output().await {
        Ok(output) => check_output(host, output, cmd_str),
        Err(e) => {
            log::error!("[{host}] {} failed: {e}", cmd_str());
            Err(e.into())
        }
    }
}

/// Check the output for a successful exit code.
pub fn check_output<F, S>(
    host: &str,
    output: Output,
    cmd: F,
) -> Result<(Vec<u8>, Vec<u8>), SshError>
where
    F: FnOnce() -> S,
    S: std::fmt::Display,
{
    if output.status.success() {
        return Ok((output.stdout, output.stderr));
    }
    let cmd = cmd().to_string();
    let code = output.status.code().unwrap_or_default();
    let section = |name: &str, bytes: &[u8]| {
        if bytes.is_empty() {
            String::new()
        } else {
            format!("\n{name}:\n{}", String::from_utf8_lossy(bytes))
        }
    };
    log::error!(
        "[{host}] {cmd} exited with exit code {code}{}{}",
        section("STDOUT", &output.stdout),
        section("STDERR", &output.stderr),
    );
    Err(SshError::CommandError(host.to_string(), cmd, code))
}

/// Error kind returned by [`SshSession`] and [`Host`].
#[derive(Debug, Error)]
pub enum SshError {
    /// The connection test returned something unexpected.
    #[error("Error while establishing the connection: {0}")]
    Setup(String),
    /// Timeout while establishing the session
    #[error("Timeout while establishing the session.")]
    Timeout,
    /// Cannot spawn the process.
    #[error("Cannot spawn the command: {0}")]
    Client(#[from] std::io::Error),
    /// A command without program
    #[error("Cannot execute an empty command")]
    EmptyCommand,
    /// Error while executing a command.
    #[error("Non-zero exit code of command {1} on {0}: {2}")]
    CommandError(String, String, i32),
    /// Cannot parse output as utf8
    #[error("Cannot parse output as UTF-8: {0}")]
    FromUtf8(#[from] FromUtf8Error),
}
