// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Spawns whitelisted commands with timeout, output bounding and kill
//! escalation (spec §4.1, §5). Every invocation is checked against
//! `domain::command::Whitelist` before a process is ever spawned.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::domain::command::{TimeoutClass, Whitelist, WhitelistError};

pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("not whitelisted: {0}")]
    NotWhitelisted(#[from] WhitelistError),
    #[error("argument contains a forbidden byte: {0:?}")]
    ForbiddenByte(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{tool} exited {exit_code}: {stderr_tail}")]
    NonZeroExit { tool: String, exit_code: i32, stderr_tail: String },
    #[error("output exceeded {0} bytes, process killed")]
    OutputTooLarge(usize),
    #[error("failed to spawn {tool}: {source}")]
    Spawn { tool: String, source: std::io::Error },
}

/// Per-tool-class concurrency caps (spec §4.1/§5): at most one
/// concurrent `zpool scrub`-class slow call per tool, four slow calls
/// total across all tools.
pub struct Executor {
    per_tool_slow: HashMap<&'static str, Arc<Semaphore>>,
    overall_slow: Arc<Semaphore>,
    whitelist: Whitelist,
}

impl Executor {
    pub fn new(whitelist: Whitelist) -> Self {
        let mut per_tool_slow = HashMap::new();
        for head in ["zpool", "zfs", "docker", "networkctl"] {
            per_tool_slow.insert(head, Arc::new(Semaphore::new(1)));
        }
        Self {
            per_tool_slow,
            overall_slow: Arc::new(Semaphore::new(4)),
            whitelist,
        }
    }

    pub async fn run(&self, head: &'static str, argv: &[&str]) -> Result<CommandOutput, ExecutorError> {
        let class = self.whitelist.check(head, argv)?;

        for token in argv {
            if Whitelist::contains_forbidden_byte(token) {
                return Err(ExecutorError::ForbiddenByte(token.to_string()));
            }
        }

        let _overall_permit;
        let _tool_permit;
        if class == TimeoutClass::Slow {
            _overall_permit = self.overall_slow.acquire().await.expect("semaphore never closed");
            if let Some(sem) = self.per_tool_slow.get(head) {
                _tool_permit = sem.acquire().await.expect("semaphore never closed");
            }
        }

        self.spawn_and_wait(head, argv, class).await
    }

    async fn spawn_and_wait(
        &self,
        head: &'static str,
        argv: &[&str],
        class: TimeoutClass,
    ) -> Result<CommandOutput, ExecutorError> {
        let mut child = Command::new(head)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Spawn { tool: head.to_string(), source })?;

        let mut stdout_pipe = child.stdout.take().expect("piped stdout");
        let mut stderr_pipe = child.stderr.take().expect("piped stderr");

        let read_bounded = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let (r1, r2) = tokio::join!(
                read_bounded_into(&mut stdout_pipe, &mut stdout, MAX_OUTPUT_BYTES),
                read_bounded_into(&mut stderr_pipe, &mut stderr, MAX_OUTPUT_BYTES),
            );
            r1.and(r2).map(|_| (stdout, stderr))
        };

        let wait_class = class.duration();
        let result = timeout(wait_class, async {
            let output = read_bounded.await;
            let status = child.wait().await;
            (output, status)
        })
        .await;

        let (output, status) = match result {
            Ok(pair) => pair,
            Err(_) => {
                let _ = child.start_kill();
                let _ = timeout(KILL_GRACE, child.wait()).await;
                let _ = child.kill().await;
                return Err(ExecutorError::Timeout(wait_class));
            }
        };

        let (stdout, stderr) = match output {
            Ok(pair) => pair,
            Err(too_large) => {
                let _ = child.kill().await;
                return Err(too_large);
            }
        };

        let status = status.map_err(|source| ExecutorError::Spawn { tool: head.to_string(), source })?;
        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            let tail = stderr_tail(&stderr);
            return Err(ExecutorError::NonZeroExit {
                tool: head.to_string(),
                exit_code,
                stderr_tail: tail,
            });
        }

        Ok(CommandOutput { stdout, stderr, exit_code })
    }
}

async fn read_bounded_into(
    pipe: &mut (impl tokio::io::AsyncRead + Unpin),
    dest: &mut Vec<u8>,
    limit: usize,
) -> Result<(), ExecutorError> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await.map_err(|source| ExecutorError::Spawn {
            tool: "pipe".to_string(),
            source,
        })?;
        if n == 0 {
            return Ok(());
        }
        if dest.len() + n > limit {
            return Err(ExecutorError::OutputTooLarge(limit));
        }
        dest.extend_from_slice(&chunk[..n]);
    }
}

/// Last 4 KiB of stderr, lossily decoded (spec §7).
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(4096);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unwhitelisted_head() {
        let executor = Executor::new(Whitelist::standard());
        let err = executor.run("rm", &["-rf", "/"]).await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotWhitelisted(_)));
    }

    #[tokio::test]
    async fn rejects_injection_before_spawning() {
        let executor = Executor::new(Whitelist::standard());
        let err = executor.run("zpool", &["scrub", "tank; rm -rf /"]).await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotWhitelisted(_)));
    }

    #[tokio::test]
    async fn runs_a_whitelisted_fast_command() {
        let executor = Executor::new(Whitelist::standard());
        // `zpool list -H -p -o name,size,alloc,health` is whitelisted; in
        // a test sandbox with no zpool binary this still exercises the
        // spawn/timeout plumbing by surfacing a Spawn error rather than
        // panicking.
        let result = executor.run("zpool", &["list", "-H", "-p", "-o", "name,size,alloc,health"]).await;
        assert!(matches!(
            result,
            Ok(_) | Err(ExecutorError::Spawn { .. }) | Err(ExecutorError::NonZeroExit { .. })
        ));
    }
}
