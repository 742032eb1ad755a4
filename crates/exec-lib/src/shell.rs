//! Login shell detection
//!
//! `$SHELL` is tried first since most images export it; minimal images
//! often don't, so the fallback looks the current UID up in `/etc/passwd`.

use crate::exec::RemoteExecutor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

const GET_SHELL_COMMAND: &str = "echo $SHELL";
const GET_USER_ID_COMMAND: &str = "id -u";
const READ_PASSWD_COMMAND: &str = "cat /etc/passwd";

/// Number of colon-separated fields in a passwd record
const PASSWD_FIELDS: usize = 7;
const PASSWD_UID_FIELD: usize = 2;
const PASSWD_SHELL_FIELD: usize = 6;

/// Shell detection errors
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to get user ID in container '{container}' in pod '{pod}'")]
    UserId { pod: String, container: String },

    #[error("failed to read /etc/passwd in container '{container}' in pod '{pod}'")]
    ReadPasswd { pod: String, container: String },

    #[error("failed to parse shell from /etc/passwd in container '{0}'")]
    Parse(String),
}

/// Find the login shell for `uid` in passwd-formatted text.
///
/// Only the UID column is compared, so a UID appearing in another column
/// (for example the GECOS field) never matches.
pub fn parse_shell_from_passwd(passwd: &str, uid: &str) -> Option<String> {
    passwd
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.splitn(PASSWD_FIELDS, ':').collect::<Vec<_>>())
        .filter(|fields| fields.len() == PASSWD_FIELDS)
        .find(|fields| fields[PASSWD_UID_FIELD] == uid)
        .map(|fields| fields[PASSWD_SHELL_FIELD].to_string())
        .filter(|shell| !shell.is_empty())
}

/// Detects the shell to start for terminal sessions
pub struct ShellDetector {
    executor: Arc<dyn RemoteExecutor>,
}

impl ShellDetector {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Detect the login shell of the container's user
    pub async fn detect(&self, pod: &str, container: &str) -> Result<String, ShellError> {
        match self.executor.exec(pod, container, GET_SHELL_COMMAND).await {
            Ok(output) => {
                let shell = output.stdout.trim_end();
                debug!(shell = %shell, "Read $SHELL environment variable");
                if !shell.is_empty() {
                    return Ok(shell.to_string());
                }
            }
            Err(e) => {
                info!(
                    pod = %pod,
                    container = %container,
                    error = %e,
                    "Failed to read $SHELL environment variable"
                );
            }
        }

        let uid = self
            .executor
            .exec(pod, container, GET_USER_ID_COMMAND)
            .await
            .map_err(|e| {
                error!(pod = %pod, container = %container, error = %e, "Failed to get user ID");
                ShellError::UserId {
                    pod: pod.to_string(),
                    container: container.to_string(),
                }
            })?
            .stdout;
        let uid = uid.trim();
        debug!(uid = %uid, "Detected user ID");

        let passwd = self
            .executor
            .exec(pod, container, READ_PASSWD_COMMAND)
            .await
            .map_err(|e| {
                error!(pod = %pod, container = %container, error = %e, "Failed to read /etc/passwd");
                ShellError::ReadPasswd {
                    pod: pod.to_string(),
                    container: container.to_string(),
                }
            })?
            .stdout;

        let shell = parse_shell_from_passwd(&passwd, uid).ok_or_else(|| {
            error!(uid = %uid, "No usable passwd entry for user");
            ShellError::Parse(container.to_string())
        })?;
        debug!(shell = %shell, "Detected shell from /etc/passwd");

        Ok(shell)
    }
}
