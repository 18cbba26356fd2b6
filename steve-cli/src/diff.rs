//! Where the diff under review comes from.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// Read all of `reader` as UTF-8 text.
pub async fn read_all(mut reader: impl AsyncRead + Unpin) -> Result<String> {
    let mut buffer = String::new();
    reader.read_to_string(&mut buffer).await.context("failed to read diff from stdin")?;
    Ok(buffer)
}

/// Run `git diff`, optionally against `base`, in the current directory.
pub async fn git_diff(base: Option<&str>) -> Result<String> {
    let mut command = Command::new("git");
    command.arg("diff");
    if let Some(base) = base {
        command.arg(base);
    }
    debug!(?base, "running git diff");

    let output = command.output().await.context("failed to execute git diff")?;
    if !output.status.success() {
        bail!("git diff failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }
    String::from_utf8(output.stdout).context("git diff output is not valid UTF-8")
}

/// Take the diff from git when asked to, otherwise from `stdin`.
pub async fn load(use_git: bool, base: Option<&str>, stdin: impl AsyncRead + Unpin) -> Result<String> {
    if use_git || base.is_some() { git_diff(base).await } else { read_all(stdin).await }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdin_is_read_verbatim() {
        let input: &[u8] = b"+ use sqlx::PgPool;\n";
        assert_eq!(load(false, None, input).await.unwrap(), "+ use sqlx::PgPool;\n");
    }
}
