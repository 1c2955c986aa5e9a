//! Remote operations, behind a trait seam.
//!
//! The wire protocol is delegated to the system `ssh` and `sftp` binaries
//! rather than reimplemented: directory provisioning is one `ssh … mkdir -p`
//! round trip, and the batched transfer is one `sftp -b <batchfile>` session.
//! Both report a single success/failure outcome for the whole operation,
//! which is exactly the contract the batch orchestrator builds on.
//!
//! The batch file of `put` commands is a [`NamedTempFile`], so it is removed
//! on every exit path, including process termination mid-run.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use tempfile::NamedTempFile;
use thiserror::Error;

use ferry_core::{Destination, TransportSettings};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// One file to push: local source, remote target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub local: PathBuf,
    pub remote: String,
}

/// A failed remote operation. Contained per destination by the orchestrator;
/// never propagated across destinations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to prepare batch file: {0}")]
    Batch(#[from] std::io::Error),
}

/// Black-box remote primitives: create directories, push a batch of files.
/// Each call is one session against one destination with one overall outcome.
pub trait Transport {
    fn create_directories(
        &self,
        destination: &Destination,
        dirs: &[String],
    ) -> Result<(), TransportError>;

    fn transfer(
        &self,
        destination: &Destination,
        items: &[TransferItem],
    ) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// sftp/ssh implementation
// ---------------------------------------------------------------------------

/// Transport that shells out to the system OpenSSH client tools.
#[derive(Debug, Clone)]
pub struct SftpTransport {
    settings: TransportSettings,
}

impl SftpTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

impl Transport for SftpTransport {
    fn create_directories(
        &self,
        destination: &Destination,
        dirs: &[String],
    ) -> Result<(), TransportError> {
        let mkdir = format!(
            "mkdir -p {}",
            dirs.iter()
                .map(|d| shell_quote(d))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut cmd = Command::new(&self.settings.ssh_program);
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(port) = self.settings.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.settings.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(destination.to_string()).arg(mkdir);

        run_checked(&self.settings.ssh_program, &mut cmd)
    }

    fn transfer(
        &self,
        destination: &Destination,
        items: &[TransferItem],
    ) -> Result<(), TransportError> {
        let mut batch = NamedTempFile::new()?;
        for item in items {
            writeln!(
                batch,
                "put {} {}",
                sftp_quote(&item.local.to_string_lossy()),
                sftp_quote(&item.remote)
            )?;
        }
        batch.flush()?;

        let mut cmd = Command::new(&self.settings.sftp_program);
        cmd.arg("-o").arg("BatchMode=yes").arg("-b").arg(batch.path());
        if let Some(port) = self.settings.port {
            cmd.arg("-P").arg(port.to_string());
        }
        if let Some(identity) = &self.settings.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(destination.to_string());

        run_checked(&self.settings.sftp_program, &mut cmd)
        // `batch` dropped here — the temp file is removed on success and
        // failure alike.
    }
}

fn run_checked(program: &str, cmd: &mut Command) -> Result<(), TransportError> {
    let output = cmd.output().map_err(|source| TransportError::Spawn {
        program: program.to_owned(),
        source,
    })?;
    if output.status.success() {
        return Ok(());
    }
    Err(TransportError::Failed {
        program: program.to_owned(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}

/// Single-quote `value` for the remote shell; embedded quotes become `'\''`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Double-quote `value` for an sftp batch line.
fn sftp_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', r"\\").replace('"', "\\\""))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quoting_wraps_and_escapes() {
        assert_eq!(shell_quote("/data/in"), "'/data/in'");
        assert_eq!(shell_quote("/with space"), "'/with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn sftp_quoting_escapes_quotes_and_backslashes() {
        assert_eq!(sftp_quote("/plain/a.csv"), "\"/plain/a.csv\"");
        assert_eq!(sftp_quote("a \"b\""), "\"a \\\"b\\\"\"");
        assert_eq!(sftp_quote(r"back\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn spawn_failure_names_the_program() {
        let transport = SftpTransport::new(TransportSettings {
            ssh_program: "ferry-test-no-such-binary".to_owned(),
            sftp_program: "ferry-test-no-such-binary".to_owned(),
            port: None,
            identity_file: None,
        });
        let dest = Destination::new("deploy", "web-01");

        let err = transport
            .create_directories(&dest, &["/data".to_owned()])
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("ferry-test-no-such-binary"));

        let err = transport
            .transfer(
                &dest,
                &[TransferItem {
                    local: PathBuf::from("/tmp/a.csv"),
                    remote: "/data/a.csv".to_owned(),
                }],
            )
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("ferry-test-no-such-binary"));
    }

    #[test]
    fn transfer_runs_a_real_command_against_the_batch_file() {
        // Use `true` as the "sftp" program: the batch file is written, the
        // command runs, and the session reports success.
        let transport = SftpTransport::new(TransportSettings {
            ssh_program: "true".to_owned(),
            sftp_program: "true".to_owned(),
            port: None,
            identity_file: None,
        });
        let dest = Destination::new("deploy", "web-01");
        transport
            .transfer(
                &dest,
                &[TransferItem {
                    local: PathBuf::from("/tmp/a.csv"),
                    remote: "/data/a.csv".to_owned(),
                }],
            )
            .expect("ok");

        // And `false` reports a failed session.
        let failing = SftpTransport::new(TransportSettings {
            ssh_program: "false".to_owned(),
            sftp_program: "false".to_owned(),
            port: None,
            identity_file: None,
        });
        let err = failing
            .create_directories(&dest, &["/data".to_owned()])
            .expect_err("session failure");
        assert!(matches!(err, TransportError::Failed { .. }));
    }
}
