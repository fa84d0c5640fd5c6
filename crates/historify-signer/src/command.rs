//! Subprocess signer: drives the external `minisign` binary.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{SignerError, SignerResult};
use crate::format::PublicKeyFile;
use crate::password::PasswordSource;
use crate::{Signer, sig_path_for};

/// Default time the child process gets before it is killed.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval while waiting on the child.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Signs and verifies by spawning the external `minisign` tool.
///
/// stdin/stdout/stderr are piped; the key password, when needed, is fed to
/// stdin and the buffer is zeroed afterwards. The child is waited on with a
/// timeout and killed if it exceeds it.
#[derive(Debug)]
pub struct CommandSigner {
    tool: PathBuf,
    secret_key: PathBuf,
    public_key: PathBuf,
    password: PasswordSource,
    timeout: Duration,
}

impl CommandSigner {
    /// Create a signer for the given key pair paths, using the `minisign`
    /// binary from `PATH`.
    #[must_use]
    pub fn new(
        secret_key: impl Into<PathBuf>,
        public_key: impl Into<PathBuf>,
        password: PasswordSource,
    ) -> Self {
        Self {
            tool: PathBuf::from("minisign"),
            secret_key: secret_key.into(),
            public_key: public_key.into(),
            password,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the signer binary path.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Override the child-process timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the secret key file is password-protected.
    ///
    /// Minisign marks encrypted keys in the comment line of the key file.
    fn key_is_encrypted(&self) -> SignerResult<bool> {
        let content = std::fs::read_to_string(&self.secret_key).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SignerError::KeyMissing {
                    path: self.secret_key.clone(),
                }
            } else {
                SignerError::io(&self.secret_key, e)
            }
        })?;
        Ok(content
            .lines()
            .next()
            .is_some_and(|l| l.to_ascii_lowercase().contains("encrypted")))
    }

    /// Run the child to completion with the timeout, returning
    /// `(exit_ok, stderr)`.
    fn drive(&self, mut child: Child, stdin_payload: Option<&[u8]>) -> SignerResult<(bool, String)> {
        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                // Ignore EPIPE: the tool may not ask for the password.
                let _ = stdin.write_all(payload);
                let _ = stdin.write_all(b"\n");
            }
        }
        drop(child.stdin.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(tool = %self.tool.display(), "signer timed out; killing child");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SignerError::Timeout {
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(WAIT_POLL);
                },
                Err(e) => return Err(SignerError::io(&self.tool, e)),
            }
        };

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        Ok((status.success(), stderr))
    }

    fn spawn(&self, args: &[&std::ffi::OsStr]) -> SignerResult<Child> {
        Command::new(&self.tool)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SignerError::SignerUnavailable {
                        reason: format!("{} not found in PATH", self.tool.display()),
                    }
                } else {
                    SignerError::io(&self.tool, e)
                }
            })
    }
}

impl Signer for CommandSigner {
    fn sign(&self, file: &Path) -> SignerResult<PathBuf> {
        let sig_path = sig_path_for(file);
        let encrypted = self.key_is_encrypted()?;

        let password = if encrypted {
            let prompt = format!("Password for {}: ", self.secret_key.display());
            let pw = self.password.obtain(&prompt)?;
            if pw.is_none() {
                return Err(SignerError::PasswordRequired);
            }
            pw
        } else {
            None
        };

        debug!(file = %file.display(), "signing via external tool");
        let child = self.spawn(&[
            "-S".as_ref(),
            "-s".as_ref(),
            self.secret_key.as_os_str(),
            "-m".as_ref(),
            file.as_os_str(),
            "-x".as_ref(),
            sig_path.as_os_str(),
        ])?;

        let (ok, stderr) = self.drive(child, password.as_ref().map(|p| p.as_bytes()))?;
        // Password buffer is zeroed when it drops here.
        drop(password);

        if !ok {
            if stderr.to_ascii_lowercase().contains("password") {
                return Err(SignerError::PasswordIncorrect);
            }
            return Err(SignerError::SignerUnavailable {
                reason: format!("signing failed: {}", stderr.trim()),
            });
        }
        Ok(sig_path)
    }

    fn verify(&self, file: &Path, sig: &Path, public_key: &Path) -> SignerResult<()> {
        let child = self.spawn(&[
            "-V".as_ref(),
            "-p".as_ref(),
            public_key.as_os_str(),
            "-m".as_ref(),
            file.as_os_str(),
            "-x".as_ref(),
            sig.as_os_str(),
        ])?;

        let (ok, stderr) = self.drive(child, None)?;
        if !ok {
            debug!(file = %file.display(), stderr = stderr.trim(), "verification failed");
            return Err(SignerError::BadSignature {
                file: file.to_path_buf(),
            });
        }
        Ok(())
    }

    fn public_key(&self) -> SignerResult<PublicKeyFile> {
        if !self.public_key.exists() {
            return Err(SignerError::KeyMissing {
                path: self.public_key.clone(),
            });
        }
        PublicKeyFile::read_from(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_key_signer(dir: &Path) -> CommandSigner {
        CommandSigner::new(
            dir.join("absent.key"),
            dir.join("absent.pub"),
            PasswordSource::None,
        )
    }

    #[test]
    fn sign_without_key_is_key_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("target");
        std::fs::write(&file, "data").unwrap();

        let signer = missing_key_signer(dir.path());
        assert!(matches!(
            signer.sign(&file),
            Err(SignerError::KeyMissing { .. })
        ));
    }

    #[test]
    fn public_key_missing_is_key_missing() {
        let dir = tempfile::tempdir().unwrap();
        let signer = missing_key_signer(dir.path());
        assert!(matches!(
            signer.public_key(),
            Err(SignerError::KeyMissing { .. })
        ));
    }

    #[test]
    fn absent_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key");
        std::fs::write(&key, "untrusted comment: minisign secret key\nblob\n").unwrap();
        let file = dir.path().join("target");
        std::fs::write(&file, "data").unwrap();

        let signer = CommandSigner::new(&key, dir.path().join("pub"), PasswordSource::None)
            .with_tool("/nonexistent/minisign-binary");
        assert!(matches!(
            signer.sign(&file),
            Err(SignerError::SignerUnavailable { .. })
        ));
    }

    #[test]
    fn encrypted_key_without_password_fails() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key");
        std::fs::write(&key, "untrusted comment: minisign encrypted secret key\nblob\n").unwrap();
        let file = dir.path().join("target");
        std::fs::write(&file, "data").unwrap();

        let signer = CommandSigner::new(&key, dir.path().join("pub"), PasswordSource::None);
        assert!(matches!(
            signer.sign(&file),
            Err(SignerError::PasswordRequired)
        ));
    }
}
