//! Subprocess signing via the external openssl tool
//!
//! Decomposes a PKCS#12 container into certificate and key artifacts inside
//! a scratch workspace, runs the smime sign operation, and reads the signed
//! output back. The workspace is removed on every exit path; no step may
//! leave key material on disk after the call returns. The password travels
//! to the tool over its stdin and never appears in argv or in any log line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ExtractionTarget, Result, SignError};
use crate::workspace::{self, Workspace};

pub const UNSIGNED_ARTIFACT: &str = "unsigned.mobileconfig";
pub const SIGNED_ARTIFACT: &str = "signed.mobileconfig";
pub const CERT_ARTIFACT: &str = "cert.pem";
pub const KEY_ARTIFACT: &str = "key.pem";

/// Diagnostic phrases the tool emits when a PKCS#12 password is wrong.
const PASSWORD_ERROR_MARKERS: [&str; 4] = [
    "bad decrypt",
    "wrong password",
    "mac verify error",
    "invalid password",
];

const STDERR_CAPTURE_LIMIT: usize = 512;

struct RunOutcome {
    code: i32,
    stderr: String,
}

/// Signing backend that shells out to the `openssl` binary.
pub struct OpensslCliBackend {
    tool: Option<PathBuf>,
    scratch_root: PathBuf,
}

impl Default for OpensslCliBackend {
    fn default() -> Self {
        OpensslCliBackend {
            tool: None,
            scratch_root: workspace::default_root(),
        }
    }
}

impl OpensslCliBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific tool binary instead of resolving `openssl` on PATH.
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Place scratch workspaces under the given root.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    fn resolve_tool(&self) -> Result<PathBuf> {
        match &self.tool {
            Some(tool) if tool.is_file() => Ok(tool.clone()),
            Some(_) => Err(SignError::ToolUnavailable),
            None => which::which("openssl").map_err(|_| SignError::ToolUnavailable),
        }
    }

    /// Sign `data` with the certificate and key held in the PKCS#12
    /// container at `pkcs12_path`.
    ///
    /// Blocks for the duration of the tool invocations; callers on an
    /// interactive path should go through
    /// [`crate::service::SigningService::sign_task`].
    pub fn sign(&self, data: &[u8], pkcs12_path: &Path, password: &SecretString) -> Result<Vec<u8>> {
        // Preflight before anything touches the filesystem.
        let tool = self.resolve_tool()?;

        let mut ws = Workspace::create(&self.scratch_root)?;
        let result = self.sign_in_workspace(&tool, &ws, data, pkcs12_path, password);
        ws.dispose();
        result
    }

    fn sign_in_workspace(
        &self,
        tool: &Path,
        ws: &Workspace,
        data: &[u8],
        pkcs12_path: &Path,
        password: &SecretString,
    ) -> Result<Vec<u8>> {
        ws.write_artifact(UNSIGNED_ARTIFACT, data)?;

        if !pkcs12_path.is_file() {
            return Err(SignError::CertificateLoadFailed(pkcs12_path.to_path_buf()));
        }

        let unsigned_path = ws.artifact(UNSIGNED_ARTIFACT);
        let signed_path = ws.artifact(SIGNED_ARTIFACT);
        let cert_path = ws.artifact(CERT_ARTIFACT);
        let key_path = ws.artifact(KEY_ARTIFACT);

        // Step 1: public certificate out of the container.
        let outcome = self.run_tool(tool, "extract certificate", Some(password), |cmd| {
            cmd.arg("pkcs12")
                .arg("-in")
                .arg(pkcs12_path)
                .arg("-clcerts")
                .arg("-nokeys")
                .arg("-out")
                .arg(&cert_path)
                .arg("-passin")
                .arg("stdin");
        })?;
        check_extraction(&outcome, &cert_path, ExtractionTarget::Certificate)?;

        // Step 2: unencrypted private key.
        let outcome = self.run_tool(tool, "extract private key", Some(password), |cmd| {
            cmd.arg("pkcs12")
                .arg("-in")
                .arg(pkcs12_path)
                .arg("-nocerts")
                .arg("-nodes")
                .arg("-out")
                .arg(&key_path)
                .arg("-passin")
                .arg("stdin");
        })?;
        check_extraction(&outcome, &key_path, ExtractionTarget::PrivateKey)?;

        // Step 3: the signature itself. Binary, DER, non-detached, SHA-256.
        let outcome = self.run_tool(tool, "smime sign", None, |cmd| {
            cmd.arg("smime")
                .arg("-sign")
                .arg("-in")
                .arg(&unsigned_path)
                .arg("-out")
                .arg(&signed_path)
                .arg("-signer")
                .arg(&cert_path)
                .arg("-inkey")
                .arg(&key_path)
                .arg("-outform")
                .arg("der")
                .arg("-nodetach")
                .arg("-binary")
                .arg("-md")
                .arg("sha256");
        })?;
        if outcome.code != 0 {
            return Err(SignError::ToolCommandFailed {
                code: outcome.code,
                stderr: outcome.stderr,
            });
        }
        if !signed_path.is_file() {
            return Err(SignError::SigningFailed(
                "signed output artifact missing after smime sign".to_string(),
            ));
        }

        let signed = ws.read_artifact(SIGNED_ARTIFACT)?;
        info!("subprocess backend produced {} signed bytes", signed.len());
        Ok(signed)
    }

    /// Run one tool invocation, feeding the password (if any) over stdin.
    /// Only the invocation label is logged, never the arguments.
    fn run_tool(
        &self,
        tool: &Path,
        label: &str,
        password: Option<&SecretString>,
        configure: impl FnOnce(&mut Command),
    ) -> Result<RunOutcome> {
        let mut cmd = Command::new(tool);
        configure(&mut cmd);
        cmd.stdin(if password.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        debug!("running openssl step: {label}");
        let mut child = cmd.spawn()?;

        if let Some(password) = password {
            // Exposed only at the pipe boundary; a broken pipe here means
            // the tool already exited and the wait below reports why.
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(password.expose_secret().as_bytes());
                let _ = stdin.write_all(b"\n");
            }
        }

        let output = child.wait_with_output()?;
        let code = output.status.code().unwrap_or(-1);
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        clip_stderr(&mut stderr);

        if code != 0 {
            warn!("openssl step '{label}' exited with code {code}");
            if password.is_some() && is_password_error(&stderr) {
                return Err(SignError::WrongPassword);
            }
        }
        Ok(RunOutcome { code, stderr })
    }
}

fn check_extraction(outcome: &RunOutcome, artifact: &Path, target: ExtractionTarget) -> Result<()> {
    if outcome.code != 0 {
        return Err(SignError::ExtractionFailed {
            target,
            code: outcome.code,
        });
    }
    if !artifact.is_file() {
        warn!("{target} artifact missing despite zero exit");
        return Err(SignError::ExtractionFailed {
            target,
            code: outcome.code,
        });
    }
    Ok(())
}

/// Cap captured stderr at [`STDERR_CAPTURE_LIMIT`] bytes without cutting
/// through a multibyte character. `from_utf8_lossy` can place a 3-byte
/// replacement char anywhere, so the cut point must back up to a boundary.
fn clip_stderr(stderr: &mut String) {
    if stderr.len() <= STDERR_CAPTURE_LIMIT {
        return;
    }
    let mut cut = STDERR_CAPTURE_LIMIT;
    while !stderr.is_char_boundary(cut) {
        cut -= 1;
    }
    stderr.truncate(cut);
}

fn is_password_error(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    PASSWORD_ERROR_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
