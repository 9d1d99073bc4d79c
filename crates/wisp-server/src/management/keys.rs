// ============================================
// File: crates/wisp-server/src/management/keys.rs
// ============================================
//! # Controller Key Material
//!
//! ## Creation Reason
//! Grants and pushes carry the controller's tunnel public key. It is
//! derived from the private key file, by default through `wg pubkey` so
//! the result matches whatever the tunnel tooling reports.
//!
//! ## Main Functionality
//! - `KeyDeriver`: private key → public key
//! - `CommandKeyDeriver`: external command, private key on stdin
//! - `X25519KeyDeriver`: in-process derivation
//! - `load_controller_key`: read key file and derive, degrading to `None`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Failure here is never fatal; the server runs without a self key and
//!   skips grants until a restart with a working key
//!
//! ## Last Modified
//! v0.1.0 - Initial key derivation

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use zeroize::Zeroizing;

use wisp_common::{TunnelPrivateKey, TunnelPublicKey};
use wisp_core::crypto::derive_public_key;

use crate::error::{Result, ServerError};

/// Derives a tunnel public key from a private key.
#[async_trait]
pub trait KeyDeriver: Send + Sync {
    /// Derives the public key.
    async fn derive(&self, private: &TunnelPrivateKey) -> Result<TunnelPublicKey>;
}

/// Derives keys in-process with x25519-dalek.
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519KeyDeriver;

#[async_trait]
impl KeyDeriver for X25519KeyDeriver {
    async fn derive(&self, private: &TunnelPrivateKey) -> Result<TunnelPublicKey> {
        Ok(derive_public_key(private))
    }
}

/// Derives keys by running an external command such as `wg pubkey`.
#[derive(Debug, Clone)]
pub struct CommandKeyDeriver {
    program: String,
    args: Vec<String>,
}

impl CommandKeyDeriver {
    /// Builds a deriver from `[program, args...]`.
    ///
    /// # Errors
    /// Fails if `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ServerError::config_invalid("tunnel.pubkey_command", "cannot be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl KeyDeriver for CommandKeyDeriver {
    async fn derive(&self, private: &TunnelPrivateKey) -> Result<TunnelPublicKey> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::KeyDerivation {
                reason: format!("spawning '{}': {e}", self.program),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let encoded = Zeroizing::new(private.to_base64());
            stdin.write_all(encoded.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ServerError::KeyDerivation {
                reason: format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse().map_err(|e| ServerError::KeyDerivation {
            reason: format!("'{}' printed an invalid key: {e}", self.program),
        })
    }
}

/// Picks the deriver for a configured command; an empty command means
/// in-process derivation.
///
/// # Errors
/// Never fails for an empty command; otherwise as [`CommandKeyDeriver::from_argv`].
pub fn deriver_for(argv: &[String]) -> Result<Box<dyn KeyDeriver>> {
    if argv.is_empty() {
        Ok(Box::new(X25519KeyDeriver))
    } else {
        Ok(Box::new(CommandKeyDeriver::from_argv(argv)?))
    }
}

/// Reads the controller private key and derives its public key.
///
/// Returns `(None, None)` if the key file is unreadable and
/// `(Some(private), None)` if derivation fails; both are logged.
pub async fn load_controller_key(
    path: &Path,
    deriver: &dyn KeyDeriver,
) -> (Option<TunnelPrivateKey>, Option<TunnelPublicKey>) {
    let private: TunnelPrivateKey = match tokio::fs::read_to_string(path).await {
        Ok(text) => match text.parse() {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Controller private key is malformed");
                return (None, None);
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Controller private key unreadable");
            return (None, None);
        }
    };

    match deriver.derive(&private).await {
        Ok(public) => {
            info!(public_key = %public, "Controller public key derived");
            (Some(private), Some(public))
        }
        Err(e) => {
            warn!(error = %e, "Controller public key derivation failed, grants disabled");
            (Some(private), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_PRIVATE: &str = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=";
    const ALICE_PUBLIC: &str = "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=";

    #[tokio::test]
    async fn test_in_process_derivation() {
        let private: TunnelPrivateKey = ALICE_PRIVATE.parse().unwrap();
        let public = X25519KeyDeriver.derive(&private).await.unwrap();
        assert_eq!(public.as_str(), ALICE_PUBLIC);
    }

    #[tokio::test]
    async fn test_command_deriver_echoes_stdout() {
        // `cat` echoes the private key, which is itself a valid 32-byte key
        let deriver = CommandKeyDeriver::from_argv(&["cat".to_string()]).unwrap();
        let private: TunnelPrivateKey = ALICE_PRIVATE.parse().unwrap();
        let public = deriver.derive(&private).await.unwrap();
        assert_eq!(public.as_str(), ALICE_PRIVATE);
    }

    #[tokio::test]
    async fn test_command_reads_one_terminated_line() {
        // `read` fails at EOF without a newline, leaving stdout empty
        let argv: Vec<String> = ["sh", "-c", "IFS= read -r k && printf %s \"$k\""]
            .iter()
            .map(ToString::to_string)
            .collect();
        let deriver = CommandKeyDeriver::from_argv(&argv).unwrap();
        let private: TunnelPrivateKey = ALICE_PRIVATE.parse().unwrap();
        assert_eq!(deriver.derive(&private).await.unwrap().as_str(), ALICE_PRIVATE);
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let deriver = CommandKeyDeriver::from_argv(&["/nonexistent/wg".to_string()]).unwrap();
        let private = TunnelPrivateKey::from_bytes([1u8; 32]);
        assert!(matches!(
            deriver.derive(&private).await,
            Err(ServerError::KeyDerivation { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_degrades_without_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let (private, public) =
            load_controller_key(&dir.path().join("missing.key"), &X25519KeyDeriver).await;
        assert!(private.is_none());
        assert!(public.is_none());

        let path = dir.path().join("controller.key");
        std::fs::write(&path, format!("{ALICE_PRIVATE}\n")).unwrap();
        let (private, public) = load_controller_key(&path, &X25519KeyDeriver).await;
        assert!(private.is_some());
        assert_eq!(public.unwrap().as_str(), ALICE_PUBLIC);
    }

    #[test]
    fn test_empty_argv_selects_in_process() {
        assert!(CommandKeyDeriver::from_argv(&[]).is_err());
        assert!(deriver_for(&[]).is_ok());
    }
}
