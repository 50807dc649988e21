use std::path::PathBuf;

use clap::Args;

use sealbridge::core::{CoreError, Envelope};

#[derive(Args, Debug, Clone)]
pub struct Inspect {
    /// Envelope file
    #[arg(long = "in", value_name = "FILE")]
    pub input: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Envelope(#[from] CoreError),
}

/// Human-readable envelope metadata.
pub fn describe(envelope: &Envelope) -> String {
    let identifier = envelope.identifier();
    let mut lines = vec![
        format!("package:    {}", envelope.package()),
        format!("identifier: {}", identifier.to_hex()),
    ];
    if let Some(policy) = identifier.policy_prefix() {
        lines.push(format!("policy:     {policy}"));
    }
    lines.push(format!(
        "threshold:  {} of {}",
        envelope.threshold(),
        envelope.header.share_count
    ));
    for share in &envelope.shares {
        lines.push(format!("  share:    {} ({} bytes)", share.server, share.share.len()));
    }
    lines.push(format!("ciphertext: {} bytes", envelope.ciphertext.len()));
    lines.join("\n")
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Inspect {
    type Error = InspectError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let bytes = tokio::fs::read(&self.input)
            .await
            .map_err(|source| InspectError::Read {
                path: self.input.clone(),
                source,
            })?;
        let envelope = Envelope::parse(&bytes)?;
        Ok(describe(&envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};
    use sealbridge::core::{EncryptedShare, Identifier, KeyServerId, PackageId, PolicyRef, Threshold};

    #[tokio::test]
    async fn test_inspect_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encrypted.bin");
        let envelope = Envelope::new(
            PackageId::ZERO,
            Identifier::for_policy(&PolicyRef::ZERO),
            Threshold::new(1).unwrap(),
            vec![EncryptedShare {
                server: KeyServerId::from_bytes([3; 32]),
                share: vec![0; 4],
            }],
            vec![9u8; 10],
        )
        .unwrap();
        std::fs::write(&path, envelope.to_bytes()).unwrap();

        let out = Inspect { input: path }
            .execute(&OpContext::with_lookup(|_| None))
            .await
            .unwrap();
        assert!(out.contains("threshold:  1 of 1"));
        assert!(out.contains("ciphertext: 10 bytes"));
        assert!(out.contains(&format!("policy:     {}", PolicyRef::ZERO)));
    }

    #[tokio::test]
    async fn test_inspect_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"nope").unwrap();

        let err = Inspect { input: path }
            .execute(&OpContext::with_lookup(|_| None))
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Envelope(CoreError::MalformedEnvelope(_))));
    }
}
