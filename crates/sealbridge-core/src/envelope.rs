//! Self-describing envelope codec.
//!
//! The envelope carries everything needed to request keys for it: the
//! namespace, the identifier, the threshold and one encrypted share per key
//! server. The header can be decoded without any key and without contacting
//! any service.
//!
//! ```text
//! magic        4   b"SBEV"
//! version      1   0x01
//! package      32
//! id_len       2   u16 BE
//! id           id_len
//! threshold    1
//! share_count  1   >= threshold
//! shares       share_count × { server: 32, len: u16 BE, bytes }
//! ct_len       4   u32 BE
//! ciphertext   ct_len
//! ```

use std::collections::HashSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{Identifier, KeyServerId, PackageId, Threshold, OBJECT_ID_LEN};

/// Leading bytes of every envelope.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"SBEV";

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

fn malformed(msg: impl Into<String>) -> CoreError {
    CoreError::MalformedEnvelope(msg.into())
}

/// Metadata recoverable from the envelope bytes alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    /// Namespace the policy check runs under.
    pub package: PackageId,
    /// The encryption id.
    pub identifier: Identifier,
    /// Shares required to decrypt.
    pub threshold: Threshold,
    /// Number of shares carried.
    pub share_count: u8,
}

impl EnvelopeHeader {
    /// Decode only the metadata and share table. The ciphertext is neither
    /// copied nor checked.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        decode_head(&mut buf).map(|(header, _)| header)
    }
}

/// A data-key share encrypted for one key server's identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// The key server able to release the matching identity key.
    pub server: KeyServerId,
    /// Opaque share ciphertext.
    pub share: Vec<u8>,
}

/// A parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub shares: Vec<EncryptedShare>,
    /// Opaque payload ciphertext.
    pub ciphertext: Bytes,
}

impl Envelope {
    /// Assemble an envelope, enforcing the header invariants.
    pub fn new(
        package: PackageId,
        identifier: Identifier,
        threshold: Threshold,
        shares: Vec<EncryptedShare>,
        ciphertext: impl Into<Bytes>,
    ) -> Result<Self> {
        let share_count = u8::try_from(shares.len())
            .map_err(|_| malformed(format!("{} shares exceed the u8 share count", shares.len())))?;
        validate_shares(threshold, &shares)?;
        let ciphertext: Bytes = ciphertext.into();
        check_ciphertext_len(ciphertext.len())?;
        Ok(Self {
            header: EnvelopeHeader {
                package,
                identifier,
                threshold,
                share_count,
            },
            shares,
            ciphertext,
        })
    }

    /// Quick check for the envelope magic; does not validate the rest.
    pub fn is_envelope(bytes: &[u8]) -> bool {
        bytes.starts_with(&ENVELOPE_MAGIC)
    }

    pub fn package(&self) -> &PackageId {
        &self.header.package
    }

    pub fn identifier(&self) -> &Identifier {
        &self.header.identifier
    }

    pub fn threshold(&self) -> Threshold {
        self.header.threshold
    }

    /// The share encrypted for `server`, if any.
    pub fn share_for(&self, server: &KeyServerId) -> Option<&EncryptedShare> {
        self.shares.iter().find(|s| &s.server == server)
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let id = self.header.identifier.as_bytes();
        let shares_len: usize = self
            .shares
            .iter()
            .map(|s| OBJECT_ID_LEN + 2 + s.share.len())
            .sum();
        let mut buf = BytesMut::with_capacity(
            4 + 1 + OBJECT_ID_LEN + 2 + id.len() + 2 + shares_len + 4 + self.ciphertext.len(),
        );

        buf.put_slice(&ENVELOPE_MAGIC);
        buf.put_u8(ENVELOPE_VERSION);
        buf.put_slice(self.header.package.as_bytes());
        // Identifier length is bounded by Identifier::MAX_LEN.
        buf.put_u16(id.len() as u16);
        buf.put_slice(id);
        buf.put_u8(self.header.threshold.get());
        buf.put_u8(self.header.share_count);
        for share in &self.shares {
            buf.put_slice(share.server.as_bytes());
            buf.put_u16(share.share.len() as u16);
            buf.put_slice(&share.share);
        }
        // Bounded by check_ciphertext_len in Envelope::new.
        buf.put_u32(self.ciphertext.len() as u32);
        buf.put_slice(&self.ciphertext);

        buf.freeze()
    }

    /// Decode from wire bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let (header, shares) = decode_head(&mut buf)?;

        let ct_len = take_u32(&mut buf, "ciphertext length")? as usize;
        let ciphertext = Bytes::copy_from_slice(take(&mut buf, ct_len, "ciphertext")?);
        if buf.has_remaining() {
            return Err(malformed(format!("{} trailing bytes", buf.remaining())));
        }

        Envelope::new(
            header.package,
            header.identifier,
            header.threshold,
            shares,
            ciphertext,
        )
    }
}

/// Decode everything up to and including the share table, leaving `buf` at
/// the ciphertext length.
fn decode_head(buf: &mut &[u8]) -> Result<(EnvelopeHeader, Vec<EncryptedShare>)> {
    let magic = take(buf, ENVELOPE_MAGIC.len(), "magic")?;
    if magic != ENVELOPE_MAGIC {
        return Err(malformed("bad magic"));
    }

    let version = take_u8(buf, "version")?;
    if version != ENVELOPE_VERSION {
        return Err(malformed(format!("unsupported version {version}")));
    }

    let package = PackageId::from_bytes(take_object_id(buf, "package")?);

    let id_len = take_u16(buf, "identifier length")? as usize;
    let identifier = Identifier::from_bytes(take(buf, id_len, "identifier")?.to_vec())
        .map_err(|e| malformed(format!("identifier: {e}")))?;

    let threshold = Threshold::new(take_u8(buf, "threshold")?)
        .map_err(|_| malformed("threshold is zero"))?;

    let share_count = take_u8(buf, "share count")?;
    if (share_count as usize) < threshold.as_usize() {
        return Err(malformed(format!(
            "share count {share_count} is below threshold {threshold}"
        )));
    }

    let mut shares = Vec::with_capacity(share_count as usize);
    for i in 0..share_count {
        let server = take_object_id(buf, "share server")?;
        let len = take_u16(buf, "share length")? as usize;
        let share =
            take(buf, len, "share").map_err(|e| malformed(format!("share {i}: {e}")))?;
        shares.push(EncryptedShare {
            server: KeyServerId::from_bytes(server),
            share: share.to_vec(),
        });
    }
    validate_shares(threshold, &shares)?;

    let header = EnvelopeHeader {
        package,
        identifier,
        threshold,
        share_count,
    };
    Ok((header, shares))
}

fn check_ciphertext_len(len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(malformed(format!(
            "ciphertext of {len} bytes exceeds the u32 length field"
        )));
    }
    Ok(())
}

fn validate_shares(threshold: Threshold, shares: &[EncryptedShare]) -> Result<()> {
    if shares.len() < threshold.as_usize() {
        return Err(malformed(format!(
            "share count {} is below threshold {threshold}",
            shares.len()
        )));
    }
    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if !seen.insert(share.server) {
            return Err(malformed(format!("duplicate share for {}", share.server)));
        }
        if share.share.len() > u16::MAX as usize {
            return Err(malformed(format!("share for {} is too large", share.server)));
        }
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(malformed(format!(
            "truncated {what}: need {n} bytes, have {}",
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn take_u8(buf: &mut &[u8], what: &str) -> Result<u8> {
    take(buf, 1, what).map(|b| b[0])
}

fn take_u16(buf: &mut &[u8], what: &str) -> Result<u16> {
    take(buf, 2, what).map(|mut b| b.get_u16())
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
    take(buf, 4, what).map(|mut b| b.get_u32())
}

fn take_object_id(buf: &mut &[u8], what: &str) -> Result<[u8; OBJECT_ID_LEN]> {
    let mut arr = [0u8; OBJECT_ID_LEN];
    arr.copy_from_slice(take(buf, OBJECT_ID_LEN, what)?);
    Ok(arr)
}
