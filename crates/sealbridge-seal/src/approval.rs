//! Approval transactions.
//!
//! An approval transaction is never executed. Key servers dry-run it against
//! the ledger: if every call succeeds for the session's user, the identifiers
//! those calls check may be released. It is built as a transaction kind only
//! (no gas, no sender) and rebuilt for every key request.

use serde::{Deserialize, Serialize};

use sealbridge_core::{Identifier, PackageId, PolicyRef};

use crate::error::{Result, SealError};

/// Module holding the default approval entry point.
pub const DEFAULT_POLICY_MODULE: &str = "allowlist";

/// Default approval entry point.
pub const DEFAULT_APPROVAL_FUNCTION: &str = "seal_approve";

/// One `seal_approve`-style call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCall {
    pub module: String,
    pub function: String,
    /// The identifier the call checks.
    pub identifier: Identifier,
    /// The policy object passed to the call.
    pub policy_object: PolicyRef,
}

/// A read-only transaction proving entitlement to one or more identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTransaction {
    pub package: PackageId,
    pub calls: Vec<ApprovalCall>,
    /// Built without gas data or sender.
    pub transaction_kind_only: bool,
}

impl ApprovalTransaction {
    /// A transaction with one call to `allowlist::seal_approve(identifier, policy_object)`.
    pub fn build(package: PackageId, identifier: Identifier, policy_object: PolicyRef) -> Self {
        Self {
            package,
            calls: vec![ApprovalCall {
                module: DEFAULT_POLICY_MODULE.to_string(),
                function: DEFAULT_APPROVAL_FUNCTION.to_string(),
                identifier,
                policy_object,
            }],
            transaction_kind_only: true,
        }
    }

    /// Route every call to `module::function` instead.
    pub fn with_entry_point(mut self, module: &str, function: &str) -> Self {
        for call in &mut self.calls {
            call.module = module.to_string();
            call.function = function.to_string();
        }
        self
    }

    /// Add a call checking another identifier through the same entry point.
    pub fn and_call(mut self, identifier: Identifier, policy_object: PolicyRef) -> Self {
        let (module, function) = self
            .calls
            .first()
            .map(|c| (c.module.clone(), c.function.clone()))
            .unwrap_or_else(|| {
                (
                    DEFAULT_POLICY_MODULE.to_string(),
                    DEFAULT_APPROVAL_FUNCTION.to_string(),
                )
            });
        self.calls.push(ApprovalCall {
            module,
            function,
            identifier,
            policy_object,
        });
        self
    }

    /// Identifiers checked by this transaction, in call order.
    pub fn checked_identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.calls.iter().map(|c| &c.identifier)
    }

    /// Whether some call checks `identifier`.
    pub fn covers(&self, identifier: &Identifier) -> bool {
        self.checked_identifiers().any(|id| id == identifier)
    }

    /// `<package>::<module>::<function>` of the first call.
    pub fn target(&self) -> String {
        match self.calls.first() {
            Some(call) => format!("{}::{}::{}", self.package, call.module, call.function),
            None => format!("{}::<none>", self.package),
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SealError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SealError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Identifier {
        Identifier::from_bytes(vec![byte; 37]).unwrap()
    }

    #[test]
    fn test_default_entry_point() {
        let tx = ApprovalTransaction::build(PackageId::from_bytes([1; 32]), id(2), PolicyRef::ZERO);
        assert!(tx.transaction_kind_only);
        assert_eq!(tx.calls.len(), 1);
        assert!(tx.target().ends_with("::allowlist::seal_approve"));
        assert!(tx.target().starts_with("0x0101"));
    }

    #[test]
    fn test_custom_entry_point_applies_to_added_calls() {
        let tx = ApprovalTransaction::build(PackageId::ZERO, id(1), PolicyRef::ZERO)
            .with_entry_point("private_data", "seal_approve")
            .and_call(id(2), PolicyRef::ZERO);
        assert_eq!(tx.calls[1].module, "private_data");
        assert!(tx.covers(&id(1)));
        assert!(tx.covers(&id(2)));
        assert!(!tx.covers(&id(3)));
    }

    #[test]
    fn test_cbor_roundtrip() {
        let tx = ApprovalTransaction::build(PackageId::ZERO, id(7), PolicyRef::from_bytes([7; 32]));
        let recovered = ApprovalTransaction::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(tx, recovered);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(ApprovalTransaction::from_bytes(&[0xff, 0x00, 0x13]).is_err());
    }
}
