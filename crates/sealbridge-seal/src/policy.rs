//! Policy ledger simulation.
//!
//! Key servers decide whether to release keys by dry-running an approval
//! transaction. [`PolicyLedger`] is that read-only capability;
//! [`MemoryLedger`] is an in-memory allowlist ledger with the semantics of
//! the reference `allowlist::seal_approve` contract.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use rand::RngCore;

use sealbridge_core::{Address, PackageId, PolicyRef};

use crate::approval::{ApprovalCall, ApprovalTransaction, DEFAULT_APPROVAL_FUNCTION, DEFAULT_POLICY_MODULE};
use crate::error::{Result, SealError};

/// Outcome of dry-running an approval transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simulation {
    Approved,
    Denied(String),
}

impl Simulation {
    pub fn is_approved(&self) -> bool {
        matches!(self, Simulation::Approved)
    }
}

/// Read-only view of the ledger that can simulate approval transactions.
#[async_trait]
pub trait PolicyLedger: Send + Sync {
    /// Dry-run `tx` as `sender`. Never mutates ledger state.
    async fn simulate(&self, tx: &ApprovalTransaction, sender: &Address) -> Result<Simulation>;
}

#[derive(Debug, Clone)]
struct Allowlist {
    package: PackageId,
    members: BTreeSet<Address>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    packages: HashSet<PackageId>,
    allowlists: HashMap<PolicyRef, Allowlist>,
}

/// In-memory allowlist ledger.
///
/// Membership changes take effect on the next simulation.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RwLock<LedgerInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package so its entry points can be called.
    pub fn deploy(&self, package: PackageId) {
        self.write().packages.insert(package);
    }

    /// Create an allowlist object under `package` and return its reference.
    pub fn create_allowlist(
        &self,
        package: PackageId,
        members: impl IntoIterator<Item = Address>,
    ) -> Result<PolicyRef> {
        let mut inner = self.write();
        if !inner.packages.contains(&package) {
            return Err(SealError::PolicyMismatch(format!(
                "package {package} is not published"
            )));
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let policy = PolicyRef::from_bytes(bytes);

        inner.allowlists.insert(
            policy,
            Allowlist {
                package,
                members: members.into_iter().collect(),
            },
        );
        Ok(policy)
    }

    pub fn add_member(&self, policy: &PolicyRef, member: Address) -> Result<()> {
        let mut inner = self.write();
        let list = inner
            .allowlists
            .get_mut(policy)
            .ok_or(SealError::UnknownPolicy(*policy))?;
        list.members.insert(member);
        Ok(())
    }

    pub fn remove_member(&self, policy: &PolicyRef, member: &Address) -> Result<()> {
        let mut inner = self.write();
        let list = inner
            .allowlists
            .get_mut(policy)
            .ok_or(SealError::UnknownPolicy(*policy))?;
        list.members.remove(member);
        Ok(())
    }

    pub fn is_member(&self, policy: &PolicyRef, member: &Address) -> bool {
        self.read()
            .allowlists
            .get(policy)
            .is_some_and(|list| list.members.contains(member))
    }

    fn check_call(
        inner: &LedgerInner,
        package: &PackageId,
        call: &ApprovalCall,
        sender: &Address,
    ) -> Simulation {
        if call.module != DEFAULT_POLICY_MODULE || call.function != DEFAULT_APPROVAL_FUNCTION {
            return Simulation::Denied(format!(
                "function {package}::{}::{} does not exist",
                call.module, call.function
            ));
        }
        let Some(list) = inner.allowlists.get(&call.policy_object) else {
            return Simulation::Denied(format!(
                "policy object {} does not exist",
                call.policy_object
            ));
        };
        if &list.package != package {
            return Simulation::Denied(format!(
                "policy object {} belongs to another package",
                call.policy_object
            ));
        }
        if !call.identifier.is_bound_to(&call.policy_object) {
            return Simulation::Denied(format!(
                "identifier {} is not namespaced under {}",
                call.identifier, call.policy_object
            ));
        }
        if !list.members.contains(sender) {
            return Simulation::Denied(format!("{sender} is not on the allowlist"));
        }
        Simulation::Approved
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PolicyLedger for MemoryLedger {
    async fn simulate(&self, tx: &ApprovalTransaction, sender: &Address) -> Result<Simulation> {
        let inner = self.read();
        if !inner.packages.contains(&tx.package) {
            return Ok(Simulation::Denied(format!(
                "package {} is not published",
                tx.package
            )));
        }
        if tx.calls.is_empty() {
            return Ok(Simulation::Denied("transaction has no calls".into()));
        }
        for call in &tx.calls {
            let outcome = Self::check_call(&inner, &tx.package, call, sender);
            if !outcome.is_approved() {
                return Ok(outcome);
            }
        }
        Ok(Simulation::Approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealbridge_core::{Identifier, Nonce};

    const PACKAGE: PackageId = PackageId::from_bytes([0xaa; 32]);
    const ALICE: Address = Address::from_bytes([1; 32]);
    const BOB: Address = Address::from_bytes([2; 32]);

    fn setup() -> (MemoryLedger, PolicyRef) {
        let ledger = MemoryLedger::new();
        ledger.deploy(PACKAGE);
        let policy = ledger.create_allowlist(PACKAGE, [ALICE]).unwrap();
        (ledger, policy)
    }

    fn tx_for(policy: PolicyRef) -> ApprovalTransaction {
        let id = Identifier::for_policy_with_nonce(&policy, &Nonce::from_bytes([1; 5]));
        ApprovalTransaction::build(PACKAGE, id, policy)
    }

    #[tokio::test]
    async fn test_member_is_approved() {
        let (ledger, policy) = setup();
        let outcome = ledger.simulate(&tx_for(policy), &ALICE).await.unwrap();
        assert_eq!(outcome, Simulation::Approved);
    }

    #[tokio::test]
    async fn test_non_member_is_denied() {
        let (ledger, policy) = setup();
        let outcome = ledger.simulate(&tx_for(policy), &BOB).await.unwrap();
        assert!(matches!(outcome, Simulation::Denied(reason) if reason.contains("allowlist")));
    }

    #[tokio::test]
    async fn test_revocation_is_immediate() {
        let (ledger, policy) = setup();
        let tx = tx_for(policy);
        assert!(ledger.simulate(&tx, &ALICE).await.unwrap().is_approved());

        ledger.remove_member(&policy, &ALICE).unwrap();
        assert!(!ledger.simulate(&tx, &ALICE).await.unwrap().is_approved());

        ledger.add_member(&policy, ALICE).unwrap();
        assert!(ledger.simulate(&tx, &ALICE).await.unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_identifier_outside_namespace_is_denied() {
        let (ledger, policy) = setup();
        let foreign = Identifier::from_bytes(vec![0x55; 37]).unwrap();
        let tx = ApprovalTransaction::build(PACKAGE, foreign, policy);
        let outcome = ledger.simulate(&tx, &ALICE).await.unwrap();
        assert!(matches!(outcome, Simulation::Denied(reason) if reason.contains("namespaced")));
    }

    #[tokio::test]
    async fn test_unknown_package_and_entry_point() {
        let (ledger, policy) = setup();

        let mut tx = tx_for(policy);
        tx.package = PackageId::from_bytes([0xbb; 32]);
        assert!(!ledger.simulate(&tx, &ALICE).await.unwrap().is_approved());

        let tx = tx_for(policy).with_entry_point("allowlist", "steal");
        assert!(!ledger.simulate(&tx, &ALICE).await.unwrap().is_approved());
    }

    #[test]
    fn test_unknown_policy_mutation() {
        let (ledger, _) = setup();
        let missing = PolicyRef::from_bytes([9; 32]);
        assert!(matches!(
            ledger.add_member(&missing, BOB),
            Err(SealError::UnknownPolicy(_))
        ));
    }
}
