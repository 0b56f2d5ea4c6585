//! # Committee Model
//!
//! The set of nodes elected for a runtime in a given epoch, their roles,
//! and the per-round selection of the designated transaction scheduler.

use crate::entities::{Epoch, Round};
use serde::{Deserialize, Serialize};
use shared_crypto::PublicKey;

/// The role of a committee member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Primary executor; processes every round.
    Worker,
    /// Backup executor; processes a round only after a discrepancy.
    BackupWorker,
}

/// A single committee member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    /// The member's node key.
    pub public_key: PublicKey,
    /// The member's role.
    pub role: Role,
}

/// The executor committee elected for a runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    /// All elected members.
    pub members: Vec<CommitteeMember>,
}

impl Committee {
    /// Primary workers, in election order.
    pub fn workers(&self) -> impl Iterator<Item = &CommitteeMember> {
        self.members.iter().filter(|m| m.role == Role::Worker)
    }

    /// Backup workers, in election order.
    pub fn backup_workers(&self) -> impl Iterator<Item = &CommitteeMember> {
        self.members.iter().filter(|m| m.role == Role::BackupWorker)
    }

    /// Whether the key belongs to any member.
    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.members.iter().any(|m| m.public_key == *key)
    }

    /// Whether the key belongs to a primary worker.
    pub fn is_worker(&self, key: &PublicKey) -> bool {
        self.workers().any(|m| m.public_key == *key)
    }

    /// Whether the key belongs to a backup worker.
    pub fn is_backup_worker(&self, key: &PublicKey) -> bool {
        self.backup_workers().any(|m| m.public_key == *key)
    }

    /// The designated transaction scheduler for a round.
    ///
    /// Selection rotates round-robin over the primary workers so every
    /// worker eventually proposes. Returns `None` for an empty committee.
    pub fn transaction_scheduler(&self, round: Round) -> Option<&CommitteeMember> {
        let workers: Vec<&CommitteeMember> = self.workers().collect();
        if workers.is_empty() {
            return None;
        }
        Some(workers[(round % workers.len() as u64) as usize])
    }
}

/// A node-local view of the committee state for one epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochSnapshot {
    /// The epoch this snapshot is valid for.
    pub epoch: Epoch,
    /// The executor committee.
    pub committee: Committee,
    /// The local node's key.
    pub local: PublicKey,
    /// Whether the local node also serves on the merge committee.
    pub merge_member: bool,
}

impl EpochSnapshot {
    /// Whether the local node is an executor committee member.
    pub fn is_compute_member(&self) -> bool {
        self.committee.is_member(&self.local)
    }

    /// Whether the local node is a backup worker.
    pub fn is_backup_worker(&self) -> bool {
        self.committee.is_backup_worker(&self.local)
    }

    /// Whether the local node is the transaction scheduler for `round`.
    pub fn is_transaction_scheduler(&self, round: Round) -> bool {
        self.committee
            .transaction_scheduler(round)
            .map(|m| m.public_key == self.local)
            .unwrap_or(false)
    }

    /// Whether the local node is also a merge committee member.
    pub fn is_merge_member(&self) -> bool {
        self.merge_member
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey([b; 32])
    }

    fn committee() -> Committee {
        Committee {
            members: vec![
                CommitteeMember {
                    public_key: key(1),
                    role: Role::Worker,
                },
                CommitteeMember {
                    public_key: key(2),
                    role: Role::Worker,
                },
                CommitteeMember {
                    public_key: key(3),
                    role: Role::BackupWorker,
                },
            ],
        }
    }

    #[test]
    fn test_roles() {
        let c = committee();
        assert!(c.is_worker(&key(1)));
        assert!(!c.is_worker(&key(3)));
        assert!(c.is_backup_worker(&key(3)));
        assert!(c.is_member(&key(2)));
        assert!(!c.is_member(&key(4)));
    }

    #[test]
    fn test_scheduler_rotates_over_workers() {
        let c = committee();
        assert_eq!(c.transaction_scheduler(0).unwrap().public_key, key(1));
        assert_eq!(c.transaction_scheduler(1).unwrap().public_key, key(2));
        assert_eq!(c.transaction_scheduler(2).unwrap().public_key, key(1));
        assert!(Committee::default().transaction_scheduler(0).is_none());
    }

    #[test]
    fn test_epoch_snapshot_views() {
        let snapshot = EpochSnapshot {
            epoch: 5,
            committee: committee(),
            local: key(2),
            merge_member: false,
        };
        assert!(snapshot.is_compute_member());
        assert!(!snapshot.is_backup_worker());
        assert!(snapshot.is_transaction_scheduler(1));
        assert!(!snapshot.is_transaction_scheduler(0));
    }
}
