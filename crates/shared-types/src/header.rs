//! # Runtime Block Headers
//!
//! The invariant-bearing block header of the runtime chain, together with
//! the storage receipt checks that bind a header's roots to signed storage.
//!
//! ## Invariants
//!
//! - `round(h) = round(parent(h)) + 1`
//! - `previous_hash(h) = encoded_hash(parent(h))`
//! - For header types other than `Normal`, the I/O root is empty and the
//!   state root equals the parent's state root.

use crate::encoding::{CanonicalEncode, CanonicalWriter};
use crate::entities::{Epoch, Hash, Namespace, Round};
use crate::errors::ReceiptError;
use crate::receipt::{receipt_signature_context, ReceiptBody, RootType, StorageRoot, RECEIPT_VERSION};
use serde::{Deserialize, Serialize};
use shared_crypto::{verify_many_to_one, Signature};

/// The type of a block header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HeaderType {
    /// Invalid header type; never stored.
    #[default]
    Invalid = 0,
    /// A normal header carrying executed results.
    Normal = 1,
    /// The round failed; the header advances the round without results so
    /// old commitments cannot be replayed.
    RoundFailed = 2,
    /// An epoch transition; advances the round without results.
    EpochTransition = 3,
    /// The runtime was suspended; advances the round without results.
    Suspended = 4,
}

/// A runtime block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Protocol version number.
    pub version: u16,
    /// Runtime this header belongs to.
    pub namespace: Namespace,
    /// Block round.
    pub round: Round,
    /// Block timestamp (POSIX seconds).
    pub timestamp: u64,
    /// Header type.
    pub header_type: HeaderType,
    /// Encoded hash of the previous block's header.
    pub previous_hash: Hash,
    /// I/O merkle root.
    pub io_root: Hash,
    /// State merkle root.
    pub state_root: Hash,
    /// Hash of emitted runtime messages.
    pub messages_hash: Hash,
    /// Storage receipt signatures over the header's roots.
    pub storage_signatures: Vec<Signature>,
}

impl CanonicalEncode for BlockHeader {
    fn encode_fields(&self, w: &mut CanonicalWriter) {
        w.write_u16(1, self.version);
        w.write_array(2, self.namespace.as_bytes());
        w.write_u64(3, self.round);
        w.write_u64(4, self.timestamp);
        w.write_u8(5, self.header_type as u8);
        w.write_hash(6, &self.previous_hash);
        w.write_hash(7, &self.io_root);
        w.write_hash(8, &self.state_root);
        w.write_hash(9, &self.messages_hash);
        w.write_signatures(10, &self.storage_signatures);
    }
}

impl BlockHeader {
    /// The encoded cryptographic hash of the header.
    pub fn encoded_hash(&self) -> Hash {
        self.canonical_hash()
    }

    /// Whether this header directly extends `parent`.
    pub fn is_child_of(&self, parent: &BlockHeader) -> bool {
        self.previous_hash == parent.encoded_hash()
    }

    /// Equality omitting the storage signatures.
    ///
    /// Receipt signatures are not universally present, so comparisons of
    /// header content clear them on both sides first.
    pub fn mostly_equal(&self, other: &BlockHeader) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.storage_signatures = Vec::new();
        b.storage_signatures = Vec::new();
        a.encoded_hash() == b.encoded_hash()
    }

    /// The storage roots contained in this header.
    pub fn storage_roots(&self) -> Vec<StorageRoot> {
        vec![
            StorageRoot {
                namespace: self.namespace,
                round: self.round,
                root_type: RootType::Io,
                hash: self.io_root,
            },
            StorageRoot {
                namespace: self.namespace,
                round: self.round,
                root_type: RootType::State,
                hash: self.state_root,
            },
        ]
    }

    /// The merkle roots that must be part of a storage receipt.
    pub fn roots_for_storage_receipt(&self) -> Vec<Hash> {
        vec![self.io_root, self.state_root]
    }

    /// The root type sequence matching [`Self::roots_for_storage_receipt`].
    pub fn root_types_for_storage_receipt() -> Vec<RootType> {
        vec![RootType::Io, RootType::State]
    }

    /// Validate that the attached storage signatures sign a receipt over
    /// this header's roots.
    ///
    /// Checking that the signing keys belong to the storage committee is
    /// the caller's responsibility.
    pub fn verify_storage_receipt_signatures(&self) -> Result<(), ReceiptError> {
        let receipt_body = ReceiptBody {
            version: RECEIPT_VERSION,
            namespace: self.namespace,
            round: self.round,
            root_types: Self::root_types_for_storage_receipt(),
            roots: self.roots_for_storage_receipt(),
        };
        verify_many_to_one(
            &receipt_signature_context(),
            &receipt_body.canonical_encode(),
            &self.storage_signatures,
        )
        .map_err(|_| ReceiptError::VerifyFailed)
    }

    /// Validate that a receipt body matches this header.
    pub fn verify_storage_receipt(&self, receipt: &ReceiptBody) -> Result<(), ReceiptError> {
        if receipt.namespace != self.namespace {
            return Err(ReceiptError::UnexpectedNamespace);
        }
        if receipt.round != self.round {
            return Err(ReceiptError::UnexpectedRound {
                expected: self.round,
                actual: receipt.round,
            });
        }
        let roots = self.roots_for_storage_receipt();
        let types = Self::root_types_for_storage_receipt();
        if receipt.roots.len() != roots.len() || receipt.root_types.len() != types.len() {
            return Err(ReceiptError::RootCountMismatch);
        }
        for (idx, root) in roots.iter().enumerate() {
            if types[idx] != receipt.root_types[idx] {
                return Err(ReceiptError::RootTypeMismatch);
            }
            if *root != receipt.roots[idx] {
                return Err(ReceiptError::RootMismatch);
            }
        }
        Ok(())
    }
}

/// A runtime block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
}

impl Block {
    /// The genesis block of a runtime chain: round 0, normal type, empty
    /// I/O and state roots.
    pub fn new_genesis(namespace: Namespace) -> Self {
        Self {
            header: BlockHeader {
                version: 0,
                namespace,
                round: 0,
                timestamp: 0,
                header_type: HeaderType::Normal,
                previous_hash: Hash::EMPTY,
                io_root: Hash::EMPTY,
                state_root: Hash::EMPTY,
                messages_hash: Hash::EMPTY,
                storage_signatures: Vec::new(),
            },
        }
    }

    /// An empty successor block: advances the round, carries no I/O and
    /// preserves the parent's state root. Used for round failures, epoch
    /// transitions and suspensions.
    pub fn new_empty(parent: &Block, header_type: HeaderType, timestamp: u64) -> Self {
        Self {
            header: BlockHeader {
                version: parent.header.version,
                namespace: parent.header.namespace,
                round: parent.header.round + 1,
                timestamp,
                header_type,
                previous_hash: parent.header.encoded_hash(),
                io_root: Hash::EMPTY,
                state_root: parent.header.state_root,
                messages_hash: Hash::EMPTY,
                storage_signatures: Vec::new(),
            },
        }
    }
}

/// A finalized block annotated with the consensus height that finalized it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedBlock {
    /// Consensus height at which the block was finalized.
    pub height: u64,
    /// The finalized block.
    pub block: Block,
}

/// A consensus-layer light block reference handed to runtime checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightBlock {
    /// Consensus height.
    pub height: u64,
    /// Epoch the height falls in.
    pub epoch: Epoch,
}
