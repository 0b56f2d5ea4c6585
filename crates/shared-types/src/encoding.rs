//! # Canonical Encoding
//!
//! Deterministic tag-ordered binary encoding for everything that gets
//! hashed or signed.
//!
//! Each struct writes its fields as `(tag, value)` pairs in strictly
//! ascending tag order. Integers are fixed-width little-endian, byte
//! strings carry a length prefix, and nested structures are encoded to a
//! length-prefixed sub-buffer. Two nodes encoding the same value always
//! produce identical bytes, which is what makes header hashes and
//! signature payloads comparable across the network.

use crate::entities::Hash;
use shared_crypto::Signature;

/// Writer producing the canonical byte form of a structure.
pub struct CanonicalWriter {
    buf: Vec<u8>,
    last_tag: Option<u8>,
}

impl CanonicalWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            last_tag: None,
        }
    }

    fn tag(&mut self, tag: u8) {
        if let Some(last) = self.last_tag {
            debug_assert!(tag > last, "canonical field tags must strictly ascend");
        }
        self.last_tag = Some(tag);
        self.buf.push(tag);
    }

    /// Write a u8 field.
    pub fn write_u8(&mut self, tag: u8, v: u8) {
        self.tag(tag);
        self.buf.push(v);
    }

    /// Write a u16 field.
    pub fn write_u16(&mut self, tag: u8, v: u16) {
        self.tag(tag);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a u64 field.
    pub fn write_u64(&mut self, tag: u8, v: u64) {
        self.tag(tag);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a length-prefixed byte string field.
    pub fn write_bytes(&mut self, tag: u8, bytes: &[u8]) {
        self.tag(tag);
        self.buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }

    /// Write a fixed 32-byte array field.
    pub fn write_array(&mut self, tag: u8, bytes: &[u8; 32]) {
        self.tag(tag);
        self.buf.extend_from_slice(bytes);
    }

    /// Write a hash field.
    pub fn write_hash(&mut self, tag: u8, h: &Hash) {
        self.write_array(tag, h.as_bytes());
    }

    /// Write a signature field (public key followed by signature bytes).
    pub fn write_signature(&mut self, tag: u8, sig: &Signature) {
        self.tag(tag);
        self.buf.extend_from_slice(sig.public_key.as_bytes());
        self.buf.extend_from_slice(sig.signature.as_bytes());
    }

    /// Write a sequence of signatures.
    pub fn write_signatures(&mut self, tag: u8, sigs: &[Signature]) {
        self.tag(tag);
        self.buf.extend_from_slice(&(sigs.len() as u64).to_le_bytes());
        for sig in sigs {
            self.buf.extend_from_slice(sig.public_key.as_bytes());
            self.buf.extend_from_slice(sig.signature.as_bytes());
        }
    }

    /// Write a nested structure as a length-prefixed sub-encoding.
    pub fn write_nested<T: CanonicalEncode>(&mut self, tag: u8, value: &T) {
        let encoded = value.canonical_encode();
        self.write_bytes(tag, &encoded);
    }

    /// Consume the writer and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for CanonicalWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A structure with a canonical binary form.
pub trait CanonicalEncode {
    /// Write the fields of this structure, tags ascending.
    fn encode_fields(&self, w: &mut CanonicalWriter);

    /// The canonical byte form.
    fn canonical_encode(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new();
        self.encode_fields(&mut w);
        w.finish()
    }

    /// Digest of the canonical byte form.
    fn canonical_hash(&self) -> Hash {
        Hash::digest_bytes(&self.canonical_encode())
    }
}
