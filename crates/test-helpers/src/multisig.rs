//! Multi-signer double with predictable per-index values.

use parking_lot::Mutex;
use spos_core::{MultiSigError, MultiSigner};
use spos_types::{Hash, PublicKey, SignerBitmap};
use std::sync::atomic::{AtomicUsize, Ordering};

type ResetFn = Box<dyn Fn(&[PublicKey], usize) -> Result<(), MultiSigError> + Send + Sync>;
type CreateFn = Box<dyn Fn() -> Result<Vec<u8>, MultiSigError> + Send + Sync>;
type IndexHashFn = Box<dyn Fn(usize) -> Result<Hash, MultiSigError> + Send + Sync>;
type IndexBytesFn = Box<dyn Fn(usize) -> Result<Vec<u8>, MultiSigError> + Send + Sync>;
type VerifyShareFn = Box<dyn Fn(usize, &[u8]) -> Result<(), MultiSigError> + Send + Sync>;
type AggregateFn = Box<dyn Fn(&SignerBitmap) -> Result<Vec<u8>, MultiSigError> + Send + Sync>;

/// Default aggregated signature.
const AGGREGATED: &[u8] = b"aggregated signature";

/// Multi-signer whose values are derived from the signer index.
///
/// Defaults are consistent with the Blake3 hasher: the commitment of signer
/// `i` is `[i]`, its commitment hash is `Hash::from_bytes(&[i])` and its
/// signature share is `[0xaa, i]`. Every share verifies.
pub struct MultiSignerMock {
    self_index: AtomicUsize,
    reset: Mutex<Option<ResetFn>>,
    create_commitment: Mutex<Option<CreateFn>>,
    commitment_hash: Mutex<Option<IndexHashFn>>,
    commitment: Mutex<Option<IndexBytesFn>>,
    signature_share: Mutex<Option<IndexBytesFn>>,
    verify_signature_share: Mutex<Option<VerifyShareFn>>,
    aggregate_sigs: Mutex<Option<AggregateFn>>,
    message: Mutex<Option<Vec<u8>>>,
    stored_commitment_hashes: Mutex<Vec<(usize, Hash)>>,
    stored_commitments: Mutex<Vec<(usize, Vec<u8>)>>,
    stored_signature_shares: Mutex<Vec<(usize, Vec<u8>)>>,
    last_aggregated: Mutex<Option<Vec<u8>>>,
    reset_calls: AtomicUsize,
    messages_set: AtomicUsize,
    aggregate_commitments_calls: AtomicUsize,
}

impl MultiSignerMock {
    pub fn new(self_index: usize) -> Self {
        Self {
            self_index: AtomicUsize::new(self_index),
            reset: Mutex::new(None),
            create_commitment: Mutex::new(None),
            commitment_hash: Mutex::new(None),
            commitment: Mutex::new(None),
            signature_share: Mutex::new(None),
            verify_signature_share: Mutex::new(None),
            aggregate_sigs: Mutex::new(None),
            message: Mutex::new(None),
            stored_commitment_hashes: Mutex::new(Vec::new()),
            stored_commitments: Mutex::new(Vec::new()),
            stored_signature_shares: Mutex::new(Vec::new()),
            last_aggregated: Mutex::new(None),
            reset_calls: AtomicUsize::new(0),
            messages_set: AtomicUsize::new(0),
            aggregate_commitments_calls: AtomicUsize::new(0),
        }
    }

    fn own_index(&self) -> usize {
        self.self_index.load(Ordering::SeqCst)
    }

    pub fn set_reset<F>(&self, f: F)
    where
        F: Fn(&[PublicKey], usize) -> Result<(), MultiSigError> + Send + Sync + 'static,
    {
        *self.reset.lock() = Some(Box::new(f));
    }

    pub fn set_create_commitment<F>(&self, f: F)
    where
        F: Fn() -> Result<Vec<u8>, MultiSigError> + Send + Sync + 'static,
    {
        *self.create_commitment.lock() = Some(Box::new(f));
    }

    pub fn set_commitment_hash<F>(&self, f: F)
    where
        F: Fn(usize) -> Result<Hash, MultiSigError> + Send + Sync + 'static,
    {
        *self.commitment_hash.lock() = Some(Box::new(f));
    }

    pub fn set_commitment<F>(&self, f: F)
    where
        F: Fn(usize) -> Result<Vec<u8>, MultiSigError> + Send + Sync + 'static,
    {
        *self.commitment.lock() = Some(Box::new(f));
    }

    pub fn set_signature_share<F>(&self, f: F)
    where
        F: Fn(usize) -> Result<Vec<u8>, MultiSigError> + Send + Sync + 'static,
    {
        *self.signature_share.lock() = Some(Box::new(f));
    }

    pub fn set_verify_signature_share<F>(&self, f: F)
    where
        F: Fn(usize, &[u8]) -> Result<(), MultiSigError> + Send + Sync + 'static,
    {
        *self.verify_signature_share.lock() = Some(Box::new(f));
    }

    pub fn set_aggregate_sigs<F>(&self, f: F)
    where
        F: Fn(&SignerBitmap) -> Result<Vec<u8>, MultiSigError> + Send + Sync + 'static,
    {
        *self.aggregate_sigs.lock() = Some(Box::new(f));
    }

    /// Last message set for signing.
    pub fn message(&self) -> Option<Vec<u8>> {
        self.message.lock().clone()
    }

    pub fn stored_commitment_hashes(&self) -> Vec<(usize, Hash)> {
        self.stored_commitment_hashes.lock().clone()
    }

    pub fn stored_commitments(&self) -> Vec<(usize, Vec<u8>)> {
        self.stored_commitments.lock().clone()
    }

    pub fn stored_signature_shares(&self) -> Vec<(usize, Vec<u8>)> {
        self.stored_signature_shares.lock().clone()
    }

    /// Last aggregated signature handed out, or the default one.
    pub fn aggregated_signature(&self) -> Vec<u8> {
        self.last_aggregated
            .lock()
            .clone()
            .unwrap_or_else(|| AGGREGATED.to_vec())
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub fn messages_set(&self) -> usize {
        self.messages_set.load(Ordering::SeqCst)
    }

    pub fn aggregate_commitments_calls(&self) -> usize {
        self.aggregate_commitments_calls.load(Ordering::SeqCst)
    }
}

impl Default for MultiSignerMock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MultiSigner for MultiSignerMock {
    fn reset(&self, public_keys: &[PublicKey], self_index: usize) -> Result<(), MultiSigError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = self.reset.lock().as_ref() {
            f(public_keys, self_index)?;
        }
        self.self_index.store(self_index, Ordering::SeqCst);
        Ok(())
    }

    fn set_message(&self, message: &[u8]) {
        self.messages_set.fetch_add(1, Ordering::SeqCst);
        *self.message.lock() = Some(message.to_vec());
    }

    fn create_commitment(&self) -> Result<Vec<u8>, MultiSigError> {
        match self.create_commitment.lock().as_ref() {
            Some(f) => f(),
            None => Ok(vec![self.own_index() as u8]),
        }
    }

    fn store_commitment_hash(&self, index: usize, hash: Hash) -> Result<(), MultiSigError> {
        self.stored_commitment_hashes.lock().push((index, hash));
        Ok(())
    }

    fn commitment_hash(&self, index: usize) -> Result<Hash, MultiSigError> {
        match self.commitment_hash.lock().as_ref() {
            Some(f) => f(index),
            None => Ok(Hash::from_bytes(&[index as u8])),
        }
    }

    fn store_commitment(&self, index: usize, commitment: Vec<u8>) -> Result<(), MultiSigError> {
        self.stored_commitments.lock().push((index, commitment));
        Ok(())
    }

    fn commitment(&self, index: usize) -> Result<Vec<u8>, MultiSigError> {
        match self.commitment.lock().as_ref() {
            Some(f) => f(index),
            None => Ok(vec![index as u8]),
        }
    }

    fn aggregate_commitments(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        self.aggregate_commitments_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok(bitmap.as_bytes().to_vec())
    }

    fn create_signature_share(&self, _bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        Ok(vec![0xaa, self.own_index() as u8])
    }

    fn store_signature_share(&self, index: usize, share: Vec<u8>) -> Result<(), MultiSigError> {
        self.stored_signature_shares.lock().push((index, share));
        Ok(())
    }

    fn signature_share(&self, index: usize) -> Result<Vec<u8>, MultiSigError> {
        match self.signature_share.lock().as_ref() {
            Some(f) => f(index),
            None => Ok(vec![0xaa, index as u8]),
        }
    }

    fn verify_signature_share(
        &self,
        index: usize,
        share: &[u8],
        _bitmap: &SignerBitmap,
    ) -> Result<(), MultiSigError> {
        match self.verify_signature_share.lock().as_ref() {
            Some(f) => f(index, share),
            None => Ok(()),
        }
    }

    fn aggregate_sigs(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        let signature = match self.aggregate_sigs.lock().as_ref() {
            Some(f) => f(bitmap)?,
            None => AGGREGATED.to_vec(),
        };
        *self.last_aggregated.lock() = Some(signature.clone());
        Ok(signature)
    }

    fn verify_aggregated(&self, _signature: &[u8], _bitmap: &SignerBitmap) -> Result<(), MultiSigError> {
        Ok(())
    }
}
