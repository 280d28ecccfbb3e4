//! In-memory chain and a configurable block processor.

use parking_lot::Mutex;
use spos_core::{BlockChain, BlockProcessError, BlockProcessor};
use spos_messages::codec;
use spos_types::{BlockBody, BlockHeader, Hash, RoundIndex, ShardId};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chain that only remembers its head.
#[derive(Debug)]
pub struct BlockChainMock {
    genesis: Hash,
    head: Mutex<Option<(BlockHeader, Hash)>>,
}

impl BlockChainMock {
    pub fn new(genesis: Hash) -> Self {
        Self {
            genesis,
            head: Mutex::new(None),
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis
    }

    /// Move the head to `header`, hashing its encoding.
    pub fn set_head(&self, header: BlockHeader) {
        let hash = match codec::encode_header(&header) {
            Ok(bytes) => Hash::from_bytes(&bytes),
            Err(e) => panic!("header encoding failed: {e}"),
        };
        *self.head.lock() = Some((header, hash));
    }

    pub fn head(&self) -> Option<BlockHeader> {
        self.head.lock().as_ref().map(|(header, _)| header.clone())
    }

    pub fn head_hash(&self) -> Option<Hash> {
        self.head.lock().as_ref().map(|(_, hash)| *hash)
    }
}

impl Default for BlockChainMock {
    fn default() -> Self {
        Self::new(Hash::from_bytes(b"genesis"))
    }
}

impl BlockChain for BlockChainMock {
    fn current_block_header(&self) -> Option<BlockHeader> {
        self.head()
    }

    fn current_block_header_hash(&self) -> Option<Hash> {
        self.head_hash()
    }

    fn genesis_header_hash(&self) -> Hash {
        self.genesis
    }

    fn set_current_block_header(&self, header: BlockHeader) {
        self.set_head(header);
    }
}

type CreateBodyFn =
    Box<dyn Fn(ShardId, RoundIndex) -> Result<BlockBody, BlockProcessError> + Send + Sync>;
type BlockFn =
    Box<dyn Fn(&BlockHeader, &BlockBody) -> Result<(), BlockProcessError> + Send + Sync>;

/// Block processor accepting every block unless told otherwise.
///
/// By default bodies are empty, processing succeeds and commit moves the
/// chain head to the committed header.
#[derive(Default)]
pub struct BlockProcessorMock {
    create_block_body: Mutex<Option<CreateBodyFn>>,
    process_block: Mutex<Option<BlockFn>>,
    commit_block: Mutex<Option<BlockFn>>,
    committed: Mutex<Vec<BlockHeader>>,
    create_calls: AtomicUsize,
    process_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    revert_calls: AtomicUsize,
}

impl BlockProcessorMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_create_block_body<F>(&self, f: F)
    where
        F: Fn(ShardId, RoundIndex) -> Result<BlockBody, BlockProcessError> + Send + Sync + 'static,
    {
        *self.create_block_body.lock() = Some(Box::new(f));
    }

    pub fn set_process_block<F>(&self, f: F)
    where
        F: Fn(&BlockHeader, &BlockBody) -> Result<(), BlockProcessError> + Send + Sync + 'static,
    {
        *self.process_block.lock() = Some(Box::new(f));
    }

    pub fn set_commit_block<F>(&self, f: F)
    where
        F: Fn(&BlockHeader, &BlockBody) -> Result<(), BlockProcessError> + Send + Sync + 'static,
    {
        *self.commit_block.lock() = Some(Box::new(f));
    }

    /// Headers committed so far, in order.
    pub fn committed(&self) -> Vec<BlockHeader> {
        self.committed.lock().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn revert_calls(&self) -> usize {
        self.revert_calls.load(Ordering::SeqCst)
    }
}

impl BlockProcessor for BlockProcessorMock {
    fn create_block_body(
        &self,
        shard_id: ShardId,
        round: RoundIndex,
        _have_time: &dyn Fn() -> bool,
    ) -> Result<BlockBody, BlockProcessError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.create_block_body.lock().as_ref() {
            Some(f) => f(shard_id, round),
            None => Ok(BlockBody {
                shard_id,
                tx_hashes: Vec::new(),
            }),
        }
    }

    fn process_block(
        &self,
        _chain: &dyn BlockChain,
        header: &BlockHeader,
        body: &BlockBody,
        _have_time: &dyn Fn() -> bool,
    ) -> Result<(), BlockProcessError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        match self.process_block.lock().as_ref() {
            Some(f) => f(header, body),
            None => Ok(()),
        }
    }

    fn commit_block(
        &self,
        chain: &dyn BlockChain,
        header: &BlockHeader,
        body: &BlockBody,
    ) -> Result<(), BlockProcessError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = self.commit_block.lock().as_ref() {
            f(header, body)?;
        }
        chain.set_current_block_header(header.clone());
        self.committed.lock().push(header.clone());
        Ok(())
    }

    fn revert_account_state(&self) {
        self.revert_calls.fetch_add(1, Ordering::SeqCst);
    }
}
