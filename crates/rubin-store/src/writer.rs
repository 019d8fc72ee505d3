//! Single-writer supervisor.
//!
//! The entire mutating path (parse, validate, apply, commit) for a chain
//! runs on one logical writer; readers take snapshot reads through the
//! committed store. Cancellation is honoured between blocks only; a block
//! either applies fully and commits, or not at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::StoreError;
use crate::pipeline::{Chain, ImportResult};

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct ChainWriter<'a> {
    chain: Chain<'a>,
    token: CancelToken,
}

impl<'a> ChainWriter<'a> {
    pub fn new(chain: Chain<'a>, token: CancelToken) -> Self {
        Self { chain, token }
    }

    pub fn chain(&self) -> &Chain<'a> {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain<'a> {
        &mut self.chain
    }

    /// Import a sequence of blocks, checking the cancellation token between
    /// blocks. Returns the results for every block actually attempted.
    pub fn import_all<I>(&mut self, blocks: I) -> Result<Vec<ImportResult>, StoreError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut results = Vec::new();
        for block in blocks {
            if self.token.is_cancelled() {
                break;
            }
            results.push(self.chain.import_block(&block)?);
        }
        Ok(results)
    }
}
