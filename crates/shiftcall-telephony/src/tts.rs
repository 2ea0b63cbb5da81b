//! Text-to-speech engine contract: text in, mu-law 8kHz frames out.
//! Synthesis itself is out of scope here — only the contract lives in this
//! crate; the concrete engine is supplied by the binary's composition root.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesizes `text` to raw mu-law-encoded 8kHz mono samples, one byte
    /// per sample, ready for `media::chunk_into_frames`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}
