//! The tile library and the FASTA tiler.
//!
//! A tile runs from the first base of one accepted tag match through the last
//! base of the next accepted tag (the final tile runs to the end of the
//! sequence). Tile contents are content-addressed: identical bytes at the same
//! tag position share one 1-based variant id, assigned in first-seen order and
//! never renumbered. Variant id 0 is reserved for no-call tiles (any base
//! outside acgt).

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Mutex;
use tracing::debug;

use crate::io::FastaReader;
use crate::tags::{TagLibrary, TagMatch};

pub type VariantId = u16;

/// Reserved variant id for tiles containing bases outside acgt.
pub const NO_CALL: VariantId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRef {
    pub tag: crate::tags::TagId,
    pub variant: VariantId,
}

/// The paths produced by tiling one FASTA stream, keyed by sequence label.
pub type TileSeq = BTreeMap<String, Vec<TileRef>>;

/// Flatten a tile sequence into a vector indexed by tag id: entry `t` is the
/// variant id of tag `t`, or 0 where the tag was absent. Length is
/// `max_tag + 1` over all paths.
pub fn variants(tseq: &TileSeq) -> Vec<VariantId> {
    let maxtag = tseq
        .values()
        .flatten()
        .map(|r| r.tag as usize)
        .max();
    let Some(maxtag) = maxtag else {
        return Vec::new();
    };
    let mut out = vec![NO_CALL; maxtag + 1];
    for r in tseq.values().flatten() {
        out[r.tag as usize] = r.variant;
    }
    out
}

pub struct TileLibrary {
    taglib: TagLibrary,
    skip_ooo: bool,
    // variant hash buckets indexed by tag id; append-only within a run
    variants: Mutex<Vec<Vec<[u8; 32]>>>,
}

impl TileLibrary {
    pub fn new(taglib: TagLibrary, skip_ooo: bool) -> Self {
        Self {
            taglib,
            skip_ooo,
            variants: Mutex::new(Vec::new()),
        }
    }

    pub fn taglib(&self) -> &TagLibrary {
        &self.taglib
    }

    /// Total number of distinct tile variants across all tags.
    pub fn len(&self) -> usize {
        self.variants.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the variant id for a tile with the given tag and content,
    /// adding the content hash to the library if needed.
    pub fn get_or_insert(&self, tag: crate::tags::TagId, seq: &[u8]) -> VariantId {
        if seq.iter().any(|&b| !matches!(b, b'a' | b'c' | b'g' | b't')) {
            return NO_CALL;
        }
        let hash: [u8; 32] = Sha256::digest(seq).into();
        let mut buckets = self.variants.lock().unwrap();
        let tag = tag as usize;
        if buckets.len() <= tag {
            buckets.resize_with(tag + 1, Vec::new);
        }
        let bucket = &mut buckets[tag];
        for (i, existing) in bucket.iter().enumerate() {
            if *existing == hash {
                return (i + 1) as VariantId;
            }
        }
        bucket.push(hash);
        bucket.len() as VariantId
    }

    /// Tile every sequence in a FASTA stream. Labels containing `_` (alt and
    /// decoy contigs) and empty sequences are skipped.
    pub fn tile_fasta(&self, filelabel: &str, reader: impl BufRead) -> Result<TileSeq> {
        let mut ret = TileSeq::new();
        let mut fasta = FastaReader::new(reader);
        while let Some((label, mut seq)) = fasta.next_record()? {
            if label.contains('_') {
                debug!("{} {} skipping", filelabel, label);
                continue;
            }
            if seq.is_empty() {
                continue;
            }
            seq.make_ascii_lowercase();
            debug!("{} {} tiling", filelabel, label);
            let mut found = Vec::new();
            self.taglib.find_all(&seq, |m| found.push(m));
            if self.skip_ooo {
                found = skip_out_of_order(&found);
            }
            let mut path = Vec::with_capacity(found.len());
            for (i, f) in found.iter().enumerate() {
                let end = match found.get(i + 1) {
                    Some(next) => next.pos + next.len,
                    None => seq.len(),
                };
                path.push(TileRef {
                    tag: f.id,
                    variant: self.get_or_insert(f.id, &seq[f.pos..end]),
                });
            }
            debug!("{} {} tiled with path len {}", filelabel, label, path.len());
            ret.insert(label, path);
        }
        Ok(ret)
    }
}

/// Drop tag matches that appear out of order. A match is dropped when its tag
/// id does not increase, or when accepting it would skip over tags and the
/// immediately following match is a cheaper alternative (look-ahead depth is
/// exactly one match).
fn skip_out_of_order(found: &[TagMatch]) -> Vec<TagMatch> {
    let mut kept = Vec::with_capacity(found.len());
    let mut last: i64 = -1;
    for (i, f) in found.iter().enumerate() {
        let tag = f.id as i64;
        if tag <= last {
            continue;
        }
        if tag > last + 1 {
            if let Some(next) = found.get(i + 1) {
                let next_tag = next.id as i64;
                if last < next_tag && next_tag <= tag {
                    continue;
                }
            }
        }
        kept.push(*f);
        last = tag;
    }
    kept
}
