//! The tag library: a fixed ordered set of short DNA k-mers and a
//! multi-pattern locator over haplotype byte streams.
//!
//! Tags are keyed by their first `keylen` bases (the minimum tag length,
//! capped at 32) packed two bits per base into a `u64`. The locator keeps a
//! rolling fingerprint over the haystack; the packing has no escape value, so
//! the fingerprint must reset on every non-acgt byte to avoid ghost matches.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use std::io::BufRead;

pub type TagId = u32;

/// Longest keyable prefix: 32 bases at two bits per base fills the u64.
const MAX_KEYLEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    pub id: TagId,
    /// 0-based offset of the tag's first base in the haystack.
    pub pos: usize,
    /// Full tag length (may exceed the keyed prefix).
    pub len: usize,
}

#[derive(Debug)]
struct TagInfo {
    id: TagId,
    seq: Vec<u8>,
}

#[derive(Debug)]
pub struct TagLibrary {
    tagmap: FxHashMap<u64, TagInfo>,
    keylen: usize,
    mask: u64,
}

impl TagLibrary {
    /// Parse a FASTA-like tag set: non-header lines are tag sequences, one
    /// tag per line, ordered by appearance.
    pub fn load(reader: impl BufRead) -> Result<Self> {
        let mut seqs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('>') {
                continue;
            }
            seqs.push(line.as_bytes().to_ascii_lowercase());
        }
        Self::from_tags(seqs)
    }

    fn from_tags(tags: Vec<Vec<u8>>) -> Result<Self> {
        let mut keylen = MAX_KEYLEN;
        for tag in &tags {
            keylen = keylen.min(tag.len());
        }
        let mask = fingerprint_mask(keylen);
        let mut tagmap = FxHashMap::default();
        for (i, tag) in tags.into_iter().enumerate() {
            let Some(key) = pack(&tag[..keylen]) else {
                bail!(
                    "tag {} ({}) contains a base other than acgt",
                    i,
                    String::from_utf8_lossy(&tag)
                );
            };
            let info = TagInfo {
                id: i as TagId,
                seq: tag,
            };
            if let Some(prev) = tagmap.insert(key, info) {
                bail!(
                    "first {} bases of tag {} are not unique (tag {} has the same prefix)",
                    keylen,
                    i,
                    prev.id
                );
            }
        }
        Ok(Self {
            tagmap,
            keylen,
            mask,
        })
    }

    pub fn len(&self) -> usize {
        self.tagmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tagmap.is_empty()
    }

    pub fn keylen(&self) -> usize {
        self.keylen
    }

    /// The tag sequences in id order (lowercase).
    pub fn tag_sequences(&self) -> Vec<Vec<u8>> {
        let mut tags: Vec<_> = self.tagmap.values().collect();
        tags.sort_by_key(|info| info.id);
        tags.iter().map(|info| info.seq.clone()).collect()
    }

    /// Scan `haystack` (lowercase bytes) left to right and emit every tag
    /// match. The fingerprint resets after each hit, so matches never start
    /// within `keylen` bases of the previous match.
    pub fn find_all(&self, haystack: &[u8], mut emit: impl FnMut(TagMatch)) {
        let mut fingerprint = 0u64;
        let mut valid = 0usize;
        for (i, &base) in haystack.iter().enumerate() {
            let Some(code) = base_code(base) else {
                fingerprint = 0;
                valid = 0;
                continue;
            };
            fingerprint = ((fingerprint << 2) | code) & self.mask;
            if valid + 1 < self.keylen {
                valid += 1;
                continue;
            }
            let Some(info) = self.tagmap.get(&fingerprint) else {
                continue;
            };
            let start = i + 1 - self.keylen;
            if info.seq.len() > self.keylen {
                let end = start + info.seq.len();
                if end > haystack.len() || haystack[start..end] != info.seq[..] {
                    // keyed prefix matches, but not the entire tag
                    continue;
                }
            }
            emit(TagMatch {
                id: info.id,
                pos: start,
                len: info.seq.len(),
            });
            fingerprint = 0;
            valid = 0;
        }
    }
}

fn fingerprint_mask(keylen: usize) -> u64 {
    if keylen >= MAX_KEYLEN {
        u64::MAX
    } else {
        (1u64 << (2 * keylen)) - 1
    }
}

fn base_code(base: u8) -> Option<u64> {
    match base {
        b'a' => Some(0),
        b'c' => Some(1),
        b'g' => Some(2),
        b't' => Some(3),
        _ => None,
    }
}

fn pack(bases: &[u8]) -> Option<u64> {
    let mut key = 0u64;
    for &base in bases {
        key = (key << 2) | base_code(base)?;
    }
    Some(key)
}
