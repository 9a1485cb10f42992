//! The on-disk library stream: a concatenation of self-delimiting,
//! bincode-encoded `LibraryEntry` records. Every field of an entry is
//! optional-by-emptiness, so one stream can interleave tag sets, tile
//! variant descriptors, and compact genomes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

use crate::tiles::VariantId;

/// One sample's haplotype-interleaved variant vector: entry `2t + h` is the
/// variant id of tag `t` in haplotype `h`, or 0 when absent or no-call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactGenome {
    pub name: String,
    pub variants: Vec<VariantId>,
}

/// A tile variant descriptor. The hash is the stable identity; the sequence
/// bytes are optional payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileVariantRecord {
    pub tag: u32,
    pub hash: [u8; 32],
    pub sequence: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub tag_set: Vec<Vec<u8>>,
    pub tile_variants: Vec<TileVariantRecord>,
    pub compact_genomes: Vec<CompactGenome>,
}

/// Append one entry to the stream.
pub fn write_entry<W: Write>(writer: &mut W, entry: &LibraryEntry) -> Result<()> {
    bincode::serialize_into(writer, entry).context("error encoding library entry")
}

/// Read a whole stream and collect the compact genomes from every entry.
/// A clean end of input terminates the stream; anything else mid-record is
/// a decode error reported with the failing entry index.
pub fn read_compact_genomes<R: BufRead>(mut reader: R) -> Result<Vec<CompactGenome>> {
    let mut genomes = Vec::new();
    for index in 0.. {
        if reader.fill_buf()?.is_empty() {
            break;
        }
        let entry: LibraryEntry = bincode::deserialize_from(&mut reader)
            .with_context(|| format!("malformed library stream at entry {index}"))?;
        genomes.extend(entry.compact_genomes);
    }
    Ok(genomes)
}
