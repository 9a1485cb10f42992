//! Tile-based encoding of phased diploid genomes.
//!
//! A fixed library of short DNA tags marks canonical positions in every
//! haplotype; the sequence between consecutive tags is a tile, and distinct
//! tile contents at a tag position are assigned small integer variant ids by
//! content hash. One genome becomes a dense `2 * tags` vector of variant ids,
//! suitable for stacking into a numpy matrix for downstream analysis.

pub mod cli;
pub mod diff;
pub mod docker;
pub mod export;
pub mod filter;
pub mod hgvs;
pub mod import;
pub mod io;
pub mod library;
pub mod ref2genome;
pub mod tags;
pub mod tiles;
pub mod vcf2fasta;
