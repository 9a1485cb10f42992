//! Tile-variant pruning over a library stream. Filters apply in a fixed
//! order (max-variants, max-tag, min-coverage) and each pass zeroes or
//! truncates slots without renumbering anything, so applying the same
//! filter twice is a no-op.

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use tracing::info;

use crate::cli::FilterArgs;
use crate::io::{open_input, open_output};
use crate::library::{read_compact_genomes, write_entry, CompactGenome, LibraryEntry};

pub fn run(args: &FilterArgs) -> Result<()> {
    info!("reading");
    let mut genomes = read_compact_genomes(open_input(&args.input)?)
        .with_context(|| format!("{}: read failed", args.input))?;
    info!("reading done, {} genomes", genomes.len());

    info!("filtering");
    apply_filters(&mut genomes, args.max_variants, args.max_tag, args.min_coverage);
    info!("filtering done");

    info!("writing");
    let mut writer = BufWriter::new(open_output(&args.output)?);
    write_entry(
        &mut writer,
        &LibraryEntry {
            compact_genomes: genomes,
            ..Default::default()
        },
    )?;
    writer.flush().context("error flushing output")?;
    info!("writing done");
    Ok(())
}

pub fn apply_filters(
    genomes: &mut Vec<CompactGenome>,
    max_variants: Option<u16>,
    max_tag: Option<usize>,
    min_coverage: f64,
) {
    let mut ntags = genomes
        .iter()
        .map(|g| g.variants.len() / 2)
        .max()
        .unwrap_or(0);

    if let Some(max_variants) = max_variants {
        let mut drop = vec![false; ntags];
        for genome in genomes.iter() {
            for (idx, &variant) in genome.variants.iter().enumerate() {
                if variant > max_variants {
                    drop[idx / 2] = true;
                }
            }
        }
        for genome in genomes.iter_mut() {
            for (tag, &dropped) in drop.iter().enumerate() {
                if dropped && genome.variants.len() > tag * 2 {
                    genome.variants[tag * 2] = 0;
                    if genome.variants.len() > tag * 2 + 1 {
                        genome.variants[tag * 2 + 1] = 0;
                    }
                }
            }
        }
    }

    if let Some(max_tag) = max_tag {
        if ntags > max_tag {
            ntags = max_tag;
            for genome in genomes.iter_mut() {
                genome.variants.truncate(max_tag * 2);
            }
        }
    }

    if min_coverage < 1.0 {
        let min_count = (min_coverage * (genomes.len() * 2) as f64) as usize;
        let mut coverage = vec![0usize; ntags];
        for genome in genomes.iter() {
            for (idx, &variant) in genome.variants.iter().enumerate() {
                if variant > 0 {
                    coverage[idx / 2] += 1;
                }
            }
        }
        for (tag, &count) in coverage.iter().enumerate() {
            if count < min_count {
                for genome in genomes.iter_mut() {
                    if genome.variants.len() > tag * 2 {
                        genome.variants[tag * 2] = 0;
                        if genome.variants.len() > tag * 2 + 1 {
                            genome.variants[tag * 2 + 1] = 0;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genome(name: &str, variants: Vec<u16>) -> CompactGenome {
        CompactGenome {
            name: name.to_string(),
            variants,
        }
    }

    #[test]
    fn test_max_variants_zeroes_both_haplotypes_everywhere() {
        let mut genomes = vec![
            genome("g1", vec![1, 1, 3, 1]),
            genome("g2", vec![2, 1, 1, 1]),
        ];
        apply_filters(&mut genomes, Some(2), None, 1.0);
        // tag 1 had a variant above the limit in g1: zeroed for everyone
        assert_eq!(genomes[0].variants, vec![1, 1, 0, 0]);
        assert_eq!(genomes[1].variants, vec![2, 1, 0, 0]);
    }

    #[test]
    fn test_max_tag_truncates() {
        let mut genomes = vec![genome("g1", vec![1, 1, 2, 2, 3, 3])];
        apply_filters(&mut genomes, None, Some(2), 1.0);
        assert_eq!(genomes[0].variants, vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_min_coverage_zeroes_sparse_tags() {
        let mut genomes = vec![
            genome("g1", vec![1, 1, 1, 0]),
            genome("g2", vec![1, 1, 0, 0]),
        ];
        // tag 1 is called in 1 of 4 haplotypes; requiring half zeroes it
        apply_filters(&mut genomes, None, None, 0.5);
        assert_eq!(genomes[0].variants, vec![1, 1, 0, 0]);
        assert_eq!(genomes[1].variants, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_filters_idempotent() {
        let mut once = vec![
            genome("g1", vec![1, 1, 3, 1, 1, 0, 2, 2]),
            genome("g2", vec![2, 1, 1, 1, 0, 0, 1, 1]),
        ];
        apply_filters(&mut once, Some(2), Some(3), 0.6);
        let mut twice = once.clone();
        apply_filters(&mut twice, Some(2), Some(3), 0.6);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_uneven_vector_lengths() {
        let mut genomes = vec![genome("g1", vec![1, 1]), genome("g2", vec![1, 1, 9, 1])];
        apply_filters(&mut genomes, Some(5), None, 1.0);
        assert_eq!(genomes[0].variants, vec![1, 1]);
        assert_eq!(genomes[1].variants, vec![1, 1, 0, 0]);
    }
}
