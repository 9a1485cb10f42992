//! The diff-fasta subcommand: per-haplotype comparison of two FASTA files,
//! one TSV line per HGVS variant.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;

use crate::cli::DiffFastaArgs;
use crate::hgvs;
use crate::io::{FastaReader, FileReader};

pub fn run(args: &DiffFastaArgs) -> Result<()> {
    let (label, a) = read_sequence(&args.a, args.sequence.as_deref())?;
    let (_, b) = read_sequence(&args.b, args.sequence.as_deref())?;

    let (variants, timed_out) = hgvs::diff(&a, &b, args.timeout);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for v in &variants {
        let shifted = hgvs::Variant {
            position: (v.position as i64 + args.offset) as usize,
            reference: v.reference.clone(),
            alternate: v.alternate.clone(),
        };
        writeln!(
            out,
            "{}:g.{}\t{}\t{}\t{}\t{}\t{}",
            label, shifted, label, shifted.position, shifted.reference, shifted.alternate, timed_out
        )?;
    }
    Ok(())
}

/// Read one record from a FASTA file, uppercased: the record whose label
/// matches `want` (first whitespace-delimited token), or the first
/// non-empty record.
fn read_sequence(path: &Path, want: Option<&str>) -> Result<(String, String)> {
    let mut reader = FastaReader::new(FileReader::open(path)?);
    while let Some((label, mut seq)) = reader
        .next_record()
        .with_context(|| format!("{}: read failed", path.display()))?
    {
        let name = label.split_whitespace().next().unwrap_or("").to_string();
        let matched = match want {
            Some(want) => name == want,
            None => !seq.is_empty(),
        };
        if matched {
            seq.make_ascii_uppercase();
            let seq = String::from_utf8(seq)
                .with_context(|| format!("{}: non-ascii sequence data", path.display()))?;
            return Ok((name, seq));
        }
    }
    match want {
        Some(want) => bail!("{}: sequence {:?} not found", path.display(), want),
        None => bail!("{}: no sequence data", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fasta(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_read_first_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(&dir, "a.fa", ">chr1 hg38\nacgt\nacgt\n>chr2\nTTTT\n");
        let (label, seq) = read_sequence(&path, None).unwrap();
        assert_eq!(label, "chr1");
        assert_eq!(seq, "ACGTACGT");
    }

    #[test]
    fn test_read_labelled_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(&dir, "a.fa", ">chr1\nacgt\n>chr2\nttcc\n");
        let (label, seq) = read_sequence(&path, Some("chr2")).unwrap();
        assert_eq!(label, "chr2");
        assert_eq!(seq, "TTCC");
        assert!(read_sequence(&path, Some("chrX")).is_err());
    }
}
