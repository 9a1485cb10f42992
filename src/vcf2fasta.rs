//! Project phased VCF inputs through a reference into per-haplotype FASTA
//! files, via the external `bcftools consensus` projector. With `--mask`,
//! regions outside the gVCF's confident spans are masked to N: the
//! complement is computed in-process from the record spans and contig sizes
//! and staged to a temp BED file for bcftools.

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::cli::Vcf2FastaArgs;
use crate::import::list_input_files;
use crate::io::FileReader;

pub fn run(args: &Vcf2FastaArgs) -> Result<()> {
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("{}: create failed", args.output_dir.display()))?;
    let infiles: Vec<PathBuf> = list_input_files(&args.inputs)?
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(".vcf") || p.to_string_lossy().ends_with(".vcf.gz"))
        .collect();
    if infiles.is_empty() {
        bail!("no VCF input files found");
    }

    let jobs: Vec<(&PathBuf, u8)> = infiles
        .iter()
        .flat_map(|f| [(f, 1u8), (f, 2u8)])
        .collect();
    let next = AtomicUsize::new(0);
    let first_err: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..num_cpus::get() {
            scope.spawn(|| loop {
                if first_err.lock().unwrap().is_some() {
                    return;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                if idx >= jobs.len() {
                    return;
                }
                let (infile, phase) = jobs[idx];
                if let Err(err) = project(args, infile, phase) {
                    let mut guard = first_err.lock().unwrap();
                    if guard.is_none() {
                        *guard =
                            Some(err.context(format!("{} phase {}", infile.display(), phase)));
                    }
                }
            });
        }
    });

    match first_err.into_inner().unwrap() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Run one (input, phase) projection into `DIR/{basename}.{phase}.fasta.gz`.
fn project(args: &Vcf2FastaArgs, infile: &Path, phase: u8) -> Result<()> {
    let basename = infile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let outfile = args
        .output_dir
        .join(format!("{}.{}.fasta.gz", basename, phase));

    // staged mask BED must outlive the bcftools run
    let mask = if args.mask {
        Some(stage_mask_bed(infile, args.genome.as_deref())?)
    } else {
        None
    };

    let mut cmd = Command::new("bcftools");
    cmd.arg("consensus")
        .arg("--fasta-ref")
        .arg(&args.reference)
        .arg("-H")
        .arg(phase.to_string());
    if let Some((_, ref bed)) = mask {
        cmd.arg("--mask").arg(bed);
    }
    cmd.arg(infile).stdout(Stdio::piped()).stderr(Stdio::inherit());

    info!("running {:?}", cmd);
    let mut child = cmd.spawn().context("bcftools consensus: spawn failed")?;
    let mut stdout = child
        .stdout
        .take()
        .context("bcftools consensus: no stdout")?;

    let out = File::create(&outfile)
        .with_context(|| format!("{}: create failed", outfile.display()))?;
    let mut gz = GzEncoder::new(BufWriter::new(out), Compression::default());
    let copied = std::io::copy(&mut stdout, &mut gz);
    let status = child.wait().context("bcftools consensus: wait failed")?;
    copied.context("error writing projected fasta")?;
    if !status.success() {
        bail!("bcftools consensus exited with {status}");
    }
    let buffered = gz
        .finish()
        .with_context(|| format!("{}: close failed", outfile.display()))?;
    buffered
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("{}: flush failed", outfile.display()))?;
    info!("wrote {}", outfile.display());
    Ok(())
}

/// Per-contig confident spans (0-based half-open) in contig appearance
/// order, plus contig sizes scraped from the `##contig` headers.
struct ConfidentRegions {
    order: Vec<String>,
    sizes: HashMap<String, u64>,
    spans: HashMap<String, Vec<(u64, u64)>>,
}

/// Build the mask BED (complement of the confident regions) in a temp dir.
/// Returns the dir guard alongside the BED path; bcftools requires the
/// `.bed` extension to parse it as BED.
fn stage_mask_bed(infile: &Path, genome: Option<&Path>) -> Result<(tempfile::TempDir, PathBuf)> {
    let mut regions = confident_regions(FileReader::open(infile)?)
        .with_context(|| format!("{}: error scanning gvcf", infile.display()))?;
    if let Some(genome) = genome {
        // contig sizes missing from the VCF header can come from ref2genome
        // output
        for line in std::io::BufReader::new(
            File::open(genome).with_context(|| format!("{}: open failed", genome.display()))?,
        )
        .lines()
        {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (Some(chr), Some(size)) = (fields.next(), fields.next()) else {
                bail!("{}: malformed genome file line {:?}", genome.display(), line);
            };
            let size: u64 = size
                .parse()
                .with_context(|| format!("{}: malformed size in line {:?}", genome.display(), line))?;
            regions.sizes.entry(chr.to_string()).or_insert(size);
        }
    }

    let dir = tempfile::tempdir().context("error creating temp dir for mask")?;
    let bed_path = dir.path().join("mask.bed");
    let mut bed = BufWriter::new(File::create(&bed_path)?);
    for chrom in &regions.order {
        let Some(&size) = regions.sizes.get(chrom) else {
            bail!("{}: no length for contig {:?} (supply --genome)", infile.display(), chrom);
        };
        let empty = Vec::new();
        let spans = regions.spans.get(chrom).unwrap_or(&empty);
        let mut cursor = 0u64;
        for &(start, end) in spans {
            if start > cursor {
                writeln!(bed, "{}\t{}\t{}", chrom, cursor, start)?;
            }
            cursor = cursor.max(end);
        }
        if cursor < size {
            writeln!(bed, "{}\t{}\t{}", chrom, cursor, size)?;
        }
    }
    bed.flush()?;
    Ok((dir, bed_path))
}

fn confident_regions(reader: impl BufRead) -> Result<ConfidentRegions> {
    let mut regions = ConfidentRegions {
        order: Vec::new(),
        sizes: HashMap::new(),
        spans: HashMap::new(),
    };
    for line in reader.lines() {
        let line = line?;
        if let Some(contig) = line.strip_prefix("##contig=<") {
            let contig = contig.trim_end_matches('>');
            let mut id = None;
            let mut length = None;
            for field in contig.split(',') {
                match field.split_once('=') {
                    Some(("ID", v)) => id = Some(v.to_string()),
                    Some(("length", v)) => length = v.parse::<u64>().ok(),
                    _ => {}
                }
            }
            if let (Some(id), Some(length)) = (id, length) {
                regions.sizes.insert(id, length);
            }
            continue;
        }
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(chrom), Some(pos), _id, Some(reference)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let pos: u64 = pos.parse().with_context(|| format!("malformed POS in {line:?}"))?;
        let info = fields.nth(3).unwrap_or("");
        let end = info
            .split(';')
            .find_map(|kv| kv.strip_prefix("END="))
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(pos + reference.len() as u64 - 1);
        let span = (pos - 1, end);
        if !regions.spans.contains_key(chrom) {
            regions.order.push(chrom.to_string());
        }
        let spans = regions.spans.entry(chrom.to_string()).or_default();
        match spans.last_mut() {
            // gVCF records are sorted; merge touching spans
            Some(last) if span.0 <= last.1 => last.1 = last.1.max(span.1),
            _ => spans.push(span),
        }
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GVCF: &str = "\
##fileformat=VCFv4.2
##contig=<ID=chr1,length=100>
##contig=<ID=chr2,length=50>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
chr1\t1\t.\tA\t<NON_REF>\t.\t.\tEND=20
chr1\t15\t.\tG\tC\t30\tPASS\t.
chr1\t40\t.\tA\t<NON_REF>\t.\t.\tEND=60
chr2\t10\t.\tTTT\t<NON_REF>\t.\t.\t.
";

    #[test]
    fn test_confident_regions_merge_and_sizes() {
        let regions = confident_regions(Cursor::new(GVCF.as_bytes())).unwrap();
        assert_eq!(regions.order, vec!["chr1", "chr2"]);
        assert_eq!(regions.sizes["chr1"], 100);
        assert_eq!(regions.spans["chr1"], vec![(0, 20), (39, 60)]);
        assert_eq!(regions.spans["chr2"], vec![(9, 12)]);
    }

    #[test]
    fn test_mask_bed_is_complement() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("g.vcf");
        std::fs::write(&vcf, GVCF).unwrap();
        let (_guard, bed) = stage_mask_bed(&vcf, None).unwrap();
        let bed = std::fs::read_to_string(bed).unwrap();
        assert_eq!(
            bed,
            "chr1\t20\t39\nchr1\t60\t100\nchr2\t0\t9\nchr2\t12\t50\n"
        );
    }

    #[test]
    fn test_mask_bed_needs_contig_length() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("g.vcf");
        std::fs::write(&vcf, "chrX\t5\t.\tA\t<NON_REF>\t.\t.\tEND=9\n").unwrap();
        let err = stage_mask_bed(&vcf, None).unwrap_err();
        assert!(err.to_string().contains("chrX"), "{err}");

        let genome = dir.path().join("ref.genome");
        std::fs::write(&genome, "chrX\t30\n").unwrap();
        let (_guard, bed) = stage_mask_bed(&vcf, Some(&genome)).unwrap();
        let bed = std::fs::read_to_string(bed).unwrap();
        assert_eq!(bed, "chrX\t0\t4\nchrX\t9\t30\n");
    }
}
