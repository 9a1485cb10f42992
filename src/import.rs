//! The import orchestrator: discovers input genomes, fans per-haplotype
//! tiling tasks out over a worker pool, joins the two haplotypes of each
//! genome into one compact vector, and streams library entries to the sink.
//!
//! Entries appear on the stream in completion order, not input order. The
//! first task error aborts the run: workers check a write-once error slot
//! before picking up new work, and the error is returned after all workers
//! have drained.

use anyhow::{bail, Context, Result};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

use crate::cli::ImportArgs;
use crate::io::{open_output, FileReader};
use crate::library::{write_entry, CompactGenome, LibraryEntry};
use crate::tags::TagLibrary;
use crate::tiles::{self, TileLibrary, VariantId};

pub fn run(args: &ImportArgs) -> Result<()> {
    if !args.local {
        bail!("container mode is handled by the batch wrapper; pass --local to run on this host");
    }

    let infiles = list_input_files(&args.inputs)?;
    if infiles.is_empty() {
        bail!("no input files found");
    }
    if args.reference.is_none() && infiles.iter().any(|f| is_vcf(f)) {
        bail!("cannot import vcf: reference data (--ref) not specified");
    }

    info!("tag library {} load starting", args.tag_library.display());
    let taglib = TagLibrary::load(FileReader::open(&args.tag_library)?)
        .with_context(|| format!("{}: invalid tag library", args.tag_library.display()))?;
    if taglib.is_empty() {
        bail!("cannot tile: tag library is empty");
    }
    info!("tag library {} load done", args.tag_library.display());

    let tag_set = taglib.tag_sequences();
    let tilelib = TileLibrary::new(taglib, args.skip_ooo);

    let mut writer = BufWriter::new(open_output(&args.output)?);
    write_entry(
        &mut writer,
        &LibraryEntry {
            tag_set,
            ..Default::default()
        },
    )?;

    let sink = Mutex::new(writer);
    tile_inputs(&tilelib, &infiles, args.reference.as_deref(), &sink)?;

    let mut writer = match sink.into_inner() {
        Ok(writer) => writer,
        Err(poisoned) => poisoned.into_inner(),
    };
    writer.flush().context("error flushing output")?;
    Ok(())
}

/// One haplotype's FASTA byte source.
enum Source {
    Fasta(PathBuf),
    Vcf { path: PathBuf, phase: u8 },
}

struct Genome {
    name: String,
    sources: [Source; 2],
    slots: Mutex<[Option<Vec<VariantId>>; 2]>,
    pending: AtomicUsize,
}

fn tile_inputs(
    tilelib: &TileLibrary,
    infiles: &[PathBuf],
    reference: Option<&Path>,
    sink: &Mutex<BufWriter<Box<dyn Write + Send>>>,
) -> Result<()> {
    let genomes: Vec<Genome> = infiles
        .iter()
        .map(|infile| {
            let sources = if is_fasta1(infile) {
                [
                    Source::Fasta(infile.clone()),
                    Source::Fasta(hap2_path(infile)),
                ]
            } else {
                [
                    Source::Vcf {
                        path: infile.clone(),
                        phase: 1,
                    },
                    Source::Vcf {
                        path: infile.clone(),
                        phase: 2,
                    },
                ]
            };
            Genome {
                name: infile.display().to_string(),
                sources,
                slots: Mutex::new([None, None]),
                pending: AtomicUsize::new(2),
            }
        })
        .collect();

    let jobs: Vec<(usize, usize)> = (0..genomes.len())
        .flat_map(|g| [(g, 0), (g, 1)])
        .collect();
    let total = jobs.len();
    let next = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);
    let first_err: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let start = Instant::now();

    let workers = num_cpus::get() * 9 / 8 + 1;
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if first_err.lock().unwrap().is_some() {
                    return;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                if idx >= total {
                    return;
                }
                let (gi, hap) = jobs[idx];
                let genome = &genomes[gi];
                match tile_source(tilelib, &genome.sources[hap], reference) {
                    Ok(variants) => {
                        genome.slots.lock().unwrap()[hap] = Some(variants);
                        if genome.pending.fetch_sub(1, Ordering::SeqCst) == 1
                            && first_err.lock().unwrap().is_none()
                        {
                            if let Err(err) = encode_genome(genome, sink) {
                                store_error(&first_err, err);
                            }
                        }
                    }
                    Err(err) => store_error(&first_err, err),
                }
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                let ttl = start.elapsed().mul_f64((total - done) as f64 / done as f64);
                info!("progress {}/{}, eta {:.0?}", done, total, ttl);
            });
        }
    });

    match first_err.into_inner().unwrap() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Both haplotypes are in: interleave them and write one library entry.
fn encode_genome(
    genome: &Genome,
    sink: &Mutex<BufWriter<Box<dyn Write + Send>>>,
) -> Result<()> {
    let slots = genome.slots.lock().unwrap();
    let empty = Vec::new();
    let v0 = slots[0].as_ref().unwrap_or(&empty);
    let v1 = slots[1].as_ref().unwrap_or(&empty);
    let entry = LibraryEntry {
        compact_genomes: vec![CompactGenome {
            name: genome.name.clone(),
            variants: flatten(v0, v1),
        }],
        ..Default::default()
    };
    let mut writer = sink.lock().unwrap();
    write_entry(&mut *writer, &entry)
}

/// Interleave two per-haplotype variant vectors into `flat[2t + h]`,
/// zero-padding the shorter one.
fn flatten(v0: &[VariantId], v1: &[VariantId]) -> Vec<VariantId> {
    let ntags = v0.len().max(v1.len());
    let mut flat = vec![0; ntags * 2];
    for (hap, variants) in [v0, v1].into_iter().enumerate() {
        for (tag, &variant) in variants.iter().enumerate() {
            flat[tag * 2 + hap] = variant;
        }
    }
    flat
}

fn tile_source(
    tilelib: &TileLibrary,
    source: &Source,
    reference: Option<&Path>,
) -> Result<Vec<VariantId>> {
    match source {
        Source::Fasta(path) => {
            let label = path.display().to_string();
            info!("{} starting", label);
            let tseq = tilelib.tile_fasta(&label, FileReader::open(path)?)?;
            info!("{} done", label);
            Ok(tiles::variants(&tseq))
        }
        Source::Vcf { path, phase } => {
            let reference =
                reference.context("cannot import vcf: reference data (--ref) not specified")?;
            let label = format!("{} phase {}", path.display(), phase);
            info!("{} starting", label);
            let mut child = Command::new("bcftools")
                .arg("consensus")
                .arg("--fasta-ref")
                .arg(reference)
                .arg("-H")
                .arg(phase.to_string())
                .arg(path)
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .with_context(|| format!("{label}: bcftools consensus: spawn failed"))?;
            let stdout = child
                .stdout
                .take()
                .with_context(|| format!("{label}: bcftools consensus: no stdout"))?;
            match tilelib.tile_fasta(&label, BufReader::new(stdout)) {
                Ok(tseq) => {
                    let status = child
                        .wait()
                        .with_context(|| format!("{label}: bcftools consensus: wait failed"))?;
                    if !status.success() {
                        bail!("{label}: bcftools consensus exited with {status}");
                    }
                    info!("{} done", label);
                    Ok(tiles::variants(&tseq))
                }
                Err(err) => {
                    // don't leave the projector running after a tiling failure
                    child.kill().ok();
                    child.wait().ok();
                    Err(err)
                }
            }
        }
    }
}

fn store_error(slot: &Mutex<Option<anyhow::Error>>, err: anyhow::Error) {
    let mut guard = slot.lock().unwrap();
    if guard.is_none() {
        *guard = Some(err);
    }
}

/// Expand the command-line inputs into a list of genome files: explicit
/// files are taken as-is (`.2.fasta` siblings are implied by their `.1`
/// mate), directories contribute their VCF and haplotype-1 FASTA members in
/// sorted order. VCF inputs missing a `.tbi`/`.csi` index are rejected
/// upfront.
pub fn list_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("{}: stat failed", path.display()))?;
        if !meta.is_dir() {
            if !has_suffix(path, ".2.fasta") && !has_suffix(path, ".2.fasta.gz") {
                files.push(path.clone());
            }
            continue;
        }
        let mut names: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("{}: readdir failed", path.display()))?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<_>>()?;
        names.sort();
        for name in names {
            if is_vcf(&name) || is_fasta1(&name) {
                files.push(name);
            }
        }
    }
    for file in &files {
        if is_vcf(file) {
            let csi = with_extra_suffix(file, ".csi");
            let tbi = with_extra_suffix(file, ".tbi");
            if !csi.exists() && !tbi.exists() {
                bail!(
                    "{}: cannot read without .tbi or .csi index file",
                    file.display()
                );
            }
        }
    }
    Ok(files)
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.to_string_lossy().ends_with(suffix)
}

fn is_vcf(path: &Path) -> bool {
    has_suffix(path, ".vcf") || has_suffix(path, ".vcf.gz")
}

fn is_fasta1(path: &Path) -> bool {
    has_suffix(path, ".1.fasta") || has_suffix(path, ".1.fasta.gz")
}

fn with_extra_suffix(path: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", path.display(), suffix))
}

/// Haplotype 2 sibling of a `.1.fasta(.gz)` path.
fn hap2_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(stem) = s.strip_suffix(".1.fasta") {
        PathBuf::from(format!("{stem}.2.fasta"))
    } else if let Some(stem) = s.strip_suffix(".1.fasta.gz") {
        PathBuf::from(format!("{stem}.2.fasta.gz"))
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hap2_path() {
        assert_eq!(
            hap2_path(Path::new("/data/s1.1.fasta")),
            PathBuf::from("/data/s1.2.fasta")
        );
        assert_eq!(
            hap2_path(Path::new("/data/s1.1.fasta.gz")),
            PathBuf::from("/data/s1.2.fasta.gz")
        );
    }

    #[test]
    fn test_flatten_pads_shorter_haplotype() {
        assert_eq!(
            flatten(&[1, 0, 2], &[3]),
            vec![1, 3, 0, 0, 2, 0]
        );
        assert_eq!(flatten(&[], &[]), Vec::<VariantId>::new());
    }

    #[test]
    fn test_list_input_files_dir_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let touch = |name: &str| std::fs::write(dir.path().join(name), b"").unwrap();
        touch("b.vcf.gz");
        touch("b.vcf.gz.tbi");
        touch("a.1.fasta");
        touch("a.2.fasta");
        touch("notes.txt");

        let files = list_input_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.1.fasta"), dir.path().join("b.vcf.gz")]
        );
    }

    #[test]
    fn test_list_input_files_requires_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.vcf"), b"").unwrap();
        let err = list_input_files(&[dir.path().join("c.vcf")]).unwrap_err();
        assert!(err.to_string().contains(".tbi or .csi"), "{err}");
    }

    #[test]
    fn test_list_input_files_skips_explicit_hap2() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.1.fasta"), b"").unwrap();
        std::fs::write(dir.path().join("a.2.fasta"), b"").unwrap();
        let files = list_input_files(&[
            dir.path().join("a.1.fasta"),
            dir.path().join("a.2.fasta"),
        ])
        .unwrap();
        assert_eq!(files, vec![dir.path().join("a.1.fasta")]);
    }
}
