use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "genotile")]
#[command(version)]
#[command(about = "Tile-based encoding of phased diploid genomes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tile input genomes and write a library stream
    Import(ImportArgs),
    /// Prune tile variants from a library stream
    Filter(FilterArgs),
    /// Export a library stream as a dense numpy u16 matrix
    #[command(name = "export-numpy")]
    ExportNumpy(ExportNumpyArgs),
    /// Report HGVS-style differences between two FASTA sequences
    #[command(name = "diff-fasta")]
    DiffFasta(DiffFastaArgs),
    /// Print contig names and lengths of a reference FASTA
    #[command(name = "ref2genome")]
    Ref2Genome(Ref2GenomeArgs),
    /// Project VCF inputs through a reference into phased FASTA files
    #[command(name = "vcf2fasta")]
    Vcf2Fasta(Vcf2FastaArgs),
    /// Build the runtime docker image (bcftools + samtools)
    #[command(name = "build-docker-image")]
    BuildDockerImage,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Tag library FASTA file (may be gzipped)
    #[arg(long = "tag-library", value_name = "FILE", required = true)]
    pub tag_library: PathBuf,

    /// Reference FASTA file (required for VCF inputs)
    #[arg(long = "ref", value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Output library stream ("-" for stdout)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: String,

    /// Skip tag matches that appear out of order in a haplotype
    #[arg(long = "skip-ooo")]
    pub skip_ooo: bool,

    /// Run on the local host (container mode is handled by the batch wrapper)
    #[arg(long)]
    pub local: bool,

    /// Input files: *.1.fasta(.gz) haplotype pairs, indexed *.vcf(.gz), or
    /// directories of either
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Input library stream ("-" for stdin)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub input: String,

    /// Output library stream ("-" for stdout)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: String,

    /// Zero out tiles with a variant id above N
    #[arg(long = "max-variants", value_name = "N")]
    pub max_variants: Option<u16>,

    /// Truncate genome vectors to the first N tags
    #[arg(long = "max-tag", value_name = "N")]
    pub max_tag: Option<usize>,

    /// Zero out tags called in fewer than P * haplotypes (0 < P <= 1)
    #[arg(long = "min-coverage", value_name = "P", default_value = "1",
          value_parser = parse_coverage)]
    pub min_coverage: f64,
}

#[derive(Args, Debug, Clone)]
pub struct ExportNumpyArgs {
    /// Input library stream ("-" for stdin)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub input: String,

    /// Output .npy file ("-" for stdout)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: String,
}

#[derive(Args, Debug, Clone)]
pub struct DiffFastaArgs {
    /// Add N to every reported position
    #[arg(long, value_name = "N", default_value = "0", allow_hyphen_values = true)]
    pub offset: i64,

    /// Compare the record with this label (default: first record)
    #[arg(long, value_name = "LABEL")]
    pub sequence: Option<String>,

    /// Give up after this long and report the partial diff
    /// (examples: "1s", "500ms")
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// FASTA file A
    #[arg(value_name = "A.fa")]
    pub a: PathBuf,

    /// FASTA file B
    #[arg(value_name = "B.fa")]
    pub b: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct Ref2GenomeArgs {
    /// Reference FASTA file (may be gzipped)
    #[arg(long = "ref", value_name = "FILE", required = true)]
    pub reference: PathBuf,

    /// Output file ("-" for stdout)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: String,
}

#[derive(Args, Debug, Clone)]
pub struct Vcf2FastaArgs {
    /// Reference FASTA file
    #[arg(long = "ref", value_name = "FILE", required = true)]
    pub reference: PathBuf,

    /// Contig sizes (two-column "contig<TAB>length") supplementing the VCF
    /// headers when masking
    #[arg(long, value_name = "FILE")]
    pub genome: Option<PathBuf>,

    /// Mask uncalled regions with N (default: output hom ref)
    #[arg(long)]
    pub mask: bool,

    /// Directory for the projected *.fasta.gz files
    #[arg(long = "output-dir", value_name = "DIR", required = true)]
    pub output_dir: PathBuf,

    /// Input VCF files or directories
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,
}

fn parse_coverage(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|_| format!("invalid coverage {s:?}"))?;
    if p > 0.0 && p <= 1.0 {
        Ok(p)
    } else {
        Err(format!("coverage must satisfy 0 < P <= 1, got {p}"))
    }
}

/// Parse durations of the form "300ms", "1.5s", or "2m" (bare numbers are
/// seconds).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let (value, scale) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1e-3)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60.0)
    } else {
        (s, 1.0)
    };
    let value: f64 = value.parse().map_err(|_| format!("invalid duration {s:?}"))?;
    if value < 0.0 {
        return Err(format!("duration must not be negative: {s:?}"));
    }
    Ok(Duration::from_secs_f64(value * scale))
}
