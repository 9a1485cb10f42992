use clap::Parser;

use genotile::cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import(args) => genotile::import::run(&args),
        Commands::Filter(args) => genotile::filter::run(&args),
        Commands::ExportNumpy(args) => genotile::export::run(&args),
        Commands::DiffFasta(args) => genotile::diff::run(&args),
        Commands::Ref2Genome(args) => genotile::ref2genome::run(&args),
        Commands::Vcf2Fasta(args) => genotile::vcf2fasta::run(&args),
        Commands::BuildDockerImage => genotile::docker::build_runtime_image(),
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
