//! Bootstrap the runtime docker image carrying the external projector
//! toolchain (bcftools, samtools).

use anyhow::{bail, Context, Result};
use std::process::Command;

const DOCKERFILE: &str = "FROM debian:12
RUN apt-get update
RUN DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends bcftools samtools
";

pub fn build_runtime_image() -> Result<()> {
    let dir = tempfile::tempdir().context("error creating temp dir")?;
    std::fs::write(dir.path().join("Dockerfile"), DOCKERFILE)
        .context("error writing Dockerfile")?;
    let status = Command::new("docker")
        .arg("build")
        .arg("--tag=genotile-runtime")
        .arg(dir.path())
        .status()
        .context("docker build: spawn failed")?;
    if !status.success() {
        bail!("docker build exited with {status}");
    }
    Ok(())
}
