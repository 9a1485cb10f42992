//! Export a library stream as a dense numpy matrix: one row per genome, one
//! column per (tag, haplotype) slot, 16-bit little-endian variant ids.

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use tracing::info;

use crate::cli::ExportNumpyArgs;
use crate::io::{open_input, open_output};

pub fn run(args: &ExportNumpyArgs) -> Result<()> {
    let genomes = crate::library::read_compact_genomes(open_input(&args.input)?)
        .with_context(|| format!("{}: read failed", args.input))?;

    let rows = genomes.len();
    let cols = genomes.iter().map(|g| g.variants.len()).max().unwrap_or(0);
    info!("exporting {} genomes x {} columns", rows, cols);

    let mut data = vec![0u16; rows * cols];
    for (row, genome) in genomes.iter().enumerate() {
        data[row * cols..row * cols + genome.variants.len()].copy_from_slice(&genome.variants);
    }

    let mut writer = BufWriter::new(open_output(&args.output)?);
    write_npy_u16(&mut writer, &data, rows, cols)?;
    writer.flush().context("error flushing output")?;
    Ok(())
}

/// Write a numpy `.npy` v1.0 file: magic, version, a header dict padded so
/// the data starts on a 64-byte boundary, then C-order little-endian u16.
pub fn write_npy_u16<W: Write>(writer: &mut W, data: &[u16], rows: usize, cols: usize) -> Result<()> {
    let dict = format!(
        "{{'descr': '<u2', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    let mut header = dict.into_bytes();
    let unpadded = 6 + 2 + 2 + header.len() + 1;
    header.extend(std::iter::repeat(b' ').take((64 - unpadded % 64) % 64));
    header.push(b'\n');

    writer.write_all(b"\x93NUMPY")?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(&header)?;

    let mut bytes = Vec::with_capacity(data.len() * 2);
    for &value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    writer.write_all(&bytes).context("error writing matrix data")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal .npy reader for round-trip assertions.
    pub(crate) fn read_npy_u16(buf: &[u8]) -> (Vec<usize>, Vec<u16>) {
        assert_eq!(&buf[..6], b"\x93NUMPY");
        assert_eq!(&buf[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        let header = std::str::from_utf8(&buf[10..10 + header_len]).unwrap();
        assert!(header.contains("'descr': '<u2'"), "{header}");
        assert!(header.contains("'fortran_order': False"), "{header}");
        let shape_part = header.split("'shape': (").nth(1).unwrap();
        let shape: Vec<usize> = shape_part
            .split(')')
            .next()
            .unwrap()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        let data: Vec<u16> = buf[10 + header_len..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        (shape, data)
    }

    #[test]
    fn test_npy_header_and_data() {
        let mut buf = Vec::new();
        write_npy_u16(&mut buf, &[1, 2, 3, 4, 5, 6], 2, 3).unwrap();
        // data must start on a 64-byte boundary
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        let (shape, data) = read_npy_u16(&buf);
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_npy_empty_matrix() {
        let mut buf = Vec::new();
        write_npy_u16(&mut buf, &[], 0, 0).unwrap();
        let (shape, data) = read_npy_u16(&buf);
        assert_eq!(shape, vec![0, 0]);
        assert!(data.is_empty());
    }
}
