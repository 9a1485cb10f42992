//! Emit the contig table of a reference FASTA: `contig<TAB>length`, one
//! line per record, streamed without buffering sequence data.

use anyhow::{Context, Result};
use std::io::{BufRead, BufWriter, Write};

use crate::cli::Ref2GenomeArgs;
use crate::io::{open_output, FileReader};

pub fn run(args: &Ref2GenomeArgs) -> Result<()> {
    let reader = FileReader::open(&args.reference)?;
    let mut writer = BufWriter::new(open_output(&args.output)?);
    write_contig_table(reader, &mut writer)?;
    writer.flush().context("error flushing output")?;
    Ok(())
}

fn write_contig_table(reader: impl BufRead, writer: &mut impl Write) -> Result<()> {
    let mut label = String::new();
    let mut seqlen = 0usize;
    let mut line = String::new();
    let mut reader = reader;
    loop {
        line.clear();
        let n = reader.read_line(&mut line).context("error reading reference")?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('>') {
            if !label.is_empty() {
                writeln!(writer, "{}\t{}", label, seqlen)?;
            }
            label = header.trim().to_string();
            seqlen = 0;
        } else {
            seqlen += trimmed.len();
        }
    }
    if !label.is_empty() {
        writeln!(writer, "{}\t{}", label, seqlen)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_contig_table() {
        let fasta = ">chr1 assembled\nacgtacgt\nacgt\n>chr2\ntt\n";
        let mut out = Vec::new();
        write_contig_table(Cursor::new(fasta.as_bytes()), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr1 assembled\t12\nchr2\t2\n"
        );
    }

    #[test]
    fn test_contig_table_empty_input() {
        let mut out = Vec::new();
        write_contig_table(Cursor::new(b"".as_slice()), &mut out).unwrap();
        assert!(out.is_empty());
    }
}
