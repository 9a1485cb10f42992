//! Byte-stream plumbing shared by the subcommands: transparent gzip input,
//! streaming FASTA records, and `-`-style stdin/stdout selection.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

/// Reader over a plain or gzipped file, detected by the gzip magic bytes.
pub enum FileReader {
    Plain(BufReader<File>),
    Gzipped(BufReader<GzDecoder<BufReader<File>>>),
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("{}: open failed", path.display()))?;
        let mut buffered = BufReader::new(file);
        let is_gzipped = {
            let peek = buffered.fill_buf()?;
            peek.len() >= 2 && peek[0] == 0x1f && peek[1] == 0x8b
        };
        Ok(if is_gzipped {
            FileReader::Gzipped(BufReader::new(GzDecoder::new(buffered)))
        } else {
            FileReader::Plain(buffered)
        })
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            FileReader::Plain(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

impl BufRead for FileReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        match self {
            FileReader::Plain(r) => r.fill_buf(),
            FileReader::Gzipped(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            FileReader::Plain(r) => r.consume(amt),
            FileReader::Gzipped(r) => r.consume(amt),
        }
    }
}

/// Streaming FASTA reader: yields one `(label, sequence)` pair per record,
/// with the sequence lines concatenated. Data before the first header is
/// returned under an empty label.
pub struct FastaReader<R> {
    reader: R,
    line: String,
    label: Option<String>,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::with_capacity(256),
            label: None,
            done: false,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }
        let mut seq = Vec::new();
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .context("error reading FASTA stream")?;
            if n == 0 {
                self.done = true;
                return Ok(match self.label.take() {
                    Some(label) => Some((label, seq)),
                    None if !seq.is_empty() => Some((String::new(), seq)),
                    None => None,
                });
            }
            let line = self.line.trim_end();
            if let Some(header) = line.strip_prefix('>') {
                let header = header.trim().to_string();
                match self.label.replace(header) {
                    Some(label) => return Ok(Some((label, seq))),
                    None if !seq.is_empty() => return Ok(Some((String::new(), seq))),
                    None => continue,
                }
            } else {
                seq.extend_from_slice(line.as_bytes());
            }
        }
    }
}

/// Open `path` for reading, treating `-` as stdin. Regular files get gzip
/// auto-detection.
pub fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    Ok(if path == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        Box::new(FileReader::open(path)?)
    })
}

/// Open `path` for writing, treating `-` as stdout.
pub fn open_output(path: &str) -> Result<Box<dyn Write + Send>> {
    Ok(if path == "-" {
        Box::new(std::io::stdout())
    } else {
        Box::new(File::create(path).with_context(|| format!("{path}: create failed"))?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(data: &str) -> Vec<(String, Vec<u8>)> {
        let mut reader = FastaReader::new(Cursor::new(data.as_bytes()));
        let mut out = Vec::new();
        while let Some(rec) = reader.next_record().unwrap() {
            out.push(rec);
        }
        out
    }

    #[test]
    fn test_fasta_records() {
        let recs = records(">chr1\nacgt\nACGT\n>chr2 extra\nttt\n");
        assert_eq!(
            recs,
            vec![
                ("chr1".to_string(), b"acgtACGT".to_vec()),
                ("chr2 extra".to_string(), b"ttt".to_vec()),
            ]
        );
    }

    #[test]
    fn test_fasta_empty_record_between_headers() {
        let recs = records(">a\n>b\nacgt\n");
        assert_eq!(
            recs,
            vec![
                ("a".to_string(), Vec::new()),
                ("b".to_string(), b"acgt".to_vec()),
            ]
        );
    }

    #[test]
    fn test_fasta_data_before_header() {
        let recs = records("acgt\n>a\ncc\n");
        assert_eq!(
            recs,
            vec![
                (String::new(), b"acgt".to_vec()),
                ("a".to_string(), b"cc".to_vec()),
            ]
        );
    }

    #[test]
    fn test_fasta_empty_input() {
        assert!(records("").is_empty());
    }

    #[test]
    fn test_gzip_magic_detection() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.fasta.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b">x\nacgt\n").unwrap();
        enc.finish().unwrap();

        let recs = {
            let mut reader = FastaReader::new(FileReader::open(&path).unwrap());
            let mut out = Vec::new();
            while let Some(rec) = reader.next_record().unwrap() {
                out.push(rec);
            }
            out
        };
        assert_eq!(recs, vec![("x".to_string(), b"acgt".to_vec())]);
    }
}
