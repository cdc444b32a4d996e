//! FASTA access on top of `noodles`.
//!
//! Records are streamed one at a time. Read ids and sequences are exposed
//! as text since sample names and k-mers are keyed by `String`.

use crate::{Error, Result};
use noodles::fasta;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

pub use noodles::fasta::Record as FastaRecord;

/// Read id of a record: the header text after `>`, up to the first whitespace
pub fn record_id(record: &FastaRecord) -> Cow<'_, str> {
    let name: &[u8] = record.name().as_ref();
    String::from_utf8_lossy(name)
}

/// Sequence of a record as text
pub fn record_sequence(record: &FastaRecord) -> Cow<'_, str> {
    let seq: &[u8] = record.sequence().as_ref();
    String::from_utf8_lossy(seq)
}

/// Streaming reader over one FASTA file
pub struct FastaReader {
    inner: fasta::io::Reader<BufReader<File>>,
    path: PathBuf,
    done: bool,
}

impl FastaReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self {
            inner: fasta::io::Reader::new(BufReader::new(file)),
            path: path.to_path_buf(),
            done: false,
        })
    }

    fn malformed(&self, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Error::MalformedInput(format!("{:?}: {}", self.path, err))
            }
            _ => Error::Io(err),
        }
    }
}

impl Iterator for FastaReader {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.records().next() {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(self.malformed(e)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// FASTA writer over any sink
pub struct FastaWriter<W: Write> {
    inner: fasta::io::Writer<W>,
}

impl<W: Write> FastaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: fasta::io::Writer::new(inner),
        }
    }

    pub fn write(&mut self, record: &FastaRecord) -> Result<()> {
        self.inner.write_record(record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.get_mut().flush()?;
        Ok(())
    }
}
