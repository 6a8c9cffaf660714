//! Journal format and writer
//!
//! The journal is a 7-bit ASCII text file. Its first five lines form the
//! header: a magic string, the journal format version, the application
//! version, the slot count, and a blank line. Every subsequent line is one
//! record:
//!
//! ```text
//! libcore.io.DiskLruCache
//! 1
//! 100
//! 1
//!
//! DIRTY 3400330d1dfc7f3f
//! CLEAN 3400330d1dfc7f3f 832
//! READ 3400330d1dfc7f3f
//! REMOVE 3400330d1dfc7f3f
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map, map_res};
use nom::multi::many1;
use nom::sequence::{pair, preceded};
use nom::IResult;

use crate::error::{Error, Result};

/// Journal file name within the cache directory
pub(crate) const JOURNAL_FILE: &str = "journal";

/// Staging file used while compacting the journal
pub(crate) const JOURNAL_FILE_TMP: &str = "journal.tmp";

/// Witness file making the compaction swap crash-safe
pub(crate) const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

/// Magic string on the first header line
pub(crate) const MAGIC: &str = "libcore.io.DiskLruCache";

/// Journal format version on the second header line
pub(crate) const VERSION: &str = "1";

/// One journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    /// An edit has begun
    Dirty { key: String },
    /// An edit committed; lengths give the current slot sizes
    Clean { key: String, lengths: Vec<u64> },
    /// The entry was evicted, removed, or its first edit aborted
    Remove { key: String },
    /// The entry was read, for LRU purposes
    Read { key: String },
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Dirty { key } => write!(f, "DIRTY {}", key),
            Record::Clean { key, lengths } => {
                write!(f, "CLEAN {}", key)?;
                for len in lengths {
                    write!(f, " {}", len)?;
                }
                Ok(())
            }
            Record::Remove { key } => write!(f, "REMOVE {}", key),
            Record::Read { key } => write!(f, "READ {}", key),
        }
    }
}

fn key_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
    })(input)
}

fn length_list(input: &str) -> IResult<&str, Vec<u64>> {
    many1(preceded(char(' '), map_res(digit1, str::parse::<u64>)))(input)
}

fn record(input: &str) -> IResult<&str, Record> {
    alt((
        map(
            preceded(tag("CLEAN "), pair(key_token, length_list)),
            |(key, lengths)| Record::Clean {
                key: key.to_string(),
                lengths,
            },
        ),
        map(preceded(tag("DIRTY "), key_token), |key: &str| {
            Record::Dirty {
                key: key.to_string(),
            }
        }),
        map(preceded(tag("REMOVE "), key_token), |key: &str| {
            Record::Remove {
                key: key.to_string(),
            }
        }),
        map(preceded(tag("READ "), key_token), |key: &str| Record::Read {
            key: key.to_string(),
        }),
    ))(input)
}

/// Parse a single journal line into a record
pub(crate) fn parse_record(line: &str) -> Result<Record> {
    all_consuming(record)(line)
        .map(|(_, record)| record)
        .map_err(|_| Error::Corrupt(format!("unexpected journal line: {:?}", line)))
}

/// Write the five-line journal header
pub(crate) fn write_header(
    out: &mut impl Write,
    app_version: u32,
    slot_count: usize,
) -> io::Result<()> {
    writeln!(out, "{}", MAGIC)?;
    writeln!(out, "{}", VERSION)?;
    writeln!(out, "{}", app_version)?;
    writeln!(out, "{}", slot_count)?;
    writeln!(out)
}

/// Append-only journal writer, flushed after every record
pub(crate) struct JournalWriter {
    out: BufWriter<File>,
}

impl JournalWriter {
    /// Open the journal for appending
    pub(crate) fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Append one record and flush it through to the filesystem
    pub(crate) fn append(&mut self, record: &Record) -> io::Result<()> {
        writeln!(self.out, "{}", record)?;
        self.out.flush()
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
