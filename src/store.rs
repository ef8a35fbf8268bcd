//! Persistence of feature tables and weight vectors
//!
//! A feature table file holds a fixed little-endian header followed by two
//! CQDB databases: encoded feature keys mapped to their indices, and the tag
//! vocabulary. Weights live in a separate file so training checkpoints can
//! rewrite them without touching the table.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bstr::ByteSlice;
use cqdb::{CQDBWriter, CQDB};
use log::info;
use rand::Rng;
use tempfile::NamedTempFile;

use crate::catalog::FeatureCatalog;
use crate::corpus::TagSet;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::train::random_weights;

const CATALOG_MAGIC: &[u8; 4] = b"MEMF";
const WEIGHTS_MAGIC: &[u8; 4] = b"MEMW";
const VERSION: u32 = 1;
const CATALOG_HEADER_SIZE: usize = 32;
const WEIGHTS_HEADER_SIZE: usize = 16;

#[inline]
fn unpack_u32(buf: &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(Error::store("not enough data for unpacking u32"));
    }
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

#[inline]
fn unpack_u64(buf: &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(Error::store("not enough data for unpacking u64"));
    }
    Ok(u64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]))
}

#[inline]
fn unpack_f64(buf: &[u8]) -> Result<f64> {
    unpack_u64(buf).map(f64::from_bits)
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::store(format!("{} exceeds u32::MAX", what)))
}

/// Encode a key as four length-prefixed groups: words, tags, lookahead and
/// the threshold
///
/// Each group is `count;` followed by `len:item` for every item.
pub fn encode_key(key: &Key) -> String {
    let mut out = String::new();
    for group in [key.words(), key.tags(), key.lookahead()] {
        out.push_str(&group.len().to_string());
        out.push(';');
        for item in group {
            out.push_str(&item.len().to_string());
            out.push(':');
            out.push_str(item);
        }
    }
    out.push_str(&key.threshold().to_string());
    out
}

struct KeyReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> KeyReader<'a> {
    fn number(&mut self, terminator: Option<char>) -> Result<usize> {
        let rest = &self.text[self.pos..];
        let end = match terminator {
            Some(t) => rest
                .find(t)
                .ok_or_else(|| Error::store(format!("malformed feature key {:?}", self.text)))?,
            None => rest.len(),
        };
        let value = rest[..end]
            .parse()
            .map_err(|_| Error::store(format!("malformed feature key {:?}", self.text)))?;
        self.pos += end + terminator.map_or(0, char::len_utf8);
        Ok(value)
    }

    fn group(&mut self) -> Result<Vec<String>> {
        let count = self.number(Some(';'))?;
        let mut items = Vec::new();
        for _ in 0..count {
            let len = self.number(Some(':'))?;
            let item = self
                .pos
                .checked_add(len)
                .and_then(|end| self.text.get(self.pos..end))
                .ok_or_else(|| Error::store(format!("malformed feature key {:?}", self.text)))?;
            items.push(item.to_string());
            self.pos += len;
        }
        Ok(items)
    }
}

/// Inverse of [`encode_key`]
pub fn decode_key(text: &str) -> Result<Key> {
    let mut reader = KeyReader { text, pos: 0 };
    let words = reader.group()?;
    let tags = reader.group()?;
    let lookahead = reader.group()?;
    let threshold = reader.number(None)?;
    let threshold = u32::try_from(threshold)
        .map_err(|_| Error::store(format!("threshold out of range in {:?}", text)))?;
    Ok(Key::with_lookahead(words, tags, lookahead, threshold))
}

/// Write a CQDB database of `(string, id)` records
fn write_cqdb<'s, I>(file: &mut File, records: I) -> Result<()>
where
    I: IntoIterator<Item = (&'s str, usize)>,
{
    let mut writer = CQDBWriter::new(file)?;
    for (s, id) in records {
        if s.contains('\0') {
            return Err(Error::store(format!("{:?} contains a NUL byte", s)));
        }
        writer.put(s, to_u32(id, "identifier")?)?;
    }
    // CQDBWriter writes the database on drop.
    Ok(())
}

/// Save the feature catalog and the tag vocabulary
pub fn write_catalog<P: AsRef<Path>>(
    path: P,
    catalog: &FeatureCatalog,
    tags: &TagSet,
) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;

    let pos_to_u32 = |pos: u64| -> Result<u32> {
        u32::try_from(pos).map_err(|_| Error::store("file position exceeds u32::MAX"))
    };

    // Header placeholder
    file.write_all(&[0u8; CATALOG_HEADER_SIZE])?;

    let off_features = pos_to_u32(file.stream_position()?)?;
    let encoded: Vec<String> = catalog.iter().map(|(key, _)| encode_key(key)).collect();
    write_cqdb(
        &mut file,
        encoded.iter().enumerate().map(|(id, s)| (s.as_str(), id)),
    )?;

    let off_tags = pos_to_u32(file.stream_position()?)?;
    write_cqdb(
        &mut file,
        tags.tags().iter().enumerate().map(|(id, s)| (s.as_str(), id)),
    )?;

    // Update header with correct offsets
    file.seek(SeekFrom::Start(0))?;
    file.write_all(CATALOG_MAGIC)?;
    file.write_all(&(CATALOG_HEADER_SIZE as u32).to_le_bytes())?;
    file.write_all(&VERSION.to_le_bytes())?;
    file.write_all(&to_u32(catalog.window(), "window")?.to_le_bytes())?;
    file.write_all(&to_u32(catalog.len(), "number of features")?.to_le_bytes())?;
    file.write_all(&to_u32(tags.len(), "number of tags")?.to_le_bytes())?;
    file.write_all(&off_features.to_le_bytes())?;
    file.write_all(&off_tags.to_le_bytes())?;
    file.flush()?;

    info!(
        "wrote {} features and {} tags to {}",
        catalog.len(),
        tags.len(),
        path.display()
    );
    Ok(())
}

fn open_cqdb(buf: &[u8], offset: u32) -> Result<CQDB<'_>> {
    let offset = offset as usize;
    if offset < CATALOG_HEADER_SIZE || offset >= buf.len() {
        return Err(Error::store(format!("offset {:#X} out of range", offset)));
    }
    CQDB::new(&buf[offset..]).map_err(|e| Error::store(format!("invalid database: {}", e)))
}

/// Load a feature catalog and tag vocabulary saved with [`write_catalog`]
pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<(FeatureCatalog, TagSet)> {
    let buf = fs::read(path)?;
    if buf.len() < CATALOG_HEADER_SIZE {
        return Err(Error::store("feature table is truncated"));
    }
    if &buf[0..4] != CATALOG_MAGIC {
        return Err(Error::store("invalid file format, magic mismatch"));
    }
    let version = unpack_u32(&buf[8..])?;
    if version != VERSION {
        return Err(Error::store(format!("unsupported version {}", version)));
    }
    let window = unpack_u32(&buf[12..])? as usize;
    let num_features = unpack_u32(&buf[16..])?;
    let num_tags = unpack_u32(&buf[20..])?;
    // Every record takes at least one byte of its database
    if num_features as usize > buf.len() || num_tags as usize > buf.len() {
        return Err(Error::store(format!(
            "header claims {} features and {} tags in {} bytes",
            num_features,
            num_tags,
            buf.len()
        )));
    }
    let features = open_cqdb(&buf, unpack_u32(&buf[24..])?)?;
    let tag_db = open_cqdb(&buf, unpack_u32(&buf[28..])?)?;

    let mut entries = Vec::new();
    for id in 0..num_features {
        let text = features
            .to_str(id)
            .and_then(|s| s.to_str().ok())
            .ok_or_else(|| Error::store(format!("feature {} is missing", id)))?;
        entries.push((decode_key(text)?, id as usize));
    }
    let catalog = FeatureCatalog::from_entries(window, entries)?;

    let mut tags = Vec::new();
    for id in 0..num_tags {
        let tag = tag_db
            .to_str(id)
            .and_then(|s| s.to_str().ok())
            .ok_or_else(|| Error::store(format!("tag {} is missing", id)))?;
        tags.push(tag.to_string());
    }
    let tags = TagSet::new(tags).map_err(|e| Error::store(e.to_string()))?;

    info!(
        "loaded {} features and {} tags (window: {})",
        catalog.len(),
        tags.len(),
        window
    );
    Ok((catalog, tags))
}

/// Save a weight vector, replacing `path` only once the new file is complete
///
/// The data goes to a temporary file in the same directory, which is removed
/// again if anything fails.
pub fn write_weights<P: AsRef<Path>>(path: P, weights: &[f64]) -> Result<()> {
    let path = path.as_ref();
    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        writer.write_all(WEIGHTS_MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(weights.len() as u64).to_le_bytes())?;
        for w in weights {
            writer.write_all(&w.to_le_bytes())?;
        }
        writer.flush()?;
    }
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load a weight vector saved with [`write_weights`]
pub fn read_weights<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let buf = fs::read(path)?;
    if buf.len() < WEIGHTS_HEADER_SIZE {
        return Err(Error::store("weights file is truncated"));
    }
    if &buf[0..4] != WEIGHTS_MAGIC {
        return Err(Error::store("invalid file format, magic mismatch"));
    }
    let version = unpack_u32(&buf[4..])?;
    if version != VERSION {
        return Err(Error::store(format!("unsupported version {}", version)));
    }
    let count = unpack_u64(&buf[8..])?;
    let body = &buf[WEIGHTS_HEADER_SIZE..];
    if (body.len() as u64) != count.saturating_mul(8) {
        return Err(Error::store(format!(
            "expected {} weights, found {} bytes",
            count,
            body.len()
        )));
    }
    body.chunks_exact(8).map(unpack_f64).collect()
}

/// Load weights from `path` when it exists, otherwise draw `n` weights from
/// N(0, std_dev²)
pub fn load_or_init_weights<P, R>(path: P, n: usize, std_dev: f64, rng: &mut R) -> Result<Vec<f64>>
where
    P: AsRef<Path>,
    R: Rng + ?Sized,
{
    let path = path.as_ref();
    if path.exists() {
        let weights = read_weights(path)?;
        if weights.len() != n {
            return Err(Error::config(format!(
                "{} holds {} weights, the feature table has {}",
                path.display(),
                weights.len(),
                n
            )));
        }
        info!("resuming from {}", path.display());
        Ok(weights)
    } else {
        random_weights(n, std_dev, rng)
    }
}
