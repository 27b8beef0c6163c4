//! On-disk cache of a built [`Index`].
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                    name of the live generation, e.g. "gen-00000003"
//! LOCK                       held exclusively by the writer for a whole save
//! gen-00000003/index.bin     term -> sorted doc ids
//! gen-00000003/docmap.bin    doc id -> document
//! gen-00000003/term_frequencies.bin
//! gen-00000003/doc_lengths.bin
//! gen-00000003/meta.json
//! ```
//!
//! A save writes a complete generation into a staging directory, renames it
//! into place and only then swaps `CURRENT` (temp file + rename). A crash at
//! any point leaves either the previous generation or the new one live,
//! never a mix. Writers, in this process or another, take an exclusive lock
//! on `LOCK` first, so a staging directory seen while holding it belongs to
//! a save that died.

use crate::error::{Error, Result};
use crate::index::{DocumentLengthTable, DocumentMap, Index, PostingsList, TermFrequencyTable};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

const CURRENT: &str = "CURRENT";
const LOCK: &str = "LOCK";
const GEN_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

const INDEX_FILE: &str = "index.bin";
const DOCMAP_FILE: &str = "docmap.bin";
const TERM_FREQUENCIES_FILE: &str = "term_frequencies.bin";
const DOC_LENGTHS_FILE: &str = "doc_lengths.bin";
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
}

impl MetaFile {
    fn describe(index: &Index) -> Self {
        Self {
            version: FORMAT_VERSION,
            num_docs: index.num_docs() as u32,
            num_terms: index.num_terms() as u32,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn current(&self) -> PathBuf { self.root.join(CURRENT) }

    fn lock(&self) -> PathBuf { self.root.join(LOCK) }

    fn generation(&self, gen: u64) -> PathBuf { self.root.join(format!("{GEN_PREFIX}{gen:08}")) }

    fn staging(&self, gen: u64) -> PathBuf { self.root.join(format!("{STAGING_PREFIX}{gen:08}")) }

    /// Directory of the generation `CURRENT` points at.
    pub fn current_generation_dir(&self) -> Result<PathBuf> {
        let name = match fs::read_to_string(self.current()) {
            Ok(name) => name,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::cache_not_found(format!("no index at {}", self.root.display())))
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(Error::cache_not_found(format!("{CURRENT} is not a generation name: {e}")))
            }
            Err(e) => return Err(e.into()),
        };
        let name = name.trim();
        if parse_generation(name, GEN_PREFIX).is_none() {
            return Err(Error::cache_not_found(format!("CURRENT names {name:?}, not a generation")));
        }
        Ok(self.root.join(name))
    }

    /// Highest generation number present on disk, live or not.
    fn latest_generation(&self) -> io::Result<u64> {
        let mut latest = 0;
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            let gen = parse_generation(&name, GEN_PREFIX).or_else(|| parse_generation(&name, STAGING_PREFIX));
            if let Some(gen) = gen {
                latest = latest.max(gen);
            }
        }
        Ok(latest)
    }
}

fn parse_generation(name: &str, prefix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.parse().ok()
}

fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).map_err(|e| io::Error::other(e.to_string()))?;
    w.flush()?;
    w.get_ref().sync_all()?;
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let bytes = match fs::read(dir.join(name)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::cache_not_found(format!("missing {name} in {}", dir.display())))
        }
        Err(e) => return Err(e.into()),
    };
    bincode::deserialize(&bytes)
        .map_err(|e| Error::cache_not_found(format!("unreadable {name}: {e}")))
}

fn read_meta(dir: &Path) -> Result<MetaFile> {
    let text = match fs::read_to_string(dir.join(META_FILE)) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::cache_not_found(format!("missing {META_FILE} in {}", dir.display())))
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(Error::cache_not_found(format!("unreadable {META_FILE}: {e}")))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text).map_err(|e| Error::cache_not_found(format!("unreadable {META_FILE}: {e}")))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Exclusive lock on the store's `LOCK` file. Released when the returned
/// handle is dropped and the file closes.
fn lock_writer(paths: &IndexPaths) -> Result<File> {
    let file = fs::OpenOptions::new().create(true).truncate(false).write(true).open(paths.lock())?;
    file.lock_exclusive()?;
    Ok(file)
}

/// Persist all four structures as a new generation and make it live.
/// Whatever was saved before is replaced in full. Concurrent saves to the
/// same root are serialized; the last one to finish is live.
pub fn save_index(paths: &IndexPaths, index: &Index) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    let _lock = lock_writer(paths)?;
    let gen = paths.latest_generation()? + 1;
    let staging = paths.staging(gen);
    // Fails rather than reusing a directory some other save left behind.
    fs::create_dir(&staging)?;

    write_artifact(&staging.join(INDEX_FILE), &index.postings)?;
    write_artifact(&staging.join(DOCMAP_FILE), &index.docmap)?;
    write_artifact(&staging.join(TERM_FREQUENCIES_FILE), &index.term_frequencies)?;
    write_artifact(&staging.join(DOC_LENGTHS_FILE), &index.doc_lengths)?;
    let meta = MetaFile::describe(index);
    let mut f = File::create(staging.join(META_FILE))?;
    f.write_all(serde_json::to_string_pretty(&meta).map_err(io::Error::other)?.as_bytes())?;
    f.sync_all()?;
    sync_dir(&staging)?;

    let live = paths.generation(gen);
    fs::rename(&staging, &live)?;

    // Commit point.
    let tmp = paths.root.join(format!("{CURRENT}.tmp"));
    let mut f = File::create(&tmp)?;
    writeln!(f, "{GEN_PREFIX}{gen:08}")?;
    f.sync_all()?;
    fs::rename(&tmp, paths.current())?;
    sync_dir(&paths.root)?;

    tracing::info!(
        root = %paths.root.display(),
        generation = gen,
        num_docs = meta.num_docs,
        num_terms = meta.num_terms,
        "saved index"
    );
    remove_stale_generations(paths, gen);
    Ok(())
}

/// Best effort: a leftover generation is harmless, `CURRENT` never names it.
/// Must run under the writer lock.
fn remove_stale_generations(paths: &IndexPaths, live: u64) {
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "could not scan index root for stale generations");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stale = match parse_generation(&name, GEN_PREFIX) {
            Some(gen) => gen != live,
            None => parse_generation(&name, STAGING_PREFIX).is_some(),
        };
        if stale {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "could not remove stale generation");
            }
        }
    }
}

/// Load the live generation. Anything short of a complete, self-consistent
/// set of artifacts is `CacheNotFound`.
pub fn load_index(paths: &IndexPaths) -> Result<Index> {
    let dir = paths.current_generation_dir()?;
    if !dir.is_dir() {
        return Err(Error::cache_not_found(format!("{} is missing", dir.display())));
    }
    let meta = read_meta(&dir)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::cache_not_found(format!(
            "format version {} (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    let index = Index {
        postings: read_artifact::<PostingsList>(&dir, INDEX_FILE)?,
        docmap: read_artifact::<DocumentMap>(&dir, DOCMAP_FILE)?,
        term_frequencies: read_artifact::<TermFrequencyTable>(&dir, TERM_FREQUENCIES_FILE)?,
        doc_lengths: read_artifact::<DocumentLengthTable>(&dir, DOC_LENGTHS_FILE)?,
    };
    if meta.num_docs as usize != index.num_docs() || meta.num_terms as usize != index.num_terms() {
        return Err(Error::cache_not_found(format!(
            "{META_FILE} describes {} documents / {} terms, artifacts hold {} / {}",
            meta.num_docs,
            meta.num_terms,
            index.num_docs(),
            index.num_terms()
        )));
    }
    index
        .validate()
        .map_err(|reason| Error::cache_not_found(format!("inconsistent artifacts: {reason}")))?;
    tracing::info!(
        root = %paths.root.display(),
        num_docs = index.num_docs(),
        num_terms = index.num_terms(),
        created_at = %meta.created_at,
        "loaded index"
    );
    Ok(index)
}
