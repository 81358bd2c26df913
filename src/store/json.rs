use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::{Document, DocumentStore, LoadStatus};
use crate::Result;

/// A [`DocumentStore`] that keeps the document in memory and mirrors it into a JSON file.
///
/// Every write goes to `<path>.tmp` first, is flushed and synced to stable storage, and is then
/// renamed over `<path>`. A crash at any point therefore leaves either the old or the new
/// document on disk, never a partially written one.
///
/// `JsonStore` is cheap to clone; all clones share the same document and lock.
#[derive(Debug, Clone)]
pub struct JsonStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    // path of the persisted document
    path: PathBuf,
    // the current snapshot. The lock is also held across persisting so that the file on disk
    // and the snapshot are always replaced together
    doc: Mutex<Document>,
    // how the document was obtained when the store was opened
    status: LoadStatus,
}

impl JsonStore {
    /// opens the store persisted at `path`.
    ///
    /// If there is no file at `path` an empty document is created and persisted right away
    /// (along with any missing parent directories), so the file always exists once the store
    /// is open. If the file exists but can not be parsed, the store starts from an empty document
    /// and reports [`LoadStatus::Recovered`]; the unreadable file is left in place until the next
    /// successful write.
    ///
    /// # Errors
    /// returns an error if the file exists but can not be read, or if the initial empty document
    /// could not be persisted
    #[instrument]
    pub fn open(path: impl Into<PathBuf> + std::fmt::Debug) -> Result<JsonStore> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let (doc, status) = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    info!("loaded document from {:?}", &path);
                    (Document::new(value), LoadStatus::Loaded)
                }
                Err(e) => {
                    warn!("could not parse document at {:?}, starting empty: {}", &path, e);
                    (Document::empty(), LoadStatus::Recovered)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no document at {:?}, creating an empty one", &path);
                let doc = Document::empty();
                persist(&path, &doc)?;
                (doc, LoadStatus::Created)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(JsonStore {
            inner: Arc::new(Inner {
                path,
                doc: Mutex::new(doc),
                status,
            }),
        })
    }

    /// the path of the persisted document
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// reports how the document was obtained when the store was opened
    pub fn load_status(&self) -> LoadStatus {
        self.inner.status
    }

    // the snapshot is only ever swapped after a successful persist, so it is consistent even if
    // a holder of the lock panicked
    fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, current: &mut Document, doc: Document) -> Result<()> {
        if let Err(e) = persist(&self.inner.path, &doc) {
            error!("failed to persist document to {:?}: {}", &self.inner.path, e);
            return Err(e);
        }
        *current = doc;
        Ok(())
    }
}

impl DocumentStore for JsonStore {
    fn read(&self) -> Document {
        self.lock().clone()
    }

    fn write(&self, doc: Value) -> Result<()> {
        let mut current = self.lock();
        self.commit(&mut current, Document::new(doc))
    }

    fn update<F>(&self, f: F) -> Result<Document>
    where
        F: FnOnce(&mut Value) -> Result<()>,
    {
        let mut current = self.lock();
        let mut value = current.to_value();
        f(&mut value)?;
        let doc = Document::new(value);
        self.commit(&mut current, doc.clone())?;
        Ok(doc)
    }
}

/// builds the path of the temporary file that a document is written to before it is renamed
/// over `path`
fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// writes `doc` to `path` by way of a synced temporary file and an atomic rename.
/// The temporary file is removed again if any step fails.
fn persist(path: &Path, doc: &Document) -> Result<()> {
    let tmp = tmp_path(path);
    let result = write_tmp(&tmp, doc).and_then(|_| {
        fs::rename(&tmp, path)?;
        sync_parent(path);
        Ok(())
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!("could not remove temp file {:?}: {}", &tmp, e);
        }
    }
    result
}

fn write_tmp(tmp: &Path, doc: &Document) -> Result<()> {
    let file = File::create(tmp)?;
    let mut writer = BufWriter::new(&file);
    serde_json::to_writer_pretty(&mut writer, &**doc)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

// makes the rename itself durable. Only possible (and needed) on unix
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("could not sync directory {:?}: {}", dir, e);
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
