use crate::error::TrendsError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Document store for materialized snapshots. Last write wins.
pub trait SnapshotSink: Send + Sync {
    fn write(&self, name: &str, body: &[u8]) -> io::Result<()>;
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

pub fn write_json<S, T>(sink: &S, name: &str, value: &T) -> Result<(), TrendsError>
where
    S: SnapshotSink + ?Sized,
    T: Serialize,
{
    let body = serde_json::to_vec_pretty(value)?;
    sink.write(name, &body)?;
    Ok(())
}

pub fn read_json<S, T>(sink: &S, name: &str) -> Result<Option<T>, TrendsError>
where
    S: SnapshotSink + ?Sized,
    T: DeserializeOwned,
{
    match sink.read(name)? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl SnapshotSink for FileSink {
    fn write(&self, name: &str, body: &[u8]) -> io::Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // readers must never observe a half-written document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl SnapshotSink for MemorySink {
    fn write(&self, name: &str, body: &[u8]) -> io::Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?;
        documents.insert(name.to_string(), body.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?;
        Ok(documents.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn test_file_sink_overwrites() {
        let root = std::env::temp_dir().join(format!("trends-sink-{}", std::process::id()));
        let sink = FileSink::new(&root);

        write_json(&sink, "feed/doc.json", &Doc { value: 1 }).expect("write");
        write_json(&sink, "feed/doc.json", &Doc { value: 2 }).expect("write");

        let doc: Option<Doc> = read_json(&sink, "feed/doc.json").expect("read");
        assert_eq!(doc, Some(Doc { value: 2 }));
        assert!(!root.join("feed/doc.json.tmp").exists());

        let missing: Option<Doc> = read_json(&sink, "feed/missing.json").expect("read");
        assert!(missing.is_none());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_memory_sink_round_trip() {
        let sink = MemorySink::default();
        assert!(sink.read("a").expect("read").is_none());
        sink.write("a", b"{}").expect("write");
        assert_eq!(sink.read("a").expect("read"), Some(b"{}".to_vec()));
    }
}
