//! Data namespace built from the data folder
//!
//! Every data file becomes a leaf keyed by its file stem, nested under one
//! map per subdirectory. Contributions to the same key merge: maps merge
//! recursively, lists append, scalars overwrite. A map meeting a non-map is
//! an error, as is any malformed or unreadable file; either way no namespace
//! is produced. Empty files and files holding only null contribute nothing.

mod format;

pub use format::DataFormat;

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::value::{Fields, Value};

/// Build the namespace for a data folder. A missing folder yields an empty
/// map.
pub fn build_namespace(data_root: &Path) -> Result<Value> {
    let mut namespace = Fields::new();
    if !data_root.is_dir() {
        return Ok(Value::Map(namespace));
    }

    let walker = WalkDir::new(data_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| Error::DataMerge {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| data_root.to_path_buf()),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let Some(format) = DataFormat::from_extension(&ext) else {
            tracing::debug!("Skipping {:?}: not a data file", path);
            continue;
        };

        let text = std::fs::read_to_string(path).map_err(|e| Error::DataMerge {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if text.trim().is_empty() {
            tracing::debug!("Skipping {:?}: empty", path);
            continue;
        }
        let value = format.parse(&text).map_err(|message| Error::DataMerge {
            path: path.to_path_buf(),
            message,
        })?;
        if matches!(value, Value::Null) {
            tracing::debug!("Skipping {:?}: no data", path);
            continue;
        }

        let relative = path.strip_prefix(data_root).unwrap_or(path);
        let mut keys: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        keys.push(stem);

        insert_at(&mut namespace, &keys, value, path)?;
    }

    Ok(Value::Map(namespace))
}

/// Merge `value` into `namespace` under the key path `keys`, creating
/// intermediate maps as needed
fn insert_at(namespace: &mut Fields, keys: &[String], value: Value, file: &Path) -> Result<()> {
    let Some((leaf, dirs)) = keys.split_last() else {
        return Ok(());
    };

    let mut current = namespace;
    for key in dirs {
        current = match current.get_or_insert_with(key, || Value::Map(Fields::new())) {
            Value::Map(fields) => fields,
            other => {
                return Err(Error::DataMerge {
                    path: file.to_path_buf(),
                    message: format!(
                        "'{}' holds a {} and cannot take a nested map",
                        key,
                        other.type_name()
                    ),
                })
            }
        };
    }

    match current.get_mut(leaf) {
        Some(existing) => merge_value(existing, value, leaf, file),
        None => {
            current.insert(leaf.clone(), value);
            Ok(())
        }
    }
}

/// Merge `incoming` into `target`
fn merge_value(target: &mut Value, incoming: Value, key: &str, file: &Path) -> Result<()> {
    match (target, incoming) {
        (Value::Map(existing), Value::Map(new)) => {
            for (k, v) in new {
                match existing.get_mut(&k) {
                    Some(slot) => merge_value(slot, v, &k, file)?,
                    None => {
                        existing.insert(k, v);
                    }
                }
            }
            Ok(())
        }
        (Value::List(existing), Value::List(new)) => {
            existing.extend(new);
            Ok(())
        }
        (target, incoming) if target.is_map() || incoming.is_map() => Err(Error::DataMerge {
            path: file.to_path_buf(),
            message: format!(
                "'{}' holds a {} and cannot merge a {}",
                key,
                target.type_name(),
                incoming.type_name()
            ),
        }),
        (target, incoming) => {
            *target = incoming;
            Ok(())
        }
    }
}

/// Process-wide data namespace snapshot.
///
/// Readers get an immutable `Arc` of the current namespace. [`DataStore::load`]
/// rebuilds it; rebuilds are serialized, and a failed rebuild leaves the
/// previous snapshot in place.
#[derive(Debug)]
pub struct DataStore {
    root: PathBuf,
    snapshot: ArcSwap<Value>,
    reload: Mutex<()>,
}

impl DataStore {
    /// A store for `data_root`, holding an empty namespace until loaded
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            root: data_root.into(),
            snapshot: ArcSwap::from_pointee(Value::Map(Fields::new())),
            reload: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current namespace
    pub fn snapshot(&self) -> Arc<Value> {
        self.snapshot.load_full()
    }

    /// Rebuild the namespace from disk and publish it
    pub async fn load(&self) -> Result<Arc<Value>> {
        self.load_and_publish(|_| {}).await
    }

    /// Rebuild the namespace and publish it, then hand it to `publish`
    /// before the rebuild lock is released. State derived from the
    /// namespace can be swapped in there without a concurrent rebuild
    /// overtaking it.
    pub async fn load_and_publish<F>(&self, publish: F) -> Result<Arc<Value>>
    where
        F: FnOnce(&Arc<Value>),
    {
        let _guard = self.reload.lock().await;

        let root = self.root.clone();
        let namespace = tokio::task::spawn_blocking(move || build_namespace(&root))
            .await
            .map_err(|e| Error::DataMerge {
                path: self.root.clone(),
                message: format!("namespace build did not complete: {}", e),
            })??;

        let namespace = Arc::new(namespace);
        self.snapshot.store(Arc::clone(&namespace));
        publish(&namespace);
        tracing::info!("Loaded data namespace from {:?}", self.root);
        Ok(namespace)
    }
}
