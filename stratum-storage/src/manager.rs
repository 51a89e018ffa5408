use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use stratum_error::{stratum_bail, stratum_err, StratumResult};
use stratum_schema::ArraySchema;

use crate::{
    write_fragment, FragmentInput, FragmentMeta, FragmentReader, FRAGMENTS_DIR, SCHEMA_FILE,
    SEALED_FILE,
};

/// The root of a storage hierarchy: one directory per array, each holding its schema
/// and fragments.
///
/// The manager itself is almost stateless; the one piece of shared state is the
/// per-array timestamp counter, which guarantees strictly increasing fragment
/// timestamps within a process. Across processes the counter is re-seeded from the
/// newest fragment on disk and the wall clock.
#[derive(Debug)]
pub struct StorageManager {
    root: PathBuf,
    clocks: Mutex<HashMap<String, u64>>,
}

impl StorageManager {
    /// Open (creating if needed) a storage root.
    pub fn create(root: impl Into<PathBuf>) -> StratumResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        log::info!("storage root at {}", root.display());
        Ok(Self {
            root,
            clocks: Mutex::new(HashMap::new()),
        })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory of an array, after name validation.
    pub fn array_dir(&self, array: &str) -> StratumResult<PathBuf> {
        validate_array_name(array)?;
        Ok(self.root.join(array))
    }

    /// Whether an array has been defined under this root.
    pub fn array_exists(&self, array: &str) -> StratumResult<bool> {
        Ok(self.array_dir(array)?.join(SCHEMA_FILE).exists())
    }

    /// Define a new array: persist its schema and create an empty fragment set.
    pub fn define_array(&self, schema: &ArraySchema) -> StratumResult<()> {
        let dir = self.array_dir(schema.name())?;
        if dir.join(SCHEMA_FILE).exists() {
            stratum_bail!(AlreadyExists: "array '{}' is already defined", schema.name());
        }
        fs::create_dir_all(dir.join(FRAGMENTS_DIR))?;
        let mut file = File::create(dir.join(SCHEMA_FILE))?;
        file.write_all(&schema.to_flexbuffers()?)?;
        file.sync_all()?;
        log::info!("defined array '{}'", schema.name());
        Ok(())
    }

    /// Load and re-validate an array's schema.
    pub fn load_schema(&self, array: &str) -> StratumResult<ArraySchema> {
        let path = self.array_dir(array)?.join(SCHEMA_FILE);
        if !path.exists() {
            stratum_bail!(NotFound: "array '{array}' is not defined");
        }
        ArraySchema::from_flexbuffers(&fs::read(path)?)
            .map_err(|e| e.with_context(format!("schema of array '{array}'")))
    }

    /// Drop every fragment of an array, keeping its schema. Clearing an already
    /// empty array is a no-op.
    pub fn clear_array(&self, array: &str) -> StratumResult<()> {
        if !self.array_exists(array)? {
            stratum_bail!(NotFound: "array '{array}' is not defined");
        }
        let fragments = self.array_dir(array)?.join(FRAGMENTS_DIR);
        if fragments.exists() {
            fs::remove_dir_all(&fragments)?;
        }
        fs::create_dir_all(&fragments)?;
        self.clocks.lock().remove(array);
        log::info!("cleared array '{array}'");
        Ok(())
    }

    /// Remove an array entirely, schema included.
    pub fn delete_array(&self, array: &str) -> StratumResult<()> {
        if !self.array_exists(array)? {
            stratum_bail!(NotFound: "array '{array}' is not defined");
        }
        fs::remove_dir_all(self.array_dir(array)?)?;
        self.clocks.lock().remove(array);
        log::info!("deleted array '{array}'");
        Ok(())
    }

    /// Write a fragment from prepared input, stamping it with the next timestamp.
    pub fn create_fragment(
        &self,
        schema: &ArraySchema,
        input: FragmentInput,
    ) -> StratumResult<FragmentMeta> {
        if !self.array_exists(schema.name())? {
            stratum_bail!(NotFound: "array '{}' is not defined", schema.name());
        }
        let timestamp = self.next_timestamp(schema.name())?;
        write_fragment(&self.array_dir(schema.name())?, schema, input, timestamp)
    }

    /// Open an array for reading: a snapshot of its schema and the fragments
    /// sealed so far. Writes landing after the snapshot are not visible through
    /// it; dropping the handle closes the array.
    pub fn open_array(&self, array: &str) -> StratumResult<OpenArray> {
        let schema = self.load_schema(array)?;
        let fragments = self.list_fragments(array)?;
        Ok(OpenArray { schema, fragments })
    }

    /// Open every sealed fragment of an array, ascending by timestamp. Unsealed
    /// fragment directories are skipped. Two sealed fragments sharing a timestamp
    /// make write order ambiguous and are reported as corruption.
    pub fn list_fragments(&self, array: &str) -> StratumResult<Vec<FragmentReader>> {
        let array_dir = self.array_dir(array)?;
        let fragments_dir = array_dir.join(FRAGMENTS_DIR);
        if !array_dir.join(SCHEMA_FILE).exists() {
            stratum_bail!(NotFound: "array '{array}' is not defined");
        }
        let mut readers = Vec::new();
        if fragments_dir.exists() {
            for entry in fs::read_dir(&fragments_dir)? {
                let entry = entry?;
                if !entry.path().join(SEALED_FILE).exists() {
                    log::debug!("skipping unsealed fragment {:?}", entry.file_name());
                    continue;
                }
                let id = entry.file_name().to_string_lossy().into_owned();
                readers.push(FragmentReader::open(&array_dir, &id)?);
            }
        }
        readers.sort_by_key(|r| r.meta().timestamp);
        for pair in readers.windows(2) {
            if pair[0].meta().timestamp == pair[1].meta().timestamp {
                stratum_bail!(
                    CorruptData: "array '{array}' has two fragments at timestamp {}",
                    pair[0].meta().timestamp
                );
            }
        }
        Ok(readers)
    }

    /// The next fragment timestamp for an array: strictly greater than every
    /// timestamp handed out before, and on first use also greater than anything
    /// already on disk or the wall clock.
    fn next_timestamp(&self, array: &str) -> StratumResult<u64> {
        let mut clocks = self.clocks.lock();
        let last = match clocks.get(array) {
            Some(last) => *last,
            None => {
                let wall = jiff::Timestamp::now().as_millisecond().max(0) as u64;
                self.max_fragment_timestamp(array)?.max(wall)
            }
        };
        let next = last + 1;
        clocks.insert(array.to_string(), next);
        Ok(next)
    }

    /// Highest timestamp among all fragment directories, sealed or not. Unsealed
    /// leftovers still count so a reused timestamp can never collide with debris
    /// from a crashed writer.
    fn max_fragment_timestamp(&self, array: &str) -> StratumResult<u64> {
        let dir = self.array_dir(array)?.join(FRAGMENTS_DIR);
        let mut max = 0u64;
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let name = entry?.file_name();
                if let Some(ts) = parse_fragment_timestamp(&name.to_string_lossy()) {
                    max = max.max(ts);
                }
            }
        }
        Ok(max)
    }
}

/// A read snapshot of one array: its schema and the fragments sealed when it was
/// opened, ascending by timestamp.
#[derive(Debug, Clone)]
pub struct OpenArray {
    schema: ArraySchema,
    fragments: Vec<FragmentReader>,
}

impl OpenArray {
    /// The array's schema.
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// The sealed fragments at open time, ascending by timestamp.
    pub fn fragments(&self) -> &[FragmentReader] {
        &self.fragments
    }
}

/// Timestamp component of a fragment directory name.
fn parse_fragment_timestamp(name: &str) -> Option<u64> {
    name.split_once('_').and_then(|(ts, _)| ts.parse().ok())
}

/// Array names become directory names, so the same character set as schema member
/// names applies, plus the reserved `__` prefix used by the engine's own files.
fn validate_array_name(name: &str) -> StratumResult<()> {
    if name.is_empty() {
        return Err(stratum_err!("array name must not be empty"));
    }
    if name.starts_with("__") {
        return Err(stratum_err!(
            "array name '{name}' uses the reserved '__' prefix"
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(stratum_err!(
            "array name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stratum_error::ErrorCode;
    use stratum_schema::{Attribute, Datatype, Dimension};

    use super::*;

    fn schema(name: &str) -> ArraySchema {
        ArraySchema::builder(name)
            .dimension(Dimension::int("x", Datatype::I64, 0, 9))
            .attribute(Attribute::new("v", Datatype::I32))
            .sparse(4)
            .build()
            .unwrap()
    }

    #[test]
    fn define_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        let schema = schema("pts");
        manager.define_array(&schema).unwrap();
        assert_eq!(manager.load_schema("pts").unwrap(), schema);
    }

    #[test]
    fn redefinition_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        manager.define_array(&schema("pts")).unwrap();
        let err = manager.define_array(&schema("pts")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
    }

    #[test]
    fn missing_array_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        assert_eq!(
            manager.load_schema("nope").unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            manager.clear_array("nope").unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            manager.delete_array("nope").unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn delete_then_redefine() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        manager.define_array(&schema("pts")).unwrap();
        manager.delete_array("pts").unwrap();
        assert!(!manager.array_exists("pts").unwrap());
        manager.define_array(&schema("pts")).unwrap();
    }

    #[test]
    fn traversal_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        for bad in ["", "..", "a/b", "__hidden"] {
            assert!(manager.array_dir(bad).is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn timestamps_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::create(dir.path()).unwrap();
        manager.define_array(&schema("pts")).unwrap();
        let a = manager.next_timestamp("pts").unwrap();
        let b = manager.next_timestamp("pts").unwrap();
        assert!(b > a);
    }
}
