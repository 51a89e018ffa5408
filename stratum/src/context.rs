use std::path::PathBuf;
use std::sync::Arc;

use stratum_error::StratumResult;
use stratum_query::{QueryProcessor, ReadRequest, ReadResult};
use stratum_schema::ArraySchema;
use stratum_storage::{FragmentMeta, LoadInput, Loader, StorageManager};

/// One opened storage root and the services over it.
///
/// A context is cheap to clone and safe to share across threads; all engine state
/// lives on disk or behind the storage manager.
#[derive(Debug, Clone)]
pub struct Context {
    manager: Arc<StorageManager>,
    loader: Loader,
    processor: QueryProcessor,
}

impl Context {
    /// Open (creating if needed) a storage root.
    pub fn create(root: impl Into<PathBuf>) -> StratumResult<Self> {
        let manager = Arc::new(StorageManager::create(root)?);
        let loader = Loader::new(Arc::clone(&manager));
        let processor = QueryProcessor::new(Arc::clone(&manager));
        Ok(Self {
            manager,
            loader,
            processor,
        })
    }

    /// The storage manager for array lifecycle operations.
    pub fn manager(&self) -> &StorageManager {
        &self.manager
    }

    /// The bulk loader.
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// The query processor.
    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    /// Define a new array under this root.
    pub fn define_array(&self, schema: &ArraySchema) -> StratumResult<()> {
        self.manager.define_array(schema)
    }

    /// Load one batch of cells into an array as a new fragment.
    pub fn load(&self, array: &str, input: LoadInput, sorted: bool) -> StratumResult<FragmentMeta> {
        self.loader.load(array, input, sorted)
    }

    /// Overlay another batch at a newer timestamp; on dense arrays, text records
    /// supersede only the cells they name.
    pub fn update(
        &self,
        array: &str,
        input: LoadInput,
        sorted: bool,
    ) -> StratumResult<FragmentMeta> {
        self.loader.update(array, input, sorted)
    }

    /// Read a subarray against everything written so far.
    pub fn read(&self, array: &str, request: &ReadRequest) -> StratumResult<ReadResult> {
        self.processor.execute_read(array, request)
    }
}
