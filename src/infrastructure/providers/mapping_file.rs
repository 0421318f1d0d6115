use std::sync::Arc;

use crate::import::ItemStatus;
use crate::import::mapping::MappingStore;
use crate::infrastructure::discovery::{DiscoveryProvider, ResourceDescriptor, Selector};
use crate::infrastructure::error::{ImportError, ImportResult};
use crate::traits::FileSystem;

/// Replays the resources of a saved mapping file
///
/// Each record becomes a descriptor that keeps its target name and, when one
/// was chosen, its target type. A type that was only ever recommended comes
/// back as a recommendation; records without a type come back unresolved.
pub struct MappingFileDiscovery {
    fs: Arc<dyn FileSystem>,
}

impl MappingFileDiscovery {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl DiscoveryProvider for MappingFileDiscovery {
    fn discover(&self, selector: &Selector) -> ImportResult<Vec<ResourceDescriptor>> {
        let Selector::MappingFile { path } = selector else {
            return Err(ImportError::Discovery(format!(
                "cannot replay {} from a mapping file",
                selector.describe()
            )));
        };

        if !self.fs.is_file(path) {
            return Err(ImportError::Discovery(format!(
                "mapping file {} does not exist",
                path.display()
            )));
        }

        let store = MappingStore::load(Arc::clone(&self.fs), path)?;
        Ok(store
            .records()
            .iter()
            .map(|record| {
                let mut desc = ResourceDescriptor::new(&record.cloud_id)
                    .with_target_name(&record.target_name);
                if !record.display_name.is_empty() {
                    desc = desc.with_display_name(&record.display_name);
                }
                if record.target_type.is_empty() {
                    return desc;
                }
                desc = if record.status == ItemStatus::Recommended {
                    desc.with_recommended_type(&record.target_type)
                } else {
                    desc.with_preset_type(&record.target_type)
                };
                desc
            })
            .collect())
    }
}
