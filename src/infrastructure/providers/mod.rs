pub mod azure;
pub mod mapping_file;

pub use azure::AzureDiscovery;
pub use mapping_file::MappingFileDiscovery;
