//! Import session: items, type resolution, execution and persistence

pub mod controller;
pub mod editor;
pub mod executor;
pub mod item;
pub mod mapping;
pub mod resolver;

pub use controller::{LogObserver, SessionController, SessionOptions, SessionOutcome};
pub use item::ItemStatus;
pub use mapping::{MAPPING_FILE_NAME, MappingStore};
pub use resolver::TypeResolver;
