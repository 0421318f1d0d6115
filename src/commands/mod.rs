pub mod import;

pub use import::{ImportCommand, ImportFlags};
