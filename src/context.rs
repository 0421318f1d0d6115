use crate::traits::{
    CommandExecutor, FileSystem, InquireUserInput, Output, RealCommandExecutor, RealFileSystem,
    TerminalOutput, UserInput,
};
use std::sync::Arc;

/// Application context that holds all dependencies for dependency injection
#[derive(Clone)]
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub input: Arc<dyn UserInput>,
    pub output: Arc<dyn Output>,
    pub command: Arc<dyn CommandExecutor>,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new() -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            input: Arc::new(InquireUserInput),
            output: Arc::new(TerminalOutput),
            command: Arc::new(RealCommandExecutor::new()),
        }
    }

    /// Create a test context with specific mock implementations
    #[cfg(test)]
    pub fn test_with(
        fs: Arc<dyn FileSystem>,
        input: Arc<dyn UserInput>,
        output: Arc<dyn Output>,
        command: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            fs,
            input,
            output,
            command,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
