pub mod module_manager;
pub mod traits;

// Re-export for convenience
pub use module_manager::ModuleManager;
pub use traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
