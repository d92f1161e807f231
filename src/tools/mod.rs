mod memory;
mod system;
mod terminal;

pub use memory::RememberFactTool;
pub use system::SystemInfoTool;
pub use terminal::TerminalTool;
