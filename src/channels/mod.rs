mod console;
mod telegram;

pub use console::ConsoleChannel;
pub use telegram::TelegramChannel;
