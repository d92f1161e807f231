use async_trait::async_trait;

use crate::traits::Channel;
use crate::types::SOURCE_CONSOLE;

/// Stdout channel. Always registered, and the fallback destination when
/// nothing better is known.
pub struct ConsoleChannel;

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> String {
        SOURCE_CONSOLE.to_string()
    }

    async fn send_text(&self, _target: Option<&str>, text: &str) -> anyhow::Result<()> {
        println!("{}", text);
        Ok(())
    }
}
