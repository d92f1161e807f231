use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::traits::{MemoryStore, Tool};

pub struct RememberFactTool {
    memory: Arc<dyn MemoryStore>,
}

impl RememberFactTool {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[derive(Deserialize)]
struct RememberArgs {
    category: String,
    key: String,
    value: String,
}

#[async_trait]
impl Tool for RememberFactTool {
    fn name(&self) -> &str {
        "remember_fact"
    }

    fn description(&self) -> &str {
        "Store a fact about the user or environment for long-term memory. \
         Stored facts appear in your system prompt on every request."
    }

    fn parameters(&self) -> &[&str] {
        &["category", "key", "value"]
    }

    async fn call(&self, args: &Value) -> anyhow::Result<String> {
        let args: RememberArgs = serde_json::from_value(args.clone())?;
        self.memory
            .remember_fact(&args.category, &args.key, &args.value)
            .await?;
        Ok(format!(
            "Remembered {}/{}: {}",
            args.category, args.key, args.value
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SqliteMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn stores_fact_in_memory_store() {
        let store = Arc::new(SqliteMemoryStore::in_memory().await.unwrap());
        let tool = RememberFactTool::new(store.clone());

        tool.call(&json!({"category": "user", "key": "name", "value": "Dana"}))
            .await
            .unwrap();

        let facts = store.facts().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "name");
    }

    #[tokio::test]
    async fn malformed_args_error() {
        let store = Arc::new(SqliteMemoryStore::in_memory().await.unwrap());
        let tool = RememberFactTool::new(store);
        assert!(tool.call(&json!({"category": "user"})).await.is_err());
    }
}
