use async_trait::async_trait;
use serde_json::{json, Value};

use crate::logger::Logger;
use crate::record::LogEvent;
use crate::worker::{Task, TaskError, TaskRequest};

/// Name of the demonstration task.
pub const USER_EXAMPLE: &str = "user.example";

/// Logs a `user.example` event and reports success.
pub struct UserExampleTask {
    logger: Logger,
}

impl UserExampleTask {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Task for UserExampleTask {
    fn name(&self) -> &str {
        USER_EXAMPLE
    }

    async fn run(&self, request: &TaskRequest) -> Result<Value, TaskError> {
        self.logger.info(
            LogEvent::named(USER_EXAMPLE)
                .message("example task ran")
                .field("task_id", request.id.as_str()),
        );
        Ok(json!({ "success": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LineFormat;
    use crate::memory_sink::MemorySink;
    use crate::sink::LogSink;
    use serde_json::Map;
    use std::sync::Arc;

    #[tokio::test]
    async fn logs_and_returns_success() {
        let sink = MemorySink::new(LineFormat::Json);
        let logger = Logger::with_sinks([Arc::new(sink.clone()) as Arc<dyn LogSink>]);
        let task = UserExampleTask::new(logger);
        let request = TaskRequest::new(USER_EXAMPLE, vec![], Map::new());

        let value = task.run(&request).await.unwrap();
        assert_eq!(value, json!({"success": true}));

        let lines = sink.json_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], USER_EXAMPLE);
        assert_eq!(lines[0]["task_id"], request.id.as_str());
    }
}
