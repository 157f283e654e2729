//! Serializable configuration for the execution context.

use serde::{Deserialize, Serialize};

/// Configuration for [`ExecutionContext`](crate::context::ExecutionContext):
/// worker count, thread naming and the priorities of the three well-known
/// queues.
///
/// All fields have defaults, so partial configuration files work:
///
/// ```
/// use deferq::config::ContextConfig;
///
/// let config: ContextConfig = serde_json::from_str(r#"{"worker_threads": 4}"#).unwrap();
/// assert_eq!(config.worker_threads, 4);
/// assert_eq!(config.thread_name_prefix, "deferq");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of pool workers serving the context's queues.
    pub worker_threads: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Priority of the main queue.
    pub main_priority: usize,
    /// Priority of the default queue.
    pub default_priority: usize,
    /// Priority of the background queue.
    pub background_priority: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            thread_name_prefix: "deferq".to_string(),
            main_priority: 2,
            default_priority: 1,
            background_priority: 0,
        }
    }
}

impl ContextConfig {
    /// Sets the worker count.
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Sets the thread-name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}
