#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::context;
//! ```

use std::sync::OnceLock;

use deferq::{ContextConfig, ExecutionContext};

/// Returns the process-wide test context, installing it (and the tracing
/// test subscriber) on first use. One per test binary; never torn down.
pub fn context() -> &'static ExecutionContext {
    static CONTEXT: OnceLock<ExecutionContext> = OnceLock::new();
    CONTEXT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        ExecutionContext::new(
            ContextConfig::default()
                .with_worker_threads(4)
                .with_thread_name_prefix("deferq-it"),
        )
    })
}
