//! Panic-isolated task spawning.
//!
//! Every background task of the supervisor goes through
//! [`spawn_supervised`]: a panic inside the task is caught at the task
//! boundary, logged with the task's name, and the task exits cleanly. No
//! panic ever propagates across tasks or terminates the process.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

/// Spawn a named background task that logs (rather than propagates) panics.
pub fn spawn_supervised<F>(name: &'static str, future: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
            let message = panic_message(&panic);
            error!(task = name, panic = %message, "background task panicked");
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
