// src/announce/backend.rs

//! Pluggable notice backend.
//!
//! The runtime talks to an `ActivationBackend` instead of writing output
//! itself. Production uses [`StdoutBackend`]; embedders and tests use
//! [`ChannelBackend`] or their own implementation.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::announce::Notice;
use crate::errors::{Error, Result};

/// Trait abstracting where notices go.
pub trait ActivationBackend: Send {
    /// Deliver notices in order.
    fn announce(
        &mut self,
        notices: Vec<Notice>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Writes each notice as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutBackend {
    stdout: Option<tokio::io::Stdout>,
}

impl StdoutBackend {
    pub fn new() -> Self {
        Self { stdout: None }
    }
}

impl ActivationBackend for StdoutBackend {
    fn announce(
        &mut self,
        notices: Vec<Notice>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let stdout = self.stdout.get_or_insert_with(tokio::io::stdout);
            for notice in notices {
                let mut line = serde_json::to_string(&notice).map_err(Error::from)?;
                line.push('\n');
                stdout.write_all(line.as_bytes()).await?;
            }
            stdout.flush().await?;
            Ok(())
        })
    }
}

/// Forwards notices over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelBackend {
    tx: mpsc::Sender<Notice>,
}

impl ChannelBackend {
    pub fn new(tx: mpsc::Sender<Notice>) -> Self {
        Self { tx }
    }

    /// Backend plus the receiving end, with room for `capacity` notices.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ActivationBackend for ChannelBackend {
    fn announce(
        &mut self,
        notices: Vec<Notice>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for notice in notices {
                tx.send(notice).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
