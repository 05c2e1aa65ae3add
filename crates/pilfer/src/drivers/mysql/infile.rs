//! Named in-process byte streams for `LOAD DATA LOCAL INFILE`.
//!
//! The loader registers a table's encoded record stream under
//! `Reader::<table>` and names that file in the `LOAD DATA` statement. When
//! the server asks for the file, the connection's infile handler takes the
//! stream out of the registry. The registration is removed when its guard
//! drops, whether or not the server ever asked for it.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::Result;

/// A stream of record bytes as the MySQL client pulls it.
pub type InfileStream = BoxStream<'static, io::Result<Bytes>>;

/// Prefix of every registered stream name.
pub const STREAM_PREFIX: &str = "Reader::";

/// Registry of named byte streams.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<String, InfileStream>>>,
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream name used for a table.
    pub fn stream_name(table: &str) -> String {
        format!("{}{}", STREAM_PREFIX, table)
    }

    /// Register a stream. The returned guard deregisters it on drop.
    pub fn register(&self, name: impl Into<String>, stream: InfileStream) -> Registration {
        let name = name.into();
        self.lock().insert(name.clone(), stream);
        Registration {
            registry: self.clone(),
            name,
        }
    }

    /// Take a registered stream.
    ///
    /// A missing name yields a stream that fails immediately, so the
    /// `LOAD DATA` statement errors instead of loading nothing.
    pub fn take(&self, name: &str) -> InfileStream {
        match self.lock().remove(name) {
            Some(stream) => stream,
            None => {
                let err = io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no stream registered as {}", name),
                );
                stream::once(async move { Err(err) }).boxed()
            }
        }
    }

    /// Whether a name is currently registered.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InfileStream>> {
        // A panic while holding the lock leaves the map itself consistent
        self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a stream registered while alive.
pub struct Registration {
    registry: StreamRegistry,
    name: String,
}

impl Registration {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

/// Adapt an encoded chunk channel to an infile stream.
///
/// An `Err` chunk becomes an IO error, which aborts the `LOAD DATA`.
pub fn chunk_stream(chunks: mpsc::Receiver<Result<Bytes>>) -> InfileStream {
    stream::unfold(chunks, |mut chunks| async move {
        let item = chunks.recv().await?;
        Some((item.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string())), chunks))
    })
    .boxed()
}
