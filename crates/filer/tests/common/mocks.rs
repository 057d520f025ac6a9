//! Object stores with scripted failures and call counters.

use async_trait::async_trait;
use bytes::Bytes;
use filer_storage::{ByteStream, MemoryBackend, ObjectMeta, ObjectStore, StorageError, StorageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn unavailable(op: &str, key: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("{op} {key}: store unavailable")))
}

/// A store where every operation fails.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingBackend;

#[async_trait]
impl ObjectStore for FailingBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Err(unavailable("exists", key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        Err(unavailable("head", key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Err(unavailable("get", key))
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        Err(unavailable("get_stream", key))
    }

    async fn put(&self, key: &str, _data: Bytes) -> StorageResult<()> {
        Err(unavailable("put", key))
    }

    async fn put_if_not_exists(&self, key: &str, _data: Bytes) -> StorageResult<bool> {
        Err(unavailable("put", key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Err(unavailable("delete", key))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// An in-memory store whose deletes always fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct DeleteFailingBackend {
    pub inner: MemoryBackend,
}

#[async_trait]
impl ObjectStore for DeleteFailingBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Err(unavailable("delete", key))
    }

    fn backend_name(&self) -> &'static str {
        "delete-failing"
    }
}

/// An in-memory store whose writes can be switched off.
#[allow(dead_code)]
pub struct SwitchableBackend {
    pub inner: MemoryBackend,
    writable: AtomicBool,
}

impl Default for SwitchableBackend {
    fn default() -> Self {
        Self {
            inner: MemoryBackend::new(),
            writable: AtomicBool::new(true),
        }
    }
}

#[allow(dead_code)]
impl SwitchableBackend {
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    fn check_writable(&self, key: &str) -> StorageResult<()> {
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(unavailable("put", key))
        }
    }
}

#[async_trait]
impl ObjectStore for SwitchableBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check_writable(key)?;
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.check_writable(key)?;
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "switchable"
    }
}

/// Wraps a store and counts the calls made to it.
#[allow(dead_code)]
pub struct CountingBackend {
    inner: Arc<dyn ObjectStore>,
    pub heads: AtomicUsize,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

#[allow(dead_code)]
impl CountingBackend {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            heads: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
