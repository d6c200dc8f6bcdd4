// Experiment-owned buffer registry
//
// Buffers are created once at setup and addressed by index. Sensor inputs
// keep a `Weak<BufferRegistry>` plus handles, so the experiment stays the
// only owner of buffer lifetime.

use crate::buffer::SampleBuffer;
use crate::config::BufferConfig;
use crate::error::{StreamError, StreamResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Non-owning reference to a buffer in a `BufferRegistry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(usize);

impl BufferHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: Vec<Arc<SampleBuffer>>,
    by_name: HashMap<String, BufferHandle>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[BufferConfig]) -> StreamResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(&config.name, config.size)?;
        }
        Ok(registry)
    }

    /// Create a buffer. `size == 0` means unbounded.
    pub fn insert(&mut self, name: &str, size: usize) -> StreamResult<BufferHandle> {
        if self.by_name.contains_key(name) {
            return Err(StreamError::InvalidConfig(format!(
                "Duplicate buffer name '{}'",
                name
            )));
        }

        let handle = BufferHandle(self.buffers.len());
        self.buffers.push(Arc::new(SampleBuffer::new(name, size)));
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn handle(&self, name: &str) -> StreamResult<BufferHandle> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StreamError::UnknownBuffer(name.to_string()))
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&SampleBuffer> {
        self.buffers.get(handle.0).map(|b| b.as_ref())
    }

    /// Shared reference for consumers that outlive a single call (plots)
    pub fn shared(&self, handle: BufferHandle) -> Option<Arc<SampleBuffer>> {
        self.buffers.get(handle.0).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<&SampleBuffer> {
        self.by_name.get(name).and_then(|h| self.get(*h))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleBuffer> {
        self.buffers.iter().map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Clear every buffer; observers receive `Cleared`
    pub fn clear_all(&self) {
        for buffer in &self.buffers {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = BufferRegistry::new();
        let x = registry.insert("x", 0).unwrap();
        let t = registry.insert("t", 10).unwrap();

        assert_eq!(registry.handle("x").unwrap(), x);
        assert_eq!(registry.get(t).unwrap().memory_count(), Some(10));
        assert!(registry.get(x).unwrap().memory_count().is_none());
        assert!(matches!(
            registry.handle("missing"),
            Err(StreamError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = BufferRegistry::new();
        registry.insert("x", 0).unwrap();
        assert!(matches!(
            registry.insert("x", 5),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_clear_all() {
        let configs = vec![
            BufferConfig {
                name: "a".to_string(),
                size: 0,
            },
            BufferConfig {
                name: "b".to_string(),
                size: 2,
            },
        ];
        let registry = BufferRegistry::from_configs(&configs).unwrap();
        registry.by_name("a").unwrap().append(1.0);
        registry.by_name("b").unwrap().append(2.0);

        registry.clear_all();
        assert!(registry.iter().all(|b| b.is_empty()));
    }
}
