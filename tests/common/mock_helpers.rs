//! Mock construction helpers

use port_logger::pipeline::StoreFactory;
use port_logger::sink::{LogStore, MemoryLogStore, MemoryLogView};
#[cfg(feature = "mock-source")]
use port_logger::source::MockLineSource;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Views onto every store a [`memory_store_factory`] has created, in order
#[derive(Clone, Default)]
pub struct CreatedStores {
    views: Arc<Mutex<Vec<MemoryLogView>>>,
}

impl CreatedStores {
    pub fn count(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    /// View of the `index`-th store
    pub fn get(&self, index: usize) -> MemoryLogView {
        self.views.lock().unwrap()[index].clone()
    }

    /// Lines of the first store
    pub fn first_lines(&self) -> Vec<String> {
        self.views
            .lock()
            .unwrap()
            .first()
            .map(|v| v.lines())
            .unwrap_or_default()
    }
}

/// Factory handing out in-memory stores named `mem-1`, `mem-2`, ...
///
/// With `capacity`, every store fails writes after that many lines.
pub fn memory_store_factory(capacity: Option<usize>) -> (StoreFactory, CreatedStores) {
    let created = CreatedStores::default();
    let views = Arc::clone(&created.views);
    let factory: StoreFactory = Box::new(move || {
        let mut views = views.lock().unwrap();
        let (store, view) = MemoryLogStore::new(format!("mem-{}", views.len() + 1));
        let store = match capacity {
            Some(lines) => store.with_capacity_limit(lines),
            None => store,
        };
        views.push(view);
        Ok(Box::new(store) as Box<dyn LogStore>)
    });
    (factory, created)
}

/// Mock source with a short read timeout
#[cfg(feature = "mock-source")]
pub fn fast_mock(identity: &str) -> MockLineSource {
    MockLineSource::new(identity).with_read_timeout(Duration::from_millis(2))
}
