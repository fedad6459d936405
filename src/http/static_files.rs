//! Per-thread cache of memory-mapped static files.

use crate::errors::Error;
use memmap2::Mmap;
use std::{cell::RefCell, collections::HashMap, fs::File};

thread_local! {
    // Per-worker ownership, no cross-thread synchronization. Entries
    // live until process exit.
    static STATIC_FILES: RefCell<HashMap<String, &'static [u8]>> =
        RefCell::new(HashMap::new());
}

/// Returns the mapped contents of `path`, opening and mapping it on the
/// first access from this thread. A path that cannot be opened is a 404.
pub(crate) fn mapped(path: &str) -> Result<&'static [u8], Error> {
    STATIC_FILES.with(|cache| {
        if let Some(&content) = cache.borrow().get(path) {
            return Ok(content);
        }

        let file = File::open(path).map_err(|_| Error::not_found("File not found."))?;
        // SAFETY: the mapping is read-only and immediately leaked, so the
        // pages stay valid for the remainder of the process.
        let map = unsafe { Mmap::map(&file) }.map_err(Error::Io)?;
        let leaked: &'static Mmap = Box::leak(Box::new(map));
        let content: &'static [u8] = leaked.as_ref();

        cache.borrow_mut().insert(path.to_owned(), content);
        Ok(content)
    })
}
