//! Process-wide cache of the RFC 1123 `Date` header value.
//!
//! Formatting the date on every response is measurable on the hot path,
//! so the server refreshes a shared pre-formatted string about once a
//! second and responses just copy it. Publication swaps an `Arc` so
//! readers can never observe a torn value.

use std::{
    sync::{Arc, RwLock},
    time::{Duration, SystemTime},
};

static HTTP_DATE: RwLock<Option<Arc<[u8]>>> = RwLock::new(None);

/// The current pre-formatted date bytes, e.g.
/// `Sun, 02 Aug 2026 12:00:00 GMT`. Formats on the spot if the refresher
/// has not run yet.
pub(crate) fn current() -> Arc<[u8]> {
    let published = HTTP_DATE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();

    match published {
        Some(date) => date,
        None => refresh(),
    }
}

pub(crate) fn refresh() -> Arc<[u8]> {
    let formatted = httpdate::fmt_http_date(SystemTime::now());
    let date: Arc<[u8]> = Arc::from(formatted.into_bytes());

    *HTTP_DATE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(date.clone());
    date
}

/// Keeps the published date fresh. Spawned once per server.
pub(crate) async fn refresh_loop() {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tick.tick().await;
        refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn rfc1123_shape() {
        let date = current();
        let text = str_op(&date);

        // "Sun, 02 Aug 2026 12:00:00 GMT"
        assert_eq!(text.len(), 29);
        assert!(text.ends_with(" GMT"));
        assert_eq!(&text[3..5], ", ");
    }

    #[test]
    fn refresh_publishes() {
        let refreshed = refresh();
        assert_eq!(current(), refreshed);
    }
}
