//! Media Query Hook

use serde_json::{json, Value};

use super::context::{request_render, Context};
use super::kind::HookKind;
use crate::error::Result;

impl Context {
    /// Whether `query` currently matches. Without a [`MediaQueryList`]
    /// collaborator every query reports `false`.
    ///
    /// [`MediaQueryList`]: super::MediaQueryList
    pub fn use_media_query(&self, query: &str) -> Result<bool> {
        let matches = self.evaluate_query(query);
        let handle = self.registry.create_with(HookKind::MediaQuery, || {
            json!({ "query": query, "matches": matches }).into()
        })?;

        let stored = self.slot(handle)?;
        let payload = stored.as_value();
        let same_query = payload.and_then(|p| p.get("query")).and_then(Value::as_str) == Some(query);
        let same_result = payload.and_then(|p| p.get("matches")).and_then(Value::as_bool) == Some(matches);
        if !(same_query && same_result) {
            self.registry
                .patch(handle, json!({ "query": query, "matches": matches }))?;
        }
        Ok(matches)
    }

    /// Re-evaluate every media-query slot. Requests one render if any result
    /// changed, and returns whether one did.
    pub fn media_changed(&self) -> Result<bool> {
        let mut changed = false;
        for handle in self.registry.handles_by_kind(HookKind::MediaQuery) {
            let Some(data) = self.registry.read(handle) else {
                continue;
            };
            let Some(payload) = data.as_value() else {
                continue;
            };
            let Some(query) = payload.get("query").and_then(Value::as_str) else {
                continue;
            };

            let matches = self.evaluate_query(query);
            if payload.get("matches").and_then(Value::as_bool) != Some(matches) {
                self.registry.patch(handle, json!({ "matches": matches }))?;
                changed = true;
            }
        }

        if changed {
            tracing::debug!("media query result changed");
            request_render(&self.render_trigger);
        }
        Ok(changed)
    }

    fn evaluate_query(&self, query: &str) -> bool {
        self.media_queries
            .as_ref()
            .is_some_and(|media| media.matches(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookRegistry, MediaQueryList};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeMedia {
        matching: Mutex<HashSet<String>>,
    }

    impl MediaQueryList for FakeMedia {
        fn matches(&self, query: &str) -> bool {
            self.matching.lock().contains(query)
        }
    }

    #[test]
    fn media_change_triggers_a_single_render() {
        let media = Arc::new(FakeMedia::default());
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let cx = Context::builder(Arc::new(HookRegistry::new()))
            .media_queries(media.clone())
            .render_trigger(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let render = |cx: &Context| -> Result<(bool, bool)> {
            Ok((
                cx.use_media_query("(max-width: 600px)")?,
                cx.use_media_query("(prefers-color-scheme: dark)")?,
            ))
        };
        assert_eq!(cx.with_frame("m", render).unwrap(), (false, false));

        assert!(!cx.media_changed().unwrap());
        media.matching.lock().insert("(max-width: 600px)".into());
        media.matching.lock().insert("(prefers-color-scheme: dark)".into());
        assert!(cx.media_changed().unwrap());
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        assert_eq!(cx.with_frame("m", render).unwrap(), (true, true));
    }

    #[test]
    fn missing_provider_never_matches() {
        let cx = Context::builder(Arc::new(HookRegistry::new())).build();
        assert!(!cx.with_frame("m", |cx| cx.use_media_query("print")).unwrap());
    }
}
