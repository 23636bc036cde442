//! Hook registries: ordered chains of plugin handlers.
//!
//! A hook is a named extension point. Plugins tap it with handlers, and the
//! owner invokes it with an argument. Handlers always run in tap order, one
//! at a time. For a [`HookKind::SeriesBail`] hook the first handler that
//! returns [`HookOutcome::Bail`] ends the chain; a failing handler ends it
//! for every kind.

use crate::errors::{BuildflowError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Result of a single handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome<R> {
    /// The handler did not claim the call; later handlers run.
    Continue,
    /// The handler claimed the call with a definite result.
    Bail(R),
}

impl<R> HookOutcome<R> {
    /// Returns true if this outcome ends a bail chain.
    #[must_use]
    pub fn is_definite(&self) -> bool {
        matches!(self, Self::Bail(_))
    }
}

/// How a registry treats handler outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Every handler runs; outcomes are ignored.
    Series,
    /// Handlers run until one bails.
    SeriesBail,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series => write!(f, "series"),
            Self::SeriesBail => write!(f, "series_bail"),
        }
    }
}

/// A handler subscribed to a hook.
#[async_trait]
pub trait HookHandler<A, R>: Send + Sync {
    /// Handles one invocation.
    async fn call(&self, args: &A) -> anyhow::Result<HookOutcome<R>>;
}

/// Adapts a closure returning a boxed future into a [`HookHandler`].
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wraps the closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<A, R, F> HookHandler<A, R> for FnHandler<F>
where
    A: Send + Sync,
    R: Send,
    F: for<'a> Fn(&'a A) -> BoxFuture<'a, anyhow::Result<HookOutcome<R>>> + Send + Sync,
{
    async fn call(&self, args: &A) -> anyhow::Result<HookOutcome<R>> {
        (self.func)(args).await
    }
}

struct Tap<A, R> {
    name: String,
    handler: Arc<dyn HookHandler<A, R>>,
}

impl<A, R> Clone for Tap<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// An ordered chain of handlers for one extension point.
pub struct HookRegistry<A, R> {
    name: String,
    kind: HookKind,
    taps: RwLock<Vec<Tap<A, R>>>,
}

/// A hook whose handlers all run.
pub type SeriesHook<A> = HookRegistry<A, ()>;

/// A hook whose chain stops at the first definite result.
pub type BailHook<A, R> = HookRegistry<A, R>;

impl<A, R> HookRegistry<A, R>
where
    A: Send + Sync,
    R: Send,
{
    /// Creates an empty hook of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: HookKind) -> Self {
        Self {
            name: name.into(),
            kind,
            taps: RwLock::new(Vec::new()),
        }
    }

    /// Creates an empty series hook.
    #[must_use]
    pub fn series(name: impl Into<String>) -> Self {
        Self::new(name, HookKind::Series)
    }

    /// Creates an empty series-bail hook.
    #[must_use]
    pub fn series_bail(name: impl Into<String>) -> Self {
        Self::new(name, HookKind::SeriesBail)
    }

    /// Returns the hook name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hook kind.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// Appends a handler to the end of the chain.
    ///
    /// Tapping the same handler twice is allowed; it will run twice.
    pub fn tap(&self, name: impl Into<String>, handler: Arc<dyn HookHandler<A, R>>) {
        let name = name.into();
        trace!(hook = %self.name, tap = %name, "Tapped hook");
        self.taps.write().push(Tap { name, handler });
    }

    /// Appends a closure handler to the end of the chain.
    pub fn tap_fn<F>(&self, name: impl Into<String>, func: F)
    where
        A: 'static,
        R: 'static,
        F: for<'a> Fn(&'a A) -> BoxFuture<'a, anyhow::Result<HookOutcome<R>>>
            + Send
            + Sync
            + 'static,
    {
        self.tap(name, Arc::new(FnHandler::new(func)));
    }

    /// Appends a closure that returns an owned future.
    ///
    /// Convenient for handlers whose argument is cheap to clone.
    pub fn tap_async<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        A: Clone + 'static,
        R: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HookOutcome<R>>> + Send + 'static,
    {
        let func = Arc::new(func);
        self.tap_fn(name, move |args: &A| {
            let func = Arc::clone(&func);
            let args = args.clone();
            Box::pin(async move { func(args).await })
        });
    }

    /// Runs the chain.
    ///
    /// Returns the bailing handler's result for a series-bail hook, `None`
    /// when no handler bails or the hook is a series hook. A handler error
    /// stops the chain and is returned as [`BuildflowError::HookHandler`].
    pub async fn invoke(&self, args: &A) -> Result<Option<R>> {
        let taps = self.taps.read().clone();

        for tap in &taps {
            let outcome = tap
                .handler
                .call(args)
                .await
                .map_err(|e| BuildflowError::hook_handler(&self.name, &tap.name, e))?;

            if let (HookKind::SeriesBail, HookOutcome::Bail(result)) = (self.kind, outcome) {
                trace!(hook = %self.name, tap = %tap.name, "Hook bailed");
                return Ok(Some(result));
            }
        }

        Ok(None)
    }

    /// Returns the tap names in chain order.
    #[must_use]
    pub fn tap_names(&self) -> Vec<String> {
        self.taps.read().iter().map(|t| t.name.clone()).collect()
    }

    /// Returns the number of taps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.taps.read().len()
    }

    /// Returns true if nothing tapped the hook.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.taps.read().is_empty()
    }
}

impl<A, R> fmt::Debug for HookRegistry<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("taps", &self.taps.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        label: &'static str,
        outcome: HookOutcome<&'static str>,
    ) -> impl Fn(u32) -> BoxFuture<'static, anyhow::Result<HookOutcome<&'static str>>> {
        let log = Arc::clone(log);
        move |_| {
            let log = Arc::clone(&log);
            let outcome = outcome.clone();
            Box::pin(async move {
                log.lock().push(label.to_string());
                Ok(outcome)
            })
        }
    }

    #[tokio::test]
    async fn test_bail_skips_later_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook: BailHook<u32, &'static str> = HookRegistry::series_bail("probe");

        hook.tap_async("h1", recorder(&log, "h1", HookOutcome::Bail("first")));
        hook.tap_async("h2", recorder(&log, "h2", HookOutcome::Bail("second")));

        let result = hook.invoke(&7).await.unwrap();

        assert_eq!(result, Some("first"));
        assert_eq!(*log.lock(), vec!["h1".to_string()]);
    }

    #[tokio::test]
    async fn test_continue_runs_in_tap_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook: BailHook<u32, &'static str> = HookRegistry::series_bail("probe");

        hook.tap_async("a", recorder(&log, "a", HookOutcome::Continue));
        hook.tap_async("b", recorder(&log, "b", HookOutcome::Continue));
        hook.tap_async("c", recorder(&log, "c", HookOutcome::Bail("c")));

        let result = hook.invoke(&1).await.unwrap();

        assert_eq!(result, Some("c"));
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(hook.tap_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_none() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook: BailHook<u32, &'static str> = HookRegistry::series_bail("probe");
        hook.tap_async("a", recorder(&log, "a", HookOutcome::Continue));

        assert_eq!(hook.invoke(&1).await.unwrap(), None);

        let empty: BailHook<u32, ()> = HookRegistry::series_bail("empty");
        assert!(empty.is_empty());
        assert_eq!(empty.invoke(&1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_series_hook_ignores_bail() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook: HookRegistry<u32, &'static str> = HookRegistry::series("all");

        hook.tap_async("a", recorder(&log, "a", HookOutcome::Bail("a")));
        hook.tap_async("b", recorder(&log, "b", HookOutcome::Continue));

        assert_eq!(hook.invoke(&1).await.unwrap(), None);
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_stops_chain_and_propagates() {
        let later = Arc::new(AtomicUsize::new(0));
        let hook: BailHook<u32, ()> = HookRegistry::series_bail("deletePath");

        hook.tap_async("broken", |_| async {
            Err::<HookOutcome<()>, _>(anyhow::anyhow!("disk on fire"))
        });
        let later_clone = later.clone();
        hook.tap_async("after", move |_| {
            let later = later_clone.clone();
            async move {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(HookOutcome::Continue)
            }
        });

        let err = hook.invoke(&1).await.unwrap_err();

        match err {
            BuildflowError::HookHandler { hook, handler, .. } => {
                assert_eq!(hook, "deletePath");
                assert_eq!(handler, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_taps_both_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let hook: SeriesHook<()> = HookRegistry::series("twice");

        for _ in 0..2 {
            let count = count.clone();
            hook.tap_async("same", move |()| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(HookOutcome::Continue)
                }
            });
        }

        hook.invoke(&()).await.unwrap();
        assert_eq!(hook.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_borrowing_handler() {
        struct PrefixCheck;

        #[async_trait]
        impl HookHandler<String, usize> for PrefixCheck {
            async fn call(&self, args: &String) -> anyhow::Result<HookOutcome<usize>> {
                if args.starts_with("keep") {
                    Ok(HookOutcome::Bail(args.len()))
                } else {
                    Ok(HookOutcome::Continue)
                }
            }
        }

        let hook: BailHook<String, usize> = HookRegistry::series_bail("check");
        hook.tap("prefix", Arc::new(PrefixCheck));

        assert_eq!(hook.invoke(&"keep-me".to_string()).await.unwrap(), Some(7));
        assert_eq!(hook.invoke(&"drop".to_string()).await.unwrap(), None);
    }

    #[test]
    fn test_hook_kind_display() {
        assert_eq!(HookKind::Series.to_string(), "series");
        assert_eq!(HookKind::SeriesBail.to_string(), "series_bail");
        assert!(HookOutcome::Bail(1).is_definite());
        assert!(!HookOutcome::<u8>::Continue.is_definite());
    }
}
