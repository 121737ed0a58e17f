//! Label glyph metrics and the process-wide glyph cache.
//!
//! Glyph data is loaded once per process. Every mount asks the cache for a
//! [`GlyphLoad`]; while a load is in flight all callers share the same future,
//! and once it succeeds the result is kept for the rest of the session. A
//! failed load leaves the cache empty so the next request tries again.

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GlyphLoadError {
    #[error("glyph provider went away before resolving")]
    Cancelled,
    #[error("glyph data rejected: {0}")]
    Rejected(String),
}

/// Horizontal metrics for a font, in em units.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphSet {
    pub family: String,
    advances: HashMap<char, f32>,
    fallback_advance: f32,
    /// Cap height relative to the em box, used for glyph quad height.
    pub cap_height: f32,
}

impl GlyphSet {
    pub fn new(family: impl Into<String>, fallback_advance: f32, cap_height: f32) -> Self {
        Self {
            family: family.into(),
            advances: HashMap::new(),
            fallback_advance,
            cap_height,
        }
    }

    pub fn with_advance(mut self, ch: char, advance: f32) -> Self {
        self.advances.insert(ch, advance);
        self
    }

    /// Fixed-width metrics covering every character.
    pub fn monospace(advance: f32) -> Self {
        Self::new("monospace", advance, 0.7)
    }

    pub fn advance(&self, ch: char) -> f32 {
        self.advances
            .get(&ch)
            .copied()
            .unwrap_or(self.fallback_advance)
    }

    /// Width of a line of text in em units.
    pub fn measure(&self, text: &str) -> f32 {
        text.chars().map(|ch| self.advance(ch)).sum()
    }

    /// Reads the metrics out of a typeface JSON document (`glyphs.<char>.ha`,
    /// `resolution`, `boundingBox`).
    pub fn from_typeface_json(json: &str) -> Result<Self, GlyphLoadError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Typeface {
            #[serde(default)]
            family_name: String,
            resolution: f32,
            glyphs: HashMap<String, TypefaceGlyph>,
            #[serde(default)]
            bounding_box: Option<BoundingBox>,
        }

        #[derive(Deserialize)]
        struct TypefaceGlyph {
            ha: f32,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BoundingBox {
            y_max: f32,
        }

        let face: Typeface = serde_json::from_str(json)
            .map_err(|e| GlyphLoadError::Rejected(e.to_string()))?;
        if face.resolution <= 0.0 {
            return Err(GlyphLoadError::Rejected(
                "typeface resolution must be positive".into(),
            ));
        }

        let mut advances = HashMap::with_capacity(face.glyphs.len());
        for (key, glyph) in face.glyphs {
            let mut chars = key.chars();
            if let (Some(ch), None) = (chars.next(), chars.next()) {
                advances.insert(ch, glyph.ha / face.resolution);
            }
        }

        let fallback_advance = advances.get(&'x').copied().unwrap_or(0.55);
        let cap_height = face
            .bounding_box
            .map(|bb| (bb.y_max / face.resolution).clamp(0.3, 1.2))
            .unwrap_or(0.7);

        Ok(Self {
            family: face.family_name,
            advances,
            fallback_advance,
            cap_height,
        })
    }
}

pub type GlyphResult = Result<Arc<GlyphSet>, GlyphLoadError>;
pub type SharedGlyphFuture = Shared<BoxFuture<'static, GlyphResult>>;

/// Source of glyph metrics. Each load resolves once with a single success or
/// failure.
pub trait GlyphProvider: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<'static, Result<GlyphSet, GlyphLoadError>>;
}

/// Glyphs that are available immediately.
pub struct StaticGlyphs(pub GlyphSet);

impl GlyphProvider for StaticGlyphs {
    fn load(&self) -> BoxFuture<'static, Result<GlyphSet, GlyphLoadError>> {
        future::ready(Ok(self.0.clone())).boxed()
    }
}

type GlyphOutcome = Result<GlyphSet, GlyphLoadError>;

/// One pending delivery: whichever side arrives first creates the pair and
/// leaves the other half for its counterpart.
#[derive(Default)]
struct FeedSlot {
    tx: Option<oneshot::Sender<GlyphOutcome>>,
    rx: Option<oneshot::Receiver<GlyphOutcome>>,
    closed: bool,
}

/// Glyphs delivered later by the host through a [`GlyphFeed`].
///
/// Every load waits for the next delivery, so a rejected load can be followed
/// by a successful one on the same feed.
pub struct ChannelGlyphProvider {
    slot: Arc<Mutex<FeedSlot>>,
}

/// Sending half of [`ChannelGlyphProvider`]. Dropping it cancels any load
/// still waiting.
pub struct GlyphFeed {
    slot: Arc<Mutex<FeedSlot>>,
}

impl GlyphFeed {
    pub fn resolve(&self, glyphs: GlyphSet) {
        self.deliver(Ok(glyphs));
    }

    pub fn reject(&self, reason: impl Into<String>) {
        self.deliver(Err(GlyphLoadError::Rejected(reason.into())));
    }

    fn deliver(&self, outcome: GlyphOutcome) {
        let mut slot = self.slot.lock();
        let outcome = match slot.tx.take() {
            Some(tx) => match tx.send(outcome) {
                Ok(()) => return,
                // The waiting load was dropped; park the value for the next one.
                Err(outcome) => outcome,
            },
            None => outcome,
        };
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        slot.rx = Some(rx);
    }
}

impl Drop for GlyphFeed {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        slot.tx = None;
    }
}

pub fn glyph_channel() -> (GlyphFeed, ChannelGlyphProvider) {
    let slot = Arc::new(Mutex::new(FeedSlot::default()));
    (
        GlyphFeed {
            slot: Arc::clone(&slot),
        },
        ChannelGlyphProvider { slot },
    )
}

impl GlyphProvider for ChannelGlyphProvider {
    fn load(&self) -> BoxFuture<'static, Result<GlyphSet, GlyphLoadError>> {
        let mut slot = self.slot.lock();
        let rx = match slot.rx.take() {
            Some(rx) => rx,
            None if slot.closed => return future::ready(Err(GlyphLoadError::Cancelled)).boxed(),
            None => {
                let (tx, rx) = oneshot::channel();
                slot.tx = Some(tx);
                rx
            }
        };
        rx.map(|res| res.unwrap_or(Err(GlyphLoadError::Cancelled)))
            .boxed()
    }
}

/// What a mount gets back from [`GlyphCache::load`].
#[derive(Clone)]
pub enum GlyphLoad {
    Ready(Arc<GlyphSet>),
    Pending(SharedGlyphFuture),
}

impl GlyphLoad {
    /// Non-blocking check. `None` while the load is still in flight.
    pub fn poll_ready(&self) -> Option<GlyphResult> {
        match self {
            GlyphLoad::Ready(glyphs) => Some(Ok(Arc::clone(glyphs))),
            GlyphLoad::Pending(fut) => fut.clone().now_or_never(),
        }
    }
}

enum CacheState {
    Empty,
    Loading(SharedGlyphFuture),
    Ready(Arc<GlyphSet>),
}

#[derive(Clone)]
pub struct GlyphCache {
    state: Arc<Mutex<CacheState>>,
}

impl Default for GlyphCache {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::Empty)),
        }
    }
}

static GLOBAL_GLYPHS: LazyLock<GlyphCache> = LazyLock::new(GlyphCache::default);

impl GlyphCache {
    /// The cache shared by every board in this process.
    pub fn global() -> Self {
        GLOBAL_GLYPHS.clone()
    }

    pub fn load(&self, provider: &dyn GlyphProvider) -> GlyphLoad {
        let mut state = self.state.lock();
        match &*state {
            CacheState::Ready(glyphs) => return GlyphLoad::Ready(Arc::clone(glyphs)),
            CacheState::Loading(fut) => return GlyphLoad::Pending(fut.clone()),
            CacheState::Empty => {}
        }

        let slot = Arc::clone(&self.state);
        let fut = provider
            .load()
            .map(move |res| {
                let res = res.map(Arc::new);
                let mut state = slot.lock();
                *state = match &res {
                    Ok(glyphs) => CacheState::Ready(Arc::clone(glyphs)),
                    Err(_) => CacheState::Empty,
                };
                res
            })
            .boxed()
            .shared();

        *state = CacheState::Loading(fut.clone());
        GlyphLoad::Pending(fut)
    }

    pub fn get(&self) -> Option<Arc<GlyphSet>> {
        match &*self.state.lock() {
            CacheState::Ready(glyphs) => Some(Arc::clone(glyphs)),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(&*self.state.lock(), CacheState::Loading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        outcome: Result<GlyphSet, GlyphLoadError>,
    }

    impl GlyphProvider for CountingProvider {
        fn load(&self) -> BoxFuture<'static, Result<GlyphSet, GlyphLoadError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            future::ready(self.outcome.clone()).boxed()
        }
    }

    #[test]
    fn concurrent_mounts_share_one_load() {
        let cache = GlyphCache::default();
        let (feed, provider) = glyph_channel();

        let first = cache.load(&provider);
        let second = cache.load(&provider);
        assert!(cache.is_loading());
        assert!(first.poll_ready().is_none());

        feed.resolve(GlyphSet::monospace(0.6));

        let GlyphLoad::Pending(fut) = second else {
            panic!("second mount should await the in-flight load");
        };
        let glyphs = block_on(fut).unwrap();
        assert_eq!(glyphs.family, "monospace");
        assert!(matches!(first.poll_ready(), Some(Ok(_))));
        assert!(matches!(cache.load(&provider), GlyphLoad::Ready(_)));
    }

    #[test]
    fn failed_load_can_be_retried() {
        let cache = GlyphCache::default();
        let failing = CountingProvider {
            calls: AtomicUsize::new(0),
            outcome: Err(GlyphLoadError::Rejected("404".into())),
        };

        let load = cache.load(&failing);
        assert!(matches!(load.poll_ready(), Some(Err(_))));
        assert!(cache.get().is_none());

        let working = CountingProvider {
            calls: AtomicUsize::new(0),
            outcome: Ok(GlyphSet::monospace(0.5)),
        };
        let load = cache.load(&working);
        assert!(matches!(load.poll_ready(), Some(Ok(_))));
        assert!(cache.get().is_some());

        cache.load(&working);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn feed_accepts_glyphs_after_a_rejection() {
        let cache = GlyphCache::default();
        let (feed, provider) = glyph_channel();

        let first = cache.load(&provider);
        feed.reject("font fetch failed");
        assert!(matches!(
            first.poll_ready(),
            Some(Err(GlyphLoadError::Rejected(_)))
        ));
        assert!(!cache.is_loading());

        let retry = cache.load(&provider);
        assert!(retry.poll_ready().is_none());
        feed.resolve(GlyphSet::monospace(0.6));
        assert!(matches!(retry.poll_ready(), Some(Ok(_))));
        assert!(cache.get().is_some());
    }

    #[test]
    fn delivery_before_the_load_is_kept() {
        let cache = GlyphCache::default();
        let (feed, provider) = glyph_channel();

        feed.resolve(GlyphSet::monospace(0.5));
        assert!(matches!(cache.load(&provider).poll_ready(), Some(Ok(_))));
    }

    #[test]
    fn dropping_the_feed_cancels_waiting_loads() {
        let cache = GlyphCache::default();
        let (feed, provider) = glyph_channel();

        let waiting = cache.load(&provider);
        drop(feed);
        assert!(matches!(
            waiting.poll_ready(),
            Some(Err(GlyphLoadError::Cancelled))
        ));
        assert!(matches!(
            cache.load(&provider).poll_ready(),
            Some(Err(GlyphLoadError::Cancelled))
        ));
    }

    #[test]
    fn typeface_metrics_are_normalized() {
        let json = r#"{
            "familyName": "Helvetiker",
            "resolution": 1000,
            "boundingBox": {"yMin": -200, "yMax": 800},
            "glyphs": {"a": {"ha": 500}, "W": {"ha": 900}, "x": {"ha": 480}}
        }"#;
        let glyphs = GlyphSet::from_typeface_json(json).unwrap();

        assert_eq!(glyphs.family, "Helvetiker");
        assert!((glyphs.advance('a') - 0.5).abs() < 1e-6);
        assert!((glyphs.advance('?') - 0.48).abs() < 1e-6);
        assert!((glyphs.measure("aW") - 1.4).abs() < 1e-6);
        assert!((glyphs.cap_height - 0.8).abs() < 1e-6);
    }
}
