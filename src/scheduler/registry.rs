//! Demand class registration and priority ordering.

use std::fmt;
use std::sync::Arc;

/// Zero-argument supplier for a concurrency limit, re-evaluated every tick.
pub type LimitSupplier = Arc<dyn Fn() -> usize + Send + Sync>;

/// Concurrency-limit policy for a demand class (or the global ceiling).
///
/// `Dynamic` suppliers are invoked fresh on every resolution so limits can
/// track runtime conditions (viewport count, connection quality) between
/// scheduling passes.
#[derive(Clone)]
pub enum ConcurrencyPolicy {
    Fixed(usize),
    Dynamic(LimitSupplier),
}

impl ConcurrencyPolicy {
    /// Build a dynamic policy from a closure.
    pub fn dynamic<F>(supplier: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(supplier))
    }

    /// Resolve the current limit. Never cached across calls.
    pub fn resolve(&self) -> usize {
        match self {
            Self::Fixed(limit) => *limit,
            Self::Dynamic(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(limit) => f.debug_tuple("Fixed").field(limit).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A named category of fetch requests with its own scheduling priority,
/// concurrency cap, and loader priority hint.
///
/// The scheduling `priority` orders queues against each other; `load_hint`
/// is the distinct value passed through to the loader gateway and may rank
/// classes differently (prefetch is queued above idle work but hinted below
/// interactive fetches).
#[derive(Debug, Clone)]
pub struct DemandClass {
    pub name: String,
    pub priority: i32,
    pub policy: ConcurrencyPolicy,
    pub load_hint: i32,
}

impl DemandClass {
    pub fn new(name: impl Into<String>, priority: i32, policy: ConcurrencyPolicy) -> Self {
        Self {
            name: name.into(),
            priority,
            policy,
            load_hint: 0,
        }
    }

    pub fn with_load_hint(mut self, hint: i32) -> Self {
        self.load_hint = hint;
        self
    }
}

/// Ordered catalog of demand classes, highest priority first.
///
/// Ties keep insertion order: a new entry lands before the first existing
/// entry with strictly lower priority. Re-registering a name replaces the
/// old entry rather than duplicating it.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<DemandClass>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self { classes: Vec::new() }
    }

    /// Insert or replace a class. A replaced class is re-positioned
    /// according to its (possibly changed) priority.
    pub fn register(&mut self, class: DemandClass) {
        self.classes.retain(|c| c.name != class.name);
        let position = self
            .classes
            .iter()
            .position(|c| c.priority < class.priority)
            .unwrap_or(self.classes.len());
        self.classes.insert(position, class);
    }

    pub fn get(&self, name: &str) -> Option<&DemandClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The ordered sequence the pump iterates each tick.
    pub fn classes_by_priority(&self) -> impl Iterator<Item = &DemandClass> {
        self.classes.iter()
    }

    /// Resolve the current concurrency limit for a class.
    pub fn resolve_limit(&self, name: &str) -> Option<usize> {
        self.get(name).map(|c| c.policy.resolve())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Standard class names matching the common viewer demand sources.
pub const INTERACTION: &str = "interaction";
pub const THUMBNAIL: &str = "thumbnail";
pub const PREFETCH: &str = "prefetch";
pub const AUTO_PREFETCH: &str = "auto_prefetch";

/// The default class set: interactive navigation, thumbnailing, prefetch,
/// and background auto-prefetch.
///
/// Caps for the first three are derived from the global ceiling N as
/// max(N,1), max(N-2,1) and max(N-1,1); auto-prefetch is pinned at 3.
pub fn standard_classes(ceiling: ConcurrencyPolicy) -> Vec<DemandClass> {
    let interaction = ceiling.clone();
    let thumbnail = ceiling.clone();
    let prefetch = ceiling;
    vec![
        DemandClass::new(
            INTERACTION,
            30,
            ConcurrencyPolicy::dynamic(move || interaction.resolve().max(1)),
        ),
        DemandClass::new(
            THUMBNAIL,
            20,
            ConcurrencyPolicy::dynamic(move || thumbnail.resolve().saturating_sub(2).max(1)),
        )
        .with_load_hint(5),
        DemandClass::new(
            PREFETCH,
            10,
            ConcurrencyPolicy::dynamic(move || prefetch.resolve().saturating_sub(1).max(1)),
        )
        .with_load_hint(-5),
        DemandClass::new(AUTO_PREFETCH, 0, ConcurrencyPolicy::Fixed(3)).with_load_hint(-5),
    ]
}
