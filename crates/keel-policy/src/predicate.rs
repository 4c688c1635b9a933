// predicate.rs — Registered custom predicates.
//
// Rules are plain data loaded from configuration, so they cannot hold
// closures. A rule names a predicate by id instead, and the engine resolves
// that id through a PredicateRegistry when it is built. Predicates cover
// cross-field logic the declarative criteria cannot express.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::RuleMatchContext;
use crate::error::PredicateError;

/// A custom predicate over the full tool-call context.
pub type PredicateFn = dyn Fn(&RuleMatchContext) -> Result<bool, PredicateError> + Send + Sync;

/// Predicate id: the URL looks like a checkout or payment flow.
pub const CHECKOUT_FLOW_URL: &str = "checkout_flow_url";

/// Predicate id: the URL looks like an email compose/send screen.
pub const EMAIL_COMPOSE_URL: &str = "email_compose_url";

const CHECKOUT_KEYWORDS: &[&str] = &["checkout", "payment", "cart", "order"];
const EMAIL_SEND_KEYWORDS: &[&str] = &["compose", "send", "reply", "forward"];

/// Lookup table from predicate id to predicate.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<PredicateFn>>,
}

impl PredicateRegistry {
    /// An empty registry. Rules naming any predicate will fail to load.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the predicates used by the built-in rule set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CHECKOUT_FLOW_URL, |ctx| {
            Ok(url_contains_any(ctx, CHECKOUT_KEYWORDS))
        });
        registry.register(EMAIL_COMPOSE_URL, |ctx| {
            Ok(url_contains_any(ctx, EMAIL_SEND_KEYWORDS))
        });
        registry
    }

    /// Register (or replace) a predicate under `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, predicate: F)
    where
        F: Fn(&RuleMatchContext) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.predicates.insert(id.into(), Arc::new(predicate));
    }

    pub fn get(&self, id: &str) -> Option<Arc<PredicateFn>> {
        self.predicates.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.predicates.contains_key(id)
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.predicates.keys().collect();
        ids.sort();
        f.debug_struct("PredicateRegistry").field("ids", &ids).finish()
    }
}

/// Case-insensitive substring test against the context URL.
/// No URL means no match.
fn url_contains_any(ctx: &RuleMatchContext, keywords: &[&str]) -> bool {
    match &ctx.url {
        Some(url) => {
            let url = url.to_lowercase();
            keywords.iter().any(|k| url.contains(k))
        }
        None => false,
    }
}
