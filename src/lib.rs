pub mod context;
pub mod errors;
pub mod patterns;
pub mod pipeline;
pub mod recency;
pub mod template;

use rand::Rng;
use serde_json::{json, Value};

use context::Pool;
use errors::Result;
use patterns::Registry;

/// Composes one status message per cycle: prunes patterns already covered
/// by recent messages, expands the rest over the candidate pool and picks
/// one rendered candidate at random. Pure with respect to I/O; fetching
/// recent messages and posting live behind [`pipeline::Channel`].
pub struct Composer {
    registry: Registry,
    extra: Value,
}

impl Composer {
    /// `extra` carries the global, pattern-independent fields (for example
    /// the service url). Record fields shadow it on collision.
    pub fn new(registry: Registry, extra: Value) -> Self {
        Self { registry, extra }
    }

    /// Run the pure part of a cycle against an already-fetched list of
    /// recent messages. Mutates the pool through retraction. Returns the
    /// chosen message, or `None` when nothing is left to post.
    pub fn compose<R: Rng>(
        &self,
        recent: &[String],
        pool: &mut Pool,
        rng: &mut R,
    ) -> Option<String> {
        let remaining = recency::prune(recent, self.registry.patterns().to_vec(), pool);
        let options = pipeline::candidates(&remaining, pool, &self.extra);
        pipeline::select(&options, rng).cloned()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn extra(&self) -> &Value {
        &self.extra
    }
}

/// Convenience: compose with the built-in pattern set.
pub fn compose<R: Rng>(
    service_url: &str,
    recent: &[String],
    pool: &mut Pool,
    rng: &mut R,
) -> Result<Option<String>> {
    let composer = Composer::new(Registry::with_builtins()?, json!({"service_url": service_url}));
    Ok(composer.compose(recent, pool, rng))
}

/// Re-export the most-used pieces for callers that wire their own cycle.
pub use context::annotate_pool;
pub use errors::ComposeError;
pub use patterns::{round_with_direction, Direction, Pattern};
pub use pipeline::{run_cycle, Channel};
pub use template::{FieldSpec, Template};
