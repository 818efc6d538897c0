use std::sync::Arc;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::Pool;
use crate::errors::Result;
use crate::patterns::{Pattern, Registry};
use crate::recency::prune;

/// The posting collaborator. Listing recent messages and posting are the
/// only potentially blocking operations in a cycle; both sit behind this
/// seam so the core stays pure.
pub trait Channel {
    fn recent(&mut self) -> Result<Vec<String>>;
    fn post(&mut self, message: &str) -> Result<()>;
}

/// Expand (pattern × context) into rendered candidate strings. A render
/// that trips over a missing field skips that pair rather than aborting
/// the cycle. Duplicate renders collapse to one candidate.
pub fn candidates(patterns: &[Arc<dyn Pattern>], pool: &Pool, extra: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for pattern in patterns {
        for ctx in pattern.candidates(pool) {
            match pattern.render(&ctx, extra) {
                Ok(message) => out.push(message),
                Err(err) => {
                    debug!(
                        template = pattern.template().source(),
                        %err,
                        "skipping candidate that failed to render"
                    );
                }
            }
        }
    }
    out.into_iter().unique().collect()
}

/// Pick one candidate uniformly at random. An empty set is the normal
/// "nothing to post" outcome, not an error.
pub fn select<'a, R: Rng>(options: &'a [String], rng: &mut R) -> Option<&'a String> {
    options.choose(rng)
}

/// One full cycle: list recent messages, prune patterns they already cover,
/// expand and render the survivors, pick one and post it. Returns the
/// posted message, or `None` when there was nothing to post.
pub fn run_cycle<C: Channel, R: Rng>(
    channel: &mut C,
    pool: &mut Pool,
    registry: &Registry,
    extra: &Value,
    rng: &mut R,
) -> Result<Option<String>> {
    let recent = channel.recent()?;
    let remaining = prune(&recent, registry.patterns().to_vec(), pool);
    debug!(
        recent = recent.len(),
        patterns = remaining.len(),
        records = pool.len(),
        "pruned pattern set"
    );

    let options = candidates(&remaining, pool, extra);
    let Some(message) = select(&options, rng) else {
        info!("nothing to post");
        return Ok(None);
    };

    info!(%message, "posting");
    channel.post(message)?;
    Ok(Some(message.clone()))
}
