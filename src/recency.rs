use std::sync::Arc;

use tracing::debug;

use crate::context::Pool;
use crate::patterns::Pattern;

/// Drop every pattern that explains one of the recently posted messages,
/// retracting the matched content from the pool as it goes.
///
/// Suppression is deliberately coarse: one historical match removes the
/// whole pattern for this cycle, not just the record it referred to.
/// A pattern matching several messages still retracts for each of them but
/// is removed from the remaining set only once.
pub fn prune(
    recent: &[String],
    patterns: Vec<Arc<dyn Pattern>>,
    pool: &mut Pool,
) -> Vec<Arc<dyn Pattern>> {
    let mut keep = vec![true; patterns.len()];
    for (i, pattern) in patterns.iter().enumerate() {
        for message in recent {
            if pattern.matches(message).is_some() {
                debug!(
                    template = pattern.template().source(),
                    "pattern already covered by a recent message"
                );
                pattern.retract(message, pool);
                keep[i] = false;
            }
        }
    }
    patterns
        .into_iter()
        .zip(keep)
        .filter_map(|(pattern, keep)| keep.then_some(pattern))
        .collect()
}
