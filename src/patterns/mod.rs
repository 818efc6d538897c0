use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::context::{merge_contexts, Pool};
use crate::errors::Result;
use crate::template::{FieldSpec, Template};

/// Identity-bearing fields retraction is allowed to compare against pool
/// records. Everything else (derived statistics, qualifiers) is ignored.
const IDENTITY_FIELDS: &[&str] = &["uuid", "name", "url"];

/// A message pattern: one template plus the rules that decide which contexts
/// it applies to, how a context is adapted before rendering, and how a
/// historical message it produced maps back onto a pool record.
pub trait Pattern: Send + Sync {
    fn template(&self) -> &Template;

    /// Whether this pattern is suitable for the given context.
    fn condition(&self, _ctx: &Value) -> bool {
        true
    }

    /// Adapt the context before rendering. Must not mutate the input;
    /// derived fields go into a fresh copy.
    fn updated_context(&self, ctx: &Value) -> Value {
        ctx.clone()
    }

    /// Contexts this pattern offers for the current pool. The base treats
    /// the whole pool as one aggregate context; record-level patterns
    /// override this to iterate entries instead.
    fn candidates(&self, pool: &Pool) -> Vec<Value> {
        let ctx = Value::Object(pool.clone());
        if self.condition(&ctx) {
            vec![self.updated_context(&ctx)]
        } else {
            Vec::new()
        }
    }

    /// Fields whose captured text identifies a record for retraction.
    /// Empty by default: the base pattern carries no removable identity.
    fn retractable_fields(&self) -> &[&str] {
        &[]
    }

    fn matches<'t>(&self, text: &'t str) -> Option<regex::Captures<'t>> {
        self.template().matches(text)
    }

    /// Given a historical message this pattern produced, remove the record
    /// it referred to so it is not offered again this cycle. At most one
    /// record is removed; finding none is a silent no-op, since the pool
    /// drifts away from what was once posted.
    fn retract(&self, message: &str, pool: &mut Pool) {
        let caps = match self.matches(message) {
            Some(caps) => caps,
            None => return,
        };
        for (i, field) in self.template().fields().iter().enumerate() {
            if !self.retractable_fields().contains(&field.as_str()) {
                continue;
            }
            let captured = match caps.get(i + 1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let hit = pool.iter().find_map(|(id, record)| {
                (Template::render_field(field, record).as_deref() == Some(captured))
                    .then(|| id.clone())
            });
            if let Some(id) = hit {
                debug!(record = %id, field = %field, "retracting record covered by a recent message");
                pool.remove(&id);
                return;
            }
        }
    }

    /// Render against the global extra context merged with the specific one;
    /// context values shadow global values on collision.
    fn render(&self, ctx: &Value, extra: &Value) -> Result<String> {
        self.template().render(&merge_contexts(extra, ctx))
    }
}

/// How a rounded statistic sits relative to the true value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Below,
    Above,
    Exact,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Below => "less than",
            Direction::Above => "more than",
            Direction::Exact => "same as",
        }
    }

    /// Display qualifier placed in front of the rounded figure.
    pub fn qualifier(self) -> &'static str {
        match self {
            Direction::Below => "over ",
            Direction::Above => "nearly ",
            Direction::Exact => "",
        }
    }
}

/// Round a count to two significant figures and report which side of the
/// true value the rounded figure falls on.
pub fn round_with_direction(x: i64) -> (i64, Direction) {
    let rounded = round_sig(x);
    let direction = match rounded.cmp(&x) {
        Ordering::Less => Direction::Below,
        Ordering::Greater => Direction::Above,
        Ordering::Equal => Direction::Exact,
    };
    (rounded, direction)
}

fn round_sig(x: i64) -> i64 {
    if x < 100 {
        return x;
    }
    let mut factor = 1i64;
    let mut magnitude = x;
    while magnitude >= 100 {
        magnitude /= 10;
        factor *= 10;
    }
    let rem = x % factor;
    let base = x - rem;
    if rem * 2 >= factor {
        base + factor
    } else {
        base
    }
}

fn stat(ctx: &Value, key: &str) -> Option<i64> {
    ctx.get(key).and_then(Value::as_i64)
}

/// Candidate expansion shared by the record-level variants: one context per
/// pool record passing the condition.
fn per_record(pattern: &dyn Pattern, pool: &Pool) -> Vec<Value> {
    pool.values()
        .filter(|ctx| pattern.condition(ctx))
        .map(|ctx| pattern.updated_context(ctx))
        .collect()
}

/// Every known pattern, one instance per (variant, template) pair.
#[derive(Clone)]
pub struct Registry {
    patterns: Vec<Arc<dyn Pattern>>,
}

impl Registry {
    pub fn with_builtins() -> Result<Self> {
        let mut patterns: Vec<Arc<dyn Pattern>> = Vec::new();
        for source in variants::Promo::TEMPLATES {
            patterns.push(Arc::new(variants::Promo::new(source)?));
        }
        for source in variants::ReportPair::TEMPLATES {
            patterns.push(Arc::new(variants::ReportPair::new(source)?));
        }
        for source in variants::FreshReport::TEMPLATES {
            patterns.push(Arc::new(variants::FreshReport::new(source)?));
        }
        for source in variants::StargazerMilestone::TEMPLATES {
            patterns.push(Arc::new(variants::StargazerMilestone::new(source)?));
        }
        for source in variants::ForkMilestone::TEMPLATES {
            patterns.push(Arc::new(variants::ForkMilestone::new(source)?));
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[Arc<dyn Pattern>] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

pub mod variants {
    use super::*;

    /// Service promotion. Needs nothing from the pool; renders from the
    /// global context alone.
    pub struct Promo {
        template: Template,
    }

    impl Promo {
        pub const TEMPLATES: &'static [&'static str] = &[
            "We generate a report of repository metrics for any public repo. Try it out at {service_url}",
            "If you want to find out how your favourite repository is faring, take a look at {service_url}",
        ];

        pub fn new(source: &str) -> Result<Self> {
            Ok(Self {
                template: Template::compile(source, &FieldSpec::new())?,
            })
        }
    }

    impl Pattern for Promo {
        fn template(&self) -> &Template {
            &self.template
        }
    }

    /// Mentions the two top-starred repositories together. Only applies when
    /// the pool holds at least two records.
    pub struct ReportPair {
        template: Template,
    }

    impl ReportPair {
        pub const TEMPLATES: &'static [&'static str] =
            &["Recently generated reports for #{name_a} and #{name_b} on {service_url}"];

        pub fn new(source: &str) -> Result<Self> {
            Ok(Self {
                template: Template::compile(source, &FieldSpec::new())?,
            })
        }
    }

    impl Pattern for ReportPair {
        fn template(&self) -> &Template {
            &self.template
        }

        fn condition(&self, ctx: &Value) -> bool {
            ctx.as_object().map_or(false, |pool| pool.len() >= 2)
        }

        fn updated_context(&self, ctx: &Value) -> Value {
            let Some(pool) = ctx.as_object() else {
                return ctx.clone();
            };
            let mut records: Vec<&Value> = pool.values().collect();
            records.sort_by_key(|r| std::cmp::Reverse(stat(r, "stars").unwrap_or(0)));

            let mut out = pool.clone();
            for (slot, record) in ["name_a", "name_b"].iter().zip(records.iter()) {
                if let Some(name) = record.get("name") {
                    out.insert((*slot).to_string(), name.clone());
                }
            }
            Value::Object(out)
        }
    }

    /// One status per freshly reported repository.
    pub struct FreshReport {
        template: Template,
    }

    impl FreshReport {
        pub const TEMPLATES: &'static [&'static str] =
            &["Just generated a health report for {name} at {url}"];

        pub fn new(source: &str) -> Result<Self> {
            Ok(Self {
                template: Template::compile(source, &FieldSpec::new())?,
            })
        }
    }

    impl Pattern for FreshReport {
        fn template(&self) -> &Template {
            &self.template
        }

        fn candidates(&self, pool: &Pool) -> Vec<Value> {
            per_record(self, pool)
        }

        fn retractable_fields(&self) -> &[&str] {
            IDENTITY_FIELDS
        }
    }

    /// Celebrates repositories with a notable stargazer count.
    pub struct StargazerMilestone {
        template: Template,
    }

    impl StargazerMilestone {
        pub const TEMPLATES: &'static [&'static str] = &[
            "Just compiled a repo report for {name} - it now has {stars_over_or_nearly}{n_stargazers} stargazers!",
            "Did you know that {name} now has {stars_over_or_nearly}{n_stargazers} stargazers? Full report at {url}",
        ];

        const MIN_STARS: i64 = 50;

        pub fn new(source: &str) -> Result<Self> {
            let mut overrides = FieldSpec::new();
            overrides.insert("n_stargazers".to_string(), "[0-9]+".to_string());
            Ok(Self {
                template: Template::compile(source, &overrides)?,
            })
        }
    }

    impl Pattern for StargazerMilestone {
        fn template(&self) -> &Template {
            &self.template
        }

        fn condition(&self, ctx: &Value) -> bool {
            stat(ctx, "stars").map_or(false, |n| n >= Self::MIN_STARS)
        }

        fn updated_context(&self, ctx: &Value) -> Value {
            let Some(record) = ctx.as_object() else {
                return ctx.clone();
            };
            let mut out = record.clone();
            if let Some(n) = stat(ctx, "stars") {
                let (rounded, direction) = round_with_direction(n);
                out.insert("n_stargazers".to_string(), Value::from(rounded));
                out.insert(
                    "stars_over_or_nearly".to_string(),
                    Value::from(direction.qualifier()),
                );
            }
            Value::Object(out)
        }

        fn candidates(&self, pool: &Pool) -> Vec<Value> {
            per_record(self, pool)
        }

        fn retractable_fields(&self) -> &[&str] {
            IDENTITY_FIELDS
        }
    }

    /// Same idea for fork counts.
    pub struct ForkMilestone {
        template: Template,
    }

    impl ForkMilestone {
        pub const TEMPLATES: &'static [&'static str] =
            &["{name} now has {forks_over_or_nearly}{n_forks} forks! See the full report at {url}"];

        const MIN_FORKS: i64 = 50;

        pub fn new(source: &str) -> Result<Self> {
            let mut overrides = FieldSpec::new();
            overrides.insert("n_forks".to_string(), "[0-9]+".to_string());
            Ok(Self {
                template: Template::compile(source, &overrides)?,
            })
        }
    }

    impl Pattern for ForkMilestone {
        fn template(&self) -> &Template {
            &self.template
        }

        fn condition(&self, ctx: &Value) -> bool {
            stat(ctx, "forks").map_or(false, |n| n >= Self::MIN_FORKS)
        }

        fn updated_context(&self, ctx: &Value) -> Value {
            let Some(record) = ctx.as_object() else {
                return ctx.clone();
            };
            let mut out = record.clone();
            if let Some(n) = stat(ctx, "forks") {
                let (rounded, direction) = round_with_direction(n);
                out.insert("n_forks".to_string(), Value::from(rounded));
                out.insert(
                    "forks_over_or_nearly".to_string(),
                    Value::from(direction.qualifier()),
                );
            }
            Value::Object(out)
        }

        fn candidates(&self, pool: &Pool) -> Vec<Value> {
            per_record(self, pool)
        }

        fn retractable_fields(&self) -> &[&str] {
            IDENTITY_FIELDS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn rounding_anchors() {
        assert_eq!(round_with_direction(1234), (1200, Direction::Below));
        assert_eq!(round_with_direction(50), (50, Direction::Exact));
        assert_eq!(round_with_direction(1601), (1600, Direction::Below));
        assert_eq!(round_with_direction(150), (150, Direction::Exact));
        assert_eq!(round_with_direction(1272), (1300, Direction::Above));
    }

    #[test]
    fn direction_strings_and_qualifiers() {
        assert_eq!(Direction::Below.as_str(), "less than");
        assert_eq!(Direction::Below.qualifier(), "over ");
        assert_eq!(Direction::Above.qualifier(), "nearly ");
        assert_eq!(Direction::Exact.qualifier(), "");
    }

    #[test]
    fn registry_holds_one_pattern_per_variant_template() {
        let registry = Registry::with_builtins().unwrap();
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn milestone_derives_qualifier_fields() {
        let pattern = variants::ForkMilestone::new(variants::ForkMilestone::TEMPLATES[0]).unwrap();
        let extra = json!({"service_url": "reports.example.org"});

        for (forks, expected) in [
            (150, "octo now has 150 forks! See the full report at r.io/a"),
            (
                1601,
                "octo now has over 1600 forks! See the full report at r.io/a",
            ),
        ] {
            let ctx = json!({"name": "octo", "url": "r.io/a", "forks": forks});
            assert!(pattern.condition(&ctx));
            let ctx = pattern.updated_context(&ctx);
            let message = pattern.render(&ctx, &extra).unwrap();
            assert_eq!(message, expected);
            assert!(pattern.matches(&message).is_some());
        }
    }

    #[test]
    fn milestone_condition_gates_low_counts() {
        let pattern = variants::ForkMilestone::new(variants::ForkMilestone::TEMPLATES[0]).unwrap();
        assert!(!pattern.condition(&json!({"name": "octo", "forks": 9})));
        assert!(!pattern.condition(&json!({"name": "octo"})));
    }

    #[test]
    fn pair_pattern_picks_top_starred_names() {
        let pattern = variants::ReportPair::new(variants::ReportPair::TEMPLATES[0]).unwrap();
        let pool = json!({
            "x": {"name": "small", "stars": 3},
            "y": {"name": "big", "stars": 900},
            "z": {"name": "mid", "stars": 40},
        });
        assert!(pattern.condition(&pool));
        let ctx = pattern.updated_context(&pool);
        assert_eq!(ctx["name_a"], json!("big"));
        assert_eq!(ctx["name_b"], json!("mid"));
    }

    #[test]
    fn pair_pattern_needs_two_records() {
        let pattern = variants::ReportPair::new(variants::ReportPair::TEMPLATES[0]).unwrap();
        assert!(!pattern.condition(&json!({"x": {"name": "solo"}})));
    }

    #[test]
    fn base_retract_is_a_no_op() {
        let pattern = variants::Promo::new(variants::Promo::TEMPLATES[0]).unwrap();
        let mut pool = json!({"a": {"name": "octo"}})
            .as_object()
            .cloned()
            .unwrap();
        pattern.retract("anything", &mut pool);
        assert_eq!(pool.len(), 1);
    }
}
