use proptest::prelude::*;
use serde_json::json;
use status_patterns::context::merge_contexts;
use status_patterns::patterns::variants::StargazerMilestone;
use status_patterns::{FieldSpec, Pattern, Template};

proptest! {
    // The compiled matcher recognises exactly what the renderer produced,
    // capture group by capture group.
    #[test]
    fn render_then_match_round_trips(
        name in "[A-Za-z0-9_]{1,12}",
        url in "[A-Za-z0-9./_-]{1,24}",
        stars in 0i64..1_000_000,
    ) {
        let template = Template::compile(
            "Report for {name} at {url} ({stars} stargazers)",
            &FieldSpec::new(),
        ).unwrap();
        let ctx = merge_contexts(
            &json!({}),
            &json!({"name": name, "url": url, "stars": stars}),
        );

        let message = template.render(&ctx).unwrap();
        let caps = template.matches(&message).expect("must accept own output");
        prop_assert_eq!(caps.get(1).unwrap().as_str(), name.as_str());
        prop_assert_eq!(caps.get(2).unwrap().as_str(), url.as_str());
        prop_assert_eq!(caps.get(3).unwrap().as_str(), stars.to_string());
    }

    // Any starry record a milestone pattern accepts produces a message the
    // same pattern recognises.
    #[test]
    fn milestone_recognises_every_message_it_renders(
        name in "[A-Za-z0-9_-]{1,12}",
        stars in 50i64..10_000_000,
    ) {
        let extra = json!({"service_url": "reports.example.org"});
        let record = json!({"name": name, "url": "r.io/x", "stars": stars});
        for source in StargazerMilestone::TEMPLATES {
            let pattern = StargazerMilestone::new(source).unwrap();
            prop_assert!(pattern.condition(&record));
            let ctx = pattern.updated_context(&record);
            let message = pattern.render(&ctx, &extra).unwrap();
            prop_assert!(pattern.matches(&message).is_some(), "unrecognised: {}", message);
        }
    }
}
