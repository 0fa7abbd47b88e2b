//! Invariants of the merge and preparation stages

use digest_score_trainer::features::{
    DAYS_SINCE_SUBSCRIBED, IS_FEED, IS_NEWSLETTER, IS_SUBSCRIPTION, USER_CLICKED,
};
use digest_score_trainer::{merge, FeaturePreparer, NamedTables, Table, Value};
use proptest::prelude::*;

const BASE_COLUMNS: &[&str] = &[
    "user_id",
    "author",
    "site",
    "subscription",
    "subscription_type",
    "subscription_start_date",
    "original_url_host",
    "created_at",
    "user_clicked",
];

#[derive(Debug, Clone)]
struct Interaction {
    user: u8,
    author: Option<u8>,
    subscription: Option<String>,
    subscription_type: Option<String>,
    start_day: Option<u8>,
    created_day: u8,
    clicked: Option<bool>,
}

fn interaction() -> impl Strategy<Value = Interaction> {
    (
        0u8..6,
        proptest::option::of(0u8..4),
        proptest::option::of(prop_oneof![Just(String::new()), "[A-Za-z ]{1,12}"]),
        proptest::option::of(prop_oneof![
            Just("RSS".to_string()),
            Just("NEWSLETTER".to_string()),
            Just("rss".to_string()),
            "[A-Z]{0,8}",
        ]),
        proptest::option::of(1u8..28),
        1u8..28,
        proptest::option::of(any::<bool>()),
    )
        .prop_map(
            |(user, author, subscription, subscription_type, start_day, created_day, clicked)| {
                Interaction {
                    user,
                    author,
                    subscription,
                    subscription_type,
                    start_day,
                    created_day,
                    clicked,
                }
            },
        )
}

fn base_table(rows: &[Interaction]) -> Table {
    Table::from_rows(
        BASE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows.iter()
            .map(|r| {
                vec![
                    Value::from(format!("u{}", r.user)),
                    Value::from(r.author.map(|a| format!("author{a}"))),
                    Value::from("example.com"),
                    Value::from(r.subscription.clone()),
                    Value::from(r.subscription_type.clone()),
                    Value::from(r.start_day.map(|d| format!("2024-02-{d:02}"))),
                    Value::from("example.com"),
                    Value::from(format!("2024-02-{:02}T09:00:00Z", r.created_day)),
                    Value::from(r.clicked),
                ]
            })
            .collect(),
    )
    .unwrap()
}

fn author_preferences() -> Table {
    let rows = (0..6)
        .flat_map(|u| (0..4).map(move |a| (u, a)))
        .map(|(u, a)| {
            vec![
                Value::from(format!("u{u}")),
                Value::from(format!("author{a}")),
                Value::Int(u * 4 + a),
                Value::Float(((u + a) % 3) as f64 / 2.0),
            ]
        })
        .collect();
    Table::from_rows(
        vec![
            "user_id".into(),
            "author".into(),
            "user_author_save_count".into(),
            "user_author_click_rate".into(),
        ],
        rows,
    )
    .unwrap()
}

fn derived_preparer() -> FeaturePreparer {
    FeaturePreparer::new(
        [
            IS_SUBSCRIPTION,
            "has_author",
            DAYS_SINCE_SUBSCRIBED,
            IS_FEED,
            IS_NEWSLETTER,
            "user_author_save_count",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    )
}

proptest! {
    #[test]
    fn unrecognised_tables_are_skipped(
        rows in proptest::collection::vec(interaction(), 0..30),
        name in "[a-z_]{1,20}",
    ) {
        prop_assume!(!["author", "site", "subscription", "original_url_host"]
            .iter()
            .any(|k| name.contains(k)));

        let base = base_table(&rows);
        let mut prefs = NamedTables::new();
        prefs.insert(name, author_preferences());

        let merged = merge(base.clone(), &prefs).unwrap();
        prop_assert_eq!(merged.row_count(), base.row_count());
        prop_assert_eq!(merged.columns, base.columns);
    }

    #[test]
    fn prepared_rows_hold_invariants(rows in proptest::collection::vec(interaction(), 1..60)) {
        let mut prefs = NamedTables::new();
        prefs.insert("user_author_features".into(), author_preferences());
        let merged = merge(base_table(&rows), &prefs).unwrap();

        let (x, y) = derived_preparer().prepare(merged).unwrap();

        let labelled: Vec<&Interaction> = rows.iter().filter(|r| r.clicked.is_some()).collect();
        prop_assert_eq!(x.len(), labelled.len());
        prop_assert_eq!(y.len(), labelled.len());

        let is_subscription = x.column(IS_SUBSCRIPTION).unwrap();
        let days = x.column(DAYS_SINCE_SUBSCRIBED).unwrap();
        let is_feed = x.column(IS_FEED).unwrap();
        let is_newsletter = x.column(IS_NEWSLETTER).unwrap();

        for (i, row) in labelled.iter().enumerate() {
            prop_assert!(days[i] >= 0.0);
            prop_assert_eq!(days[i].fract(), 0.0);

            let subscribed = row.subscription.as_deref().is_some_and(|s| !s.is_empty());
            prop_assert_eq!(is_subscription[i], if subscribed { 1.0 } else { 0.0 });

            let kind = row.subscription_type.as_deref();
            prop_assert_eq!(is_feed[i], if kind == Some("RSS") { 1.0 } else { 0.0 });
            prop_assert_eq!(is_newsletter[i], if kind == Some("NEWSLETTER") { 1.0 } else { 0.0 });
            prop_assert!(is_feed[i] + is_newsletter[i] <= 1.0);

            prop_assert_eq!(y.values[i], u8::from(row.clicked == Some(true)));
        }
    }
}

#[test]
fn one_match_per_row_keeps_ten_rows_without_nulls() {
    let rows: Vec<Interaction> = (0..10)
        .map(|i| Interaction {
            user: i % 6,
            author: Some(i % 4),
            subscription: None,
            subscription_type: None,
            start_day: None,
            created_day: 10,
            clicked: Some(i % 2 == 0),
        })
        .collect();
    let mut prefs = NamedTables::new();
    prefs.insert("user_author_features".into(), author_preferences());

    let merged = merge(base_table(&rows), &prefs).unwrap();

    assert_eq!(merged.row_count(), 10);
    for column in ["user_author_save_count", "user_author_click_rate"] {
        assert!(merged.column(column).unwrap().iter().all(|v| !v.is_null()));
    }
}

#[test]
fn duplicate_preference_keys_fan_out() {
    let base = Table::from_rows(
        vec!["user_id".into(), "author".into()],
        vec![vec!["u1".into(), "ann".into()]],
    )
    .unwrap();
    let side = Table::from_rows(
        vec!["user_id".into(), "author".into(), "user_author_save_count".into()],
        vec![
            vec!["u1".into(), "ann".into(), Value::Int(1)],
            vec!["u1".into(), "ann".into(), Value::Int(2)],
        ],
    )
    .unwrap();
    let mut prefs = NamedTables::new();
    prefs.insert("user_author_features".into(), side);

    let merged = merge(base, &prefs).unwrap();
    assert_eq!(merged.row_count(), 2);
    assert_eq!(
        merged.column("user_author_save_count").unwrap(),
        vec![&Value::Int(1), &Value::Int(2)]
    );
}

#[test]
fn merge_and_prepare_are_deterministic() {
    let rows: Vec<Interaction> = (0..100u32)
        .map(|i| Interaction {
            user: (i * 7 % 6) as u8,
            author: (i % 5 != 0).then_some((i % 4) as u8),
            subscription: (i % 3 == 0).then(|| "Weekly Notes".to_string()),
            subscription_type: Some(if i % 2 == 0 { "RSS" } else { "NEWSLETTER" }.to_string()),
            start_day: (i % 4 != 0).then_some((1 + i % 27) as u8),
            created_day: (1 + (i * 13) % 27) as u8,
            clicked: (i % 9 != 0).then_some(i % 3 == 1),
        })
        .collect();
    let mut prefs = NamedTables::new();
    prefs.insert("user_author_features".into(), author_preferences());
    prefs.insert("user_site_features".into(), {
        Table::from_rows(
            vec!["user_id".into(), "site".into(), "user_site_save_count".into()],
            vec![vec!["u1".into(), "example.com".into(), Value::Int(3)]],
        )
        .unwrap()
    });

    let run = || {
        let sampled =
            digest_score_trainer::sample(&base_table(&rows), 0.95, digest_score_trainer::loader::SAMPLE_SEED)
                .unwrap();
        let merged = merge(sampled, &prefs).unwrap();
        derived_preparer().prepare(merged).unwrap()
    };

    let (x1, y1) = run();
    let (x2, y2) = run();
    assert_eq!(x1, x2);
    assert_eq!(y1, y2);
    assert_eq!(y1.name, USER_CLICKED);
    assert!(!x1.is_empty());
}
