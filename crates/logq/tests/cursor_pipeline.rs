//! Integration tests for the full query pipeline.
//!
//! Records are appended through [`RecordBuffer`], compiled expressions are
//! applied per stream, and the cursor merges everything back into one
//! time-ordered view.

use logq::{
    CompileOptions, Cursor, CursorOptions, EventIterator, LogEvent, Predicate, QueryError,
    RecordBuffer, RecordSource, SourceBinding, TagLine, compile_expression,
    compile_expression_with,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

// ==================== Helper Functions ====================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_buffer(events: &[(i64, &str)]) -> RecordBuffer {
    let buffer = RecordBuffer::new();
    for (ts, msg) in events {
        buffer.append(&LogEvent::new(*ts, *msg));
    }
    buffer
}

fn bind(tags: &str, buffer: &RecordBuffer) -> SourceBinding {
    SourceBinding::new(
        TagLine::parse(tags).expect("failed to parse tags in test setup"),
        buffer.reader(),
    )
}

fn run(sources: Vec<SourceBinding>, expr: &str, options: &CursorOptions) -> Vec<(i64, String, String)> {
    let predicate = compile_expression(expr).expect("failed to compile expression in test setup");
    let mut cursor = Cursor::new(sources, predicate, options).expect("failed to build cursor");
    let token = CancellationToken::new();

    cursor
        .iter(&token)
        .map(|item| {
            let (event, tags) = item.expect("cursor failed");
            (event.timestamp(), tags.to_string(), event.message().to_string())
        })
        .collect()
}

fn cluster() -> (RecordBuffer, RecordBuffer, RecordBuffer) {
    let web = make_buffer(&[
        (100, "GET /index 200"),
        (130, "GET /healthz 200"),
        (170, "POST /login 500"),
    ]);
    let api = make_buffer(&[
        (110, "GET /v1/users 200"),
        (130, "GET /v1/orders 503"),
        (190, "GET /healthz 200"),
    ]);
    let db = make_buffer(&[(120, "checkpoint complete"), (175, "deadlock detected")]);
    (web, api, db)
}

fn cluster_sources() -> Vec<SourceBinding> {
    let (web, api, db) = cluster();
    vec![
        bind("app=web,env=prod", &web),
        bind("app=api,env=prod", &api),
        bind("app=db,env=staging", &db),
    ]
}

// ==================== Single Stream ====================

#[test]
fn test_timestamp_or_message_match() {
    init_tracing();
    let buffer = make_buffer(&[
        (1, "asdfasdf"),
        (2, "as2df"),
        (3, "asd3f"),
        (4, "jjjj"),
        (5, "jjjjee"),
    ]);

    let seen = run(
        vec![bind("aaa=bbb", &buffer)],
        "ts = 4 OR msg contains 'asdf'",
        &CursorOptions::default(),
    );
    assert_eq!(
        seen,
        vec![
            (1, "aaa=bbb".to_string(), "asdfasdf".to_string()),
            (4, "aaa=bbb".to_string(), "jjjj".to_string()),
        ]
    );
}

// ==================== Querying Across Streams ====================

#[test]
fn test_merge_is_time_ordered_with_stable_ties() {
    init_tracing();
    let seen = run(cluster_sources(), "", &CursorOptions::default());

    let order: Vec<(i64, &str)> = seen.iter().map(|(ts, tags, _)| (*ts, tags.as_str())).collect();
    assert_eq!(
        order,
        vec![
            (100, "app=web,env=prod"),
            (110, "app=api,env=prod"),
            (120, "app=db,env=staging"),
            (130, "app=web,env=prod"),
            (130, "app=api,env=prod"),
            (170, "app=web,env=prod"),
            (175, "app=db,env=staging"),
            (190, "app=api,env=prod"),
        ]
    );
}

#[test]
fn test_tag_and_message_filters() {
    init_tracing();
    let seen = run(
        cluster_sources(),
        "env = 'prod' AND NOT msg contains 'healthz' AND (msg contains ' 5' OR app = 'web')",
        &CursorOptions::default(),
    );
    let messages: Vec<&str> = seen.iter().map(|(_, _, msg)| msg.as_str()).collect();
    assert_eq!(
        messages,
        vec!["GET /index 200", "GET /v1/orders 503", "POST /login 500"]
    );
}

#[test]
fn test_missing_tag_never_matches() {
    init_tracing();
    assert!(run(cluster_sources(), "region = 'eu'", &CursorOptions::default()).is_empty());
    assert!(run(cluster_sources(), "region != 'eu'", &CursorOptions::default()).is_empty());
}

#[test]
fn test_time_literals() {
    init_tracing();
    // 1970-01-01T00:00:00.000000150Z is 150ns after the epoch.
    let seen = run(
        cluster_sources(),
        "ts >= '1970-01-01T00:00:00.000000150Z'",
        &CursorOptions::default(),
    );
    let stamps: Vec<i64> = seen.iter().map(|(ts, _, _)| *ts).collect();
    assert_eq!(stamps, vec![170, 175, 190]);
}

#[test]
fn test_window_and_limit() {
    init_tracing();
    let options = CursorOptions::default()
        .with_start_at(110)
        .with_end_before(180)
        .with_limit(4);
    let seen = run(cluster_sources(), "", &options);
    let stamps: Vec<i64> = seen.iter().map(|(ts, _, _)| *ts).collect();
    assert_eq!(stamps, vec![110, 120, 130, 130]);
}

#[test]
fn test_options_from_json_config() {
    init_tracing();
    let options: CursorOptions =
        serde_json::from_str(r#"{"start_at": 170, "limit": 2}"#).expect("valid config");
    let seen = run(cluster_sources(), "", &options);
    let stamps: Vec<i64> = seen.iter().map(|(ts, _, _)| *ts).collect();
    assert_eq!(stamps, vec![170, 175]);
}

// ==================== Compile Errors ====================

#[test]
fn test_compile_errors_abort_setup() {
    let err = compile_expression("ts = 4 OR").expect_err("syntax error");
    assert!(err.is_compile_error());
    assert!(matches!(err, QueryError::Syntax { .. }));

    let err = compile_expression("msg > 'a'").expect_err("type error");
    assert!(matches!(err, QueryError::Type { position: 0, .. }));

    let tight = CompileOptions::default().with_max_length(8);
    let err = compile_expression_with("msg contains 'x'", &tight).expect_err("too long");
    assert!(err.is_compile_error());
}

// ==================== Tailing ====================

#[test]
fn test_fresh_cursor_sees_appended_records() {
    init_tracing();
    let buffer = make_buffer(&[(1, "boot")]);
    let token = CancellationToken::new();

    let mut first = Cursor::new(
        vec![bind("app=web", &buffer)],
        Predicate::always(),
        &CursorOptions::default(),
    )
    .expect("cursor");
    assert_eq!(first.iter(&token).count(), 1);

    buffer.append(&LogEvent::new(2, "ready"));
    let mut second = Cursor::new(
        vec![bind("app=web", &buffer)],
        Predicate::always(),
        &CursorOptions::default(),
    )
    .expect("cursor");
    assert_eq!(second.iter(&token).count(), 2);
}

#[test]
fn test_custom_source_through_cursor() {
    /// Counts down from `n` to 1, one event per second of nanoseconds.
    struct Countdown {
        n: i64,
    }

    impl RecordSource for Countdown {
        fn advance(&mut self, _token: &CancellationToken) {
            self.n = (self.n - 1).max(0);
        }

        fn get(&mut self, _token: &CancellationToken) -> logq::Result<Option<logq::Record>> {
            if self.n == 0 {
                return Ok(None);
            }
            Ok(Some(logq::encode(&LogEvent::new(
                (10 - self.n) * 1_000_000_000,
                format!("t-{}", self.n),
            ))))
        }
    }

    let token = CancellationToken::new();
    let predicate = compile_expression("msg != 't-2'").expect("compile");
    let mut cursor = Cursor::new(
        vec![SourceBinding::new(TagLine::empty(), Countdown { n: 3 })],
        predicate,
        &CursorOptions::default(),
    )
    .expect("cursor");

    let mut messages = Vec::new();
    while let Some((event, _)) = cursor.get(&token).expect("get") {
        messages.push(event.message().to_string());
        cursor.advance(&token).expect("advance");
    }
    assert_eq!(messages, vec!["t-3", "t-1"]);
}

// ==================== Properties ====================

fn stream_strategy() -> impl Strategy<Value = Vec<(i64, String)>> {
    proptest::collection::vec((0i64..50, "[a-c]{0,3}"), 0..15).prop_map(|mut events| {
        events.sort_by_key(|(ts, _)| *ts);
        events
    })
}

proptest! {
    #[test]
    fn prop_merge_is_sorted_and_complete(
        streams in proptest::collection::vec(stream_strategy(), 0..5),
        needle in "[a-c]{0,1}",
    ) {
        let sources: Vec<SourceBinding> = streams
            .iter()
            .enumerate()
            .map(|(idx, stream)| {
                let buffer = RecordBuffer::new();
                for (ts, msg) in stream {
                    buffer.append(&LogEvent::new(*ts, msg.clone()));
                }
                bind(&format!("idx={idx}"), &buffer)
            })
            .collect();

        let expr = if needle.is_empty() {
            String::new()
        } else {
            format!("msg contains '{needle}'")
        };
        let seen = run(sources, &expr, &CursorOptions::default());

        // Expected: stable sort of all matches by (timestamp, registration index).
        let mut expected: Vec<(i64, usize, String)> = streams
            .iter()
            .enumerate()
            .flat_map(|(idx, stream)| {
                stream.iter().map(move |(ts, msg)| (*ts, idx, msg.clone()))
            })
            .filter(|(_, _, msg)| msg.contains(needle.as_str()))
            .collect();
        expected.sort_by_key(|(ts, idx, _)| (*ts, *idx));

        let actual: Vec<(i64, String, String)> = seen;
        let expected: Vec<(i64, String, String)> = expected
            .into_iter()
            .map(|(ts, idx, msg)| (ts, format!("idx={idx}"), msg))
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
