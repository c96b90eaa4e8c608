use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use weblog_agent::aggregator::aggregator::MetricsMap;
use weblog_agent::aggregator::dimensions::DimensionEvent;
use weblog_agent::categorizer::categorizer::CategoryConfig;
use weblog_agent::filter::matcher::MatchRule;
use weblog_agent::helpers::load_config::{Config, TailerConfig, WebLogConfig};
use weblog_agent::weblog::weblog::{Collection, WebLog};
use weblog_agent::worker::control::WorkerState;

const SAMPLE: &str = r#"127.0.0.1 - - "GET /api/v1/foo HTTP/1.1" 200 512 0.012"#;

fn tailer_config() -> TailerConfig {
    TailerConfig {
        poll_interval_ms: 20,
        channel_capacity: 16,
        read_from_start: true,
    }
}

fn append(path: &Path, lines: &[&str]) {
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
}

fn api_job(path: &Path) -> WebLogConfig {
    let mut config = WebLogConfig::new(path);
    config.categories.push(CategoryConfig {
        name: "api".into(),
        rule: MatchRule::Prefix("/api".into()),
        field: None,
    });
    config.filter.expression = Some("status < 500".into());
    config
}

/// Collect repeatedly until `done` holds, gathering dimension events from
/// every intermediate collection.
async fn collect_until(job: &mut WebLog, what: &str, done: impl Fn(&MetricsMap) -> bool) -> Collection {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut dimensions = Vec::new();
    loop {
        let mut collection = job.collect().await.unwrap();
        dimensions.append(&mut collection.new_dimensions);
        if done(&collection.metrics) {
            collection.new_dimensions = dimensions;
            return collection;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn started(config: WebLogConfig) -> WebLog {
    let mut job = WebLog::init(config, &tailer_config()).await.unwrap();
    job.check().await.unwrap();
    assert_eq!(job.worker().state(), WorkerState::Running);
    job
}

#[tokio::test]
async fn sample_line_is_learned_categorized_and_timed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, &[SAMPLE]);

    let mut job = started(api_job(&path)).await;
    assert_eq!(job.pattern_name(), "untimed_custom3");

    let collection = collect_until(&mut job, "the sample line", |m| m["requests"] == 1).await;
    let m = &collection.metrics;

    assert_eq!(m["category_api_count"], 1);
    assert_eq!(m["url_uncategorized"], 0);
    assert_eq!(m["resp_2xx"], 1);
    assert_eq!(m["successful_requests"], 1);
    assert_eq!(m["bytes_sent"], 512);
    assert_eq!(m["category_api_resp_time_min"], 12_000);
    assert_eq!(m["category_api_resp_time_avg"], 12_000);
    assert_eq!(m["category_api_resp_time_max"], 12_000);
    assert_eq!(m["resp_time_avg"], 12_000);
    assert_eq!(m["resp_time_upstream_max"], 0);
    assert_eq!(m["unique_current_ipv4"], 1);

    for (chart, dimension) in [
        ("url_categories", "category_api_count"),
        ("response_codes", "resp_code_200"),
        ("http_methods", "req_method_GET"),
        ("http_versions", "req_http_1_1"),
    ] {
        assert!(
            collection.new_dimensions.contains(&DimensionEvent {
                chart_id: chart.into(),
                dimension_id: dimension.into(),
            }),
            "missing dimension {chart}/{dimension}"
        );
    }

    job.cleanup().await;
    assert_eq!(job.worker().state(), WorkerState::Stopped);
}

#[tokio::test]
async fn filtered_and_unmatched_lines_touch_only_their_counters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, &[SAMPLE]);

    let mut config = api_job(&path);
    config.histogram = Some(vec![10, 100]);
    let mut job = started(config).await;
    let first = collect_until(&mut job, "the sample line", |m| m["requests"] == 1).await;
    assert_eq!(first.metrics["resp_time_hist_bucket_100"], 1);

    append(
        &path,
        &[
            r#"127.0.0.1 - - "GET /api/v1/foo HTTP/1.1" 503 512 0.400"#,
            "this is not an access log line",
        ],
    );
    let second = collect_until(&mut job, "diagnostics", |m| {
        m["filtered"] == 1 && m["unmatched"] == 1
    })
    .await;

    let (a, b) = (&first.metrics, &second.metrics);
    for key in ["requests", "category_api_count", "resp_2xx", "resp_5xx", "bytes_sent"] {
        assert_eq!(a[key], b[key], "{key} changed");
    }
    assert_eq!(b["resp_5xx"], 0);
    assert_eq!(b["resp_time_max"], 0);
    assert_eq!(b["category_api_resp_time_max"], 0);
    // The filtered 400ms request would land in the overflow bucket.
    for bucket in ["10", "100", "inf"] {
        assert_eq!(b[&format!("resp_time_hist_bucket_{bucket}")], 0, "bucket {bucket}");
        assert_eq!(b[&format!("resp_time_upstream_hist_bucket_{bucket}")], 0, "upstream bucket {bucket}");
    }
    assert!(second.new_dimensions.is_empty());

    job.cleanup().await;
}

#[tokio::test]
async fn timing_resets_each_interval_but_counters_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, &[SAMPLE]);

    let mut config = api_job(&path);
    config.histogram = Some(vec![10, 100]);
    let mut job = started(config).await;

    let first = collect_until(&mut job, "the sample line", |m| m["requests"] == 1).await;
    assert_eq!(first.metrics["resp_time_hist_bucket_100"], 1);
    assert_eq!(first.metrics["resp_time_hist_bucket_10"], 0);

    let second = job.collect().await.unwrap();
    assert_eq!(second.metrics["requests"], 1);
    assert_eq!(second.metrics["category_api_count"], 1);
    assert_eq!(second.metrics["resp_time_max"], 0);
    assert_eq!(second.metrics["resp_time_hist_bucket_100"], 0);
    assert_eq!(second.metrics["unique_current_ipv4"], 0);
    assert_eq!(second.metrics["unique_all_time_ipv4"], 1);

    job.cleanup().await;
}

#[cfg(unix)]
#[tokio::test]
async fn rotated_log_is_followed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, &[SAMPLE]);

    let mut job = started(api_job(&path)).await;
    collect_until(&mut job, "the sample line", |m| m["requests"] == 1).await;

    std::fs::rename(&path, dir.path().join("access.log.1")).unwrap();
    append(&path, &[r#"10.1.1.1 - - "POST /home HTTP/2.0" 201 10 0.002"#]);

    let after = collect_until(&mut job, "the rotated file", |m| m["requests"] == 2).await;
    assert_eq!(after.metrics["tail_reopens"], 1);
    assert_eq!(after.metrics["url_uncategorized"], 1);
    assert_eq!(after.metrics["req_method_POST"], 1);
    assert_eq!(after.metrics["req_http_2_0"], 1);

    job.cleanup().await;
}

#[tokio::test]
async fn custom_format_with_user_categories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "").unwrap();

    let config = Config::from_toml_str(&format!(
        r#"
        [weblog]
        path = {path:?}
        custom_log_format = '$remote_addr "$request" $status $request_time $user_defined'
        all_time_ips = false

        [[weblog.user_categories]]
        name = "mobile"
        match = {{ substring = "iPhone" }}
        "#,
        path = path.display().to_string(),
    ))
    .unwrap();

    let mut job = started(config.weblog).await;
    assert_eq!(job.pattern_name(), "custom");
    assert_eq!(
        job.pattern_source(),
        r#"$remote_addr "$request" $status $request_time $user_defined"#
    );

    append(
        &path,
        &[
            r#"10.0.0.1 "GET / HTTP/1.1" 200 0.001 iPhone-app/3.2"#,
            r#"2001:db8::1 "GET / HTTP/1.1" 200 0.003 desktop"#,
        ],
    );
    let collection = collect_until(&mut job, "both lines", |m| m["requests"] == 2).await;
    let m = &collection.metrics;

    assert_eq!(m["user_category_mobile_count"], 1);
    assert_eq!(m["user_uncategorized"], 1);
    assert_eq!(m["req_ipv6"], 1);
    assert_eq!(m["unique_current_ipv6"], 1);
    assert!(!m.contains_key("unique_all_time_ipv6"));
    assert!(!m.contains_key("url_uncategorized"));
    assert!(collection.new_dimensions.contains(&DimensionEvent {
        chart_id: "user_categories".into(),
        dimension_id: "user_category_mobile_count".into(),
    }));

    job.cleanup().await;
}
