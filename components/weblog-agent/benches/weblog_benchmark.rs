use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use weblog_agent::aggregator::aggregator::{Aggregator, AggregatorConfig};
use weblog_agent::categorizer::categorizer::{CategoryConfig, CategoryKind, Categorizer};
use weblog_agent::filter::filter::{Filter, FilterConfig};
use weblog_agent::filter::matcher::MatchRule;
use weblog_agent::parser::candidates::DEFAULT_CANDIDATES;
use weblog_agent::parser::parser::LogParser;
use weblog_agent::worker::pipeline::Pipeline;

const COMBINED: &str = r#"192.168.10.4 - frank [10/Oct/2000:13:55:36 -0700] "GET /api/v1/users?id=42 HTTP/1.1" 200 2326 0.012 0.010"#;
const UNTIMED: &str = r#"127.0.0.1 - - "GET /api/v1/foo HTTP/1.1" 200 512 0.012"#;

fn pipeline() -> (Pipeline, Aggregator) {
    let parser = LogParser::learn(COMBINED, DEFAULT_CANDIDATES).unwrap();
    let filter = Filter::compile(&FilterConfig {
        exclude: Some(MatchRule::Suffix(".png".into())),
        expression: Some("status < 500 && method != OPTIONS".into()),
        ..Default::default()
    })
    .unwrap();

    let categories: Vec<_> = [("users", "/api/v1/users"), ("api", "/api"), ("static", "/static")]
        .iter()
        .map(|(name, prefix)| CategoryConfig {
            name: name.to_string(),
            rule: MatchRule::Prefix(prefix.to_string()),
            field: None,
        })
        .collect();
    let url = Categorizer::compile(CategoryKind::Url, &categories, "uri").unwrap();
    let user = Categorizer::compile(CategoryKind::User, &[], "user_defined").unwrap();

    let aggregator = Aggregator::new(
        &AggregatorConfig {
            histogram: Some(vec![1, 5, 10, 50, 100, 500]),
            ..Default::default()
        },
        &url,
        &user,
    )
    .unwrap();

    (Pipeline::new(parser, filter, url, user), aggregator)
}

fn bench_learn(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn");
    group.bench_function("custom2", |b| {
        b.iter(|| LogParser::learn(black_box(COMBINED), DEFAULT_CANDIDATES).unwrap())
    });
    // Last-but-one candidate, worst case for the ordered search.
    group.bench_function("untimed_custom3", |b| {
        b.iter(|| LogParser::learn(black_box(UNTIMED), DEFAULT_CANDIDATES).unwrap())
    });
    group.finish();
}

fn bench_process_line(c: &mut Criterion) {
    let (pipeline, mut aggregator) = pipeline();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));
    group.bench_function("parse", |b| {
        b.iter(|| pipeline.parser().parse(black_box(COMBINED)))
    });
    group.bench_function("process_line", |b| {
        b.iter(|| pipeline.process_line(black_box(COMBINED), &mut aggregator))
    });
    group.finish();
}

criterion_group!(benches, bench_learn, bench_process_line);
criterion_main!(benches);
