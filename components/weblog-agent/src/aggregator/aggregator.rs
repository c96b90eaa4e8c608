// Local crates
use crate::aggregator::{
    dimensions::{DimensionEvent, DimensionTracker},
    histogram::{Histogram, HistogramError},
    response::{RequestOutcome, ResponseClass},
    timing::TimingStat,
    unique_ips::UniqueIps,
};
use crate::categorizer::categorizer::{CategoryKind, Categorizer};
use crate::parser::fields::{ParsedFields, field};

// External crates
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Flat snapshot of every metric, keyed by metric name.
pub type MetricsMap = BTreeMap<String, i64>;

pub const RESP_TIME: &str = "resp_time";
pub const RESP_TIME_UPSTREAM: &str = "resp_time_upstream";

const CUMULATIVE_KEYS: &[&str] = &[
    "requests",
    "unmatched",
    "filtered",
    "tail_reopens",
    "tail_errors",
    "bytes_sent",
    "request_length",
    "req_ipv4",
    "req_ipv6",
    "resp_1xx",
    "resp_2xx",
    "resp_3xx",
    "resp_4xx",
    "resp_5xx",
    "resp_other",
];

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Group detailed response codes under one chart instead of one per class.
    pub response_codes_aggregate: bool,
    /// Keep a lifetime unique-IP set next to the per-interval one.
    pub all_time_ips: bool,
    /// Millisecond bucket bounds. `None` disables histograms.
    pub histogram: Option<Vec<u64>>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            response_codes_aggregate: true,
            all_time_ips: true,
            histogram: None,
        }
    }
}

/// Owner of all mutable statistics. Mutated only by the ingest task.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    response_codes_aggregate: bool,
    url_categories: bool,
    user_categories: bool,
    counters: BTreeMap<String, u64>,
    timings: BTreeMap<String, TimingStat>,
    histograms: BTreeMap<String, Histogram>,
    unique_ips: UniqueIps,
    dimensions: DimensionTracker,
}

impl Aggregator {
    pub fn new(
        config: &AggregatorConfig,
        url: &Categorizer,
        user: &Categorizer,
    ) -> Result<Self, HistogramError> {
        let mut counters: BTreeMap<String, u64> =
            CUMULATIVE_KEYS.iter().map(|k| (k.to_string(), 0)).collect();
        counters.extend(RequestOutcome::ALL.iter().map(|o| (o.metric_key().to_string(), 0)));

        let mut timings = BTreeMap::new();
        timings.insert(RESP_TIME.to_string(), TimingStat::default());
        timings.insert(RESP_TIME_UPSTREAM.to_string(), TimingStat::default());

        for categorizer in [url, user] {
            if categorizer.is_empty() {
                continue;
            }
            let kind = categorizer.kind();
            counters.insert(kind.uncategorized_key().to_string(), 0);
            for name in categorizer.names() {
                counters.insert(kind.count_key(name), 0);
                if kind == CategoryKind::Url {
                    timings.insert(category_timing_key(name), TimingStat::default());
                }
            }
        }

        // An empty bound list disables histograms like an absent one.
        let mut histograms = BTreeMap::new();
        if let Some(bounds) = config.histogram.as_deref().filter(|b| !b.is_empty()) {
            for key in [RESP_TIME, RESP_TIME_UPSTREAM] {
                histograms.insert(key.to_string(), Histogram::new(bounds)?);
            }
        }

        Ok(Self {
            response_codes_aggregate: config.response_codes_aggregate,
            url_categories: !url.is_empty(),
            user_categories: !user.is_empty(),
            counters,
            timings,
            histograms,
            unique_ips: UniqueIps::new(config.all_time_ips),
            dimensions: DimensionTracker::default(),
        })
    }

    /// Account one accepted line.
    pub fn record(&mut self, fields: &ParsedFields, url: Option<&str>, user: Option<&str>) {
        self.bump("requests", 1);

        if let Some(addr) = fields
            .str(field::REMOTE_ADDR)
            .and_then(|a| a.parse::<IpAddr>().ok())
        {
            self.bump(if addr.is_ipv4() { "req_ipv4" } else { "req_ipv6" }, 1);
            self.unique_ips.insert(addr);
        }

        if let Some(status) = fields.int(field::STATUS) {
            self.record_status(status);
        }

        if let Some(method) = fields.str(field::METHOD) {
            let method = if !method.is_empty() && method.bytes().all(|b| b.is_ascii_uppercase()) {
                method
            } else {
                "other"
            };
            self.bump_dynamic("http_methods", &format!("req_method_{method}"));
        }

        if let Some(version) = fields
            .str(field::PROTOCOL)
            .and_then(|p| p.strip_prefix("HTTP/"))
            .filter(|v| !v.is_empty())
        {
            self.bump_dynamic("http_versions", &format!("req_http_{}", sanitize(version)));
        }

        if let Some(vhost) = fields.str(field::VHOST).filter(|v| !v.is_empty() && *v != "-") {
            self.bump_dynamic("vhosts", &format!("vhost_{}", sanitize(vhost)));
        }

        for (name, key) in [
            (field::BYTES_SENT, "bytes_sent"),
            (field::REQUEST_LENGTH, "request_length"),
        ] {
            if let Some(v) = fields.int(name).and_then(|v| u64::try_from(v).ok()) {
                self.bump(key, v);
            }
        }

        self.record_category(CategoryKind::Url, self.url_categories, url);
        self.record_category(CategoryKind::User, self.user_categories, user);

        if let Some(time) = fields.duration(field::REQUEST_TIME) {
            self.observe_timing(RESP_TIME, time);
            if let Some(name) = url {
                if let Some(stat) = self.timings.get_mut(&category_timing_key(name)) {
                    stat.observe(time);
                }
            }
        }
        if let Some(time) = fields.duration(field::UPSTREAM_RESPONSE_TIME) {
            self.observe_timing(RESP_TIME_UPSTREAM, time);
        }
    }

    fn record_status(&mut self, status: i64) {
        let class = ResponseClass::from_status(status);
        self.bump(class.metric_key(), 1);
        self.bump(RequestOutcome::classify(class, status).metric_key(), 1);

        let chart = if self.response_codes_aggregate {
            "response_codes".to_string()
        } else {
            format!("response_codes_{}", class.label())
        };
        self.bump_dynamic(&chart, &format!("resp_code_{status}"));
    }

    fn record_category(&mut self, kind: CategoryKind, enabled: bool, category: Option<&str>) {
        if !enabled {
            return;
        }
        match category {
            Some(name) => self.bump_dynamic(kind.chart_id(), &kind.count_key(name)),
            None => self.bump(kind.uncategorized_key(), 1),
        }
    }

    fn observe_timing(&mut self, key: &str, value: Duration) {
        if let Some(stat) = self.timings.get_mut(key) {
            stat.observe(value);
        }
        if let Some(hist) = self.histograms.get_mut(key) {
            hist.observe(value);
        }
    }

    pub fn record_unmatched(&mut self) {
        self.bump("unmatched", 1);
    }

    pub fn record_filtered(&mut self) {
        self.bump("filtered", 1);
    }

    pub fn record_tail_reopen(&mut self) {
        self.bump("tail_reopens", 1);
    }

    pub fn record_tail_error(&mut self) {
        self.bump("tail_errors", 1);
    }

    fn bump(&mut self, key: &str, by: u64) {
        match self.counters.get_mut(key) {
            Some(v) => *v = v.saturating_add(by),
            None => {
                self.counters.insert(key.to_string(), by);
            }
        }
    }

    fn bump_dynamic(&mut self, chart_id: &str, key: &str) {
        self.dimensions.observe(chart_id, key);
        self.bump(key, 1);
    }

    /// Materialize the current state. Does not reset anything.
    pub fn snapshot(&self) -> MetricsMap {
        let mut out: MetricsMap = self
            .counters
            .iter()
            .map(|(k, v)| (k.clone(), saturate(*v)))
            .collect();

        for (key, stat) in &self.timings {
            out.insert(format!("{key}_min"), saturate(stat.min().unwrap_or(0)));
            out.insert(format!("{key}_avg"), saturate(stat.avg().unwrap_or(0)));
            out.insert(format!("{key}_max"), saturate(stat.max().unwrap_or(0)));
        }

        for (key, hist) in &self.histograms {
            for (suffix, count) in hist.buckets() {
                out.insert(format!("{key}_hist_bucket_{suffix}"), saturate(count));
            }
        }

        let (v4, v6) = self.unique_ips.current();
        out.insert("unique_current_ipv4".into(), saturate(v4 as u64));
        out.insert("unique_current_ipv6".into(), saturate(v6 as u64));
        if let Some((v4, v6)) = self.unique_ips.all_time() {
            out.insert("unique_all_time_ipv4".into(), saturate(v4 as u64));
            out.insert("unique_all_time_ipv6".into(), saturate(v6 as u64));
        }

        out
    }

    /// Clear timing stats, histograms and the per-interval IP set.
    /// Cumulative counters are left as they are.
    pub fn reset_interval(&mut self) {
        self.timings.values_mut().for_each(TimingStat::reset);
        self.histograms.values_mut().for_each(Histogram::reset);
        self.unique_ips.reset_interval();
    }

    pub fn take_dimension_events(&mut self) -> Vec<DimensionEvent> {
        self.dimensions.drain()
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn timing(&self, key: &str) -> Option<&TimingStat> {
        self.timings.get(key)
    }

    pub fn histogram(&self, key: &str) -> Option<&Histogram> {
        self.histograms.get(key)
    }
}

pub fn category_timing_key(name: &str) -> String {
    format!("{}{name}_{RESP_TIME}", CategoryKind::Url.metric_prefix())
}

fn saturate(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Metric-key safe form of a free-form value.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::categorizer::CategoryConfig;
    use crate::filter::matcher::MatchRule;
    use crate::parser::fields::FieldValue;

    fn categorizer(kind: CategoryKind, rules: &[(&str, &str)]) -> Categorizer {
        let configs: Vec<_> = rules
            .iter()
            .map(|(name, prefix)| CategoryConfig {
                name: name.to_string(),
                rule: MatchRule::Prefix(prefix.to_string()),
                field: None,
            })
            .collect();
        Categorizer::compile(kind, &configs, kind.default_field()).unwrap()
    }

    fn aggregator(config: AggregatorConfig) -> (Aggregator, Categorizer) {
        let url = categorizer(CategoryKind::Url, &[("api", "/api"), ("static", "/static")]);
        let user = categorizer(CategoryKind::User, &[]);
        (Aggregator::new(&config, &url, &user).unwrap(), url)
    }

    fn line(addr: &str, uri: &str, status: i64, request_ms: Option<u64>) -> ParsedFields {
        let mut fields = ParsedFields::default();
        fields.insert(field::REMOTE_ADDR, FieldValue::Str(addr.into()));
        fields.insert(field::METHOD, FieldValue::Str("GET".into()));
        fields.insert(field::URI, FieldValue::Str(uri.into()));
        fields.insert(field::PROTOCOL, FieldValue::Str("HTTP/1.1".into()));
        fields.insert(field::STATUS, FieldValue::Int(status));
        fields.insert(field::BYTES_SENT, FieldValue::Int(100));
        if let Some(ms) = request_ms {
            fields.insert(field::REQUEST_TIME, FieldValue::Duration(Duration::from_millis(ms)));
        }
        fields
    }

    fn feed(agg: &mut Aggregator, url: &Categorizer, fields: &ParsedFields) {
        let category = url.classify(fields).map(|c| c.name().to_string());
        agg.record(fields, category.as_deref(), None);
    }

    #[test]
    fn counts_each_line_once_per_aggregate() {
        let (mut agg, url) = aggregator(AggregatorConfig::default());

        feed(&mut agg, &url, &line("10.0.0.1", "/api/a", 200, Some(12)));
        feed(&mut agg, &url, &line("10.0.0.2", "/static/x.css", 304, None));
        feed(&mut agg, &url, &line("::1", "/other", 503, Some(30)));

        let m = agg.snapshot();
        assert_eq!(m["requests"], 3);
        assert_eq!(m["resp_2xx"], 1);
        assert_eq!(m["resp_3xx"], 1);
        assert_eq!(m["resp_5xx"], 1);
        assert_eq!(m["successful_requests"], 2);
        assert_eq!(m["server_errors"], 1);
        assert_eq!(m["resp_code_304"], 1);
        assert_eq!(m["req_ipv4"], 2);
        assert_eq!(m["req_ipv6"], 1);
        assert_eq!(m["req_method_GET"], 3);
        assert_eq!(m["req_http_1_1"], 3);
        assert_eq!(m["bytes_sent"], 300);
        assert_eq!(
            m["category_api_count"] + m["category_static_count"] + m["url_uncategorized"],
            m["requests"]
        );
        assert_eq!(m["category_api_resp_time_max"], 12_000);
        assert_eq!(m["category_static_resp_time_max"], 0);
        assert_eq!(m["resp_time_min"], 12_000);
        assert_eq!(m["resp_time_avg"], 21_000);
        assert_eq!(m["resp_time_max"], 30_000);
        assert_eq!(m["unique_current_ipv4"], 2);
        assert_eq!(m["unique_all_time_ipv6"], 1);
    }

    #[test]
    fn missing_upstream_time_leaves_stat_inactive() {
        let (mut agg, url) = aggregator(AggregatorConfig::default());
        feed(&mut agg, &url, &line("10.0.0.1", "/", 200, Some(5)));

        assert!(!agg.timing(RESP_TIME_UPSTREAM).unwrap().is_active());
        assert_eq!(agg.snapshot()["resp_time_upstream_avg"], 0);
    }

    #[test]
    fn reset_clears_interval_state_only() {
        let (mut agg, url) = aggregator(AggregatorConfig {
            histogram: Some(vec![10, 50]),
            all_time_ips: false,
            ..Default::default()
        });
        feed(&mut agg, &url, &line("10.0.0.1", "/api", 200, Some(5)));
        feed(&mut agg, &url, &line("10.0.0.2", "/api", 200, Some(20)));
        feed(&mut agg, &url, &line("10.0.0.3", "/api", 200, Some(75)));

        let before = agg.snapshot();
        assert_eq!(before["resp_time_hist_bucket_10"], 1);
        assert_eq!(before["resp_time_hist_bucket_50"], 1);
        assert_eq!(before["resp_time_hist_bucket_inf"], 1);
        assert_eq!(
            agg.histogram(RESP_TIME).unwrap().total(),
            agg.timing(RESP_TIME).unwrap().count()
        );
        assert!(!before.contains_key("unique_all_time_ipv4"));

        agg.reset_interval();
        let after = agg.snapshot();
        assert_eq!(after["requests"], 3);
        assert_eq!(after["category_api_count"], 3);
        assert_eq!(after["resp_time_hist_bucket_inf"], 0);
        assert_eq!(after["resp_time_max"], 0);
        assert_eq!(after["category_api_resp_time_min"], 0);
        assert_eq!(after["unique_current_ipv4"], 0);
    }

    #[test]
    fn empty_histogram_bounds_disable_histograms() {
        let (mut agg, url) = aggregator(AggregatorConfig {
            histogram: Some(Vec::new()),
            ..Default::default()
        });
        feed(&mut agg, &url, &line("10.0.0.1", "/", 200, Some(5)));

        assert!(agg.histogram(RESP_TIME).is_none());
        assert!(!agg.snapshot().keys().any(|k| k.contains("_hist_bucket_")));
        assert_eq!(agg.timing(RESP_TIME).unwrap().count(), 1);
    }

    #[test]
    fn response_code_chart_follows_grouping_toggle() {
        let (mut grouped, url) = aggregator(AggregatorConfig::default());
        feed(&mut grouped, &url, &line("10.0.0.1", "/", 404, None));
        assert!(grouped.take_dimension_events().contains(&DimensionEvent {
            chart_id: "response_codes".into(),
            dimension_id: "resp_code_404".into(),
        }));

        let (mut split, url) = aggregator(AggregatorConfig {
            response_codes_aggregate: false,
            ..Default::default()
        });
        feed(&mut split, &url, &line("10.0.0.1", "/api", 404, None));
        let events = split.take_dimension_events();
        assert!(events.contains(&DimensionEvent {
            chart_id: "response_codes_4xx".into(),
            dimension_id: "resp_code_404".into(),
        }));
        assert!(events.contains(&DimensionEvent {
            chart_id: "url_categories".into(),
            dimension_id: "category_api_count".into(),
        }));
    }

    #[test]
    fn diagnostics_touch_only_their_counter() {
        let (mut agg, _) = aggregator(AggregatorConfig::default());
        let before = agg.snapshot();
        agg.record_unmatched();
        agg.record_filtered();
        let after = agg.snapshot();

        assert_eq!(after["unmatched"], 1);
        assert_eq!(after["filtered"], 1);
        for (key, value) in &before {
            if key != "unmatched" && key != "filtered" {
                assert_eq!(after[key], *value, "{key} changed");
            }
        }
    }

    #[test]
    fn odd_methods_and_vhosts_are_normalized() {
        let (mut agg, url) = aggregator(AggregatorConfig::default());
        let mut fields = line("10.0.0.1", "/", 200, None);
        fields.insert(field::METHOD, FieldValue::Str("get".into()));
        fields.insert(field::VHOST, FieldValue::Str("www.example.com".into()));
        feed(&mut agg, &url, &fields);

        let m = agg.snapshot();
        assert_eq!(m["req_method_other"], 1);
        assert_eq!(m["vhost_www_example_com"], 1);
    }
}
