/// A named log layout tried during pattern learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePattern {
    pub name: &'static str,
    pub format: &'static str,
}

const fn candidate(name: &'static str, format: &'static str) -> CandidatePattern {
    CandidatePattern { name, format }
}

/// Built-in layouts in learning priority order. The first one that fully
/// matches the sample line is adopted, so layouts carrying more fields come
/// before the layouts they extend.
pub const DEFAULT_CANDIDATES: &[CandidatePattern] = &[
    candidate(
        "vhost_custom1",
        r#"$vhost $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_length $request_time $upstream_response_time"#,
    ),
    candidate(
        "vhost_custom2",
        r#"$vhost $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_time $upstream_response_time"#,
    ),
    candidate(
        "vhost_custom3",
        r#"$vhost $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_time"#,
    ),
    candidate(
        "vhost_combined",
        r#"$vhost $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent""#,
    ),
    candidate(
        "vhost_common",
        r#"$vhost $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent"#,
    ),
    candidate(
        "custom1",
        r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_length $request_time $upstream_response_time"#,
    ),
    candidate(
        "custom2",
        r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_time $upstream_response_time"#,
    ),
    candidate(
        "custom3",
        r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent $request_time"#,
    ),
    candidate(
        "combined",
        r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent""#,
    ),
    candidate(
        "common",
        r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent"#,
    ),
    candidate(
        "untimed_custom1",
        r#"$remote_addr - $remote_user "$request" $status $body_bytes_sent $request_length $request_time $upstream_response_time"#,
    ),
    candidate(
        "untimed_custom2",
        r#"$remote_addr - $remote_user "$request" $status $body_bytes_sent $request_time $upstream_response_time"#,
    ),
    candidate(
        "untimed_custom3",
        r#"$remote_addr - $remote_user "$request" $status $body_bytes_sent $request_time"#,
    ),
    candidate(
        "untimed_common",
        r#"$remote_addr - $remote_user "$request" $status $body_bytes_sent"#,
    ),
];
