/// Response code class, computed once per line from the numeric status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseClass {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
    Other,
}

impl ResponseClass {
    pub fn from_status(status: i64) -> Self {
        match status {
            100..=199 => ResponseClass::Informational,
            200..=299 => ResponseClass::Success,
            300..=399 => ResponseClass::Redirect,
            400..=499 => ResponseClass::ClientError,
            500..=599 => ResponseClass::ServerError,
            _ => ResponseClass::Other,
        }
    }

    /// Short label used in metric keys and chart ids.
    pub fn label(self) -> &'static str {
        match self {
            ResponseClass::Informational => "1xx",
            ResponseClass::Success => "2xx",
            ResponseClass::Redirect => "3xx",
            ResponseClass::ClientError => "4xx",
            ResponseClass::ServerError => "5xx",
            ResponseClass::Other => "other",
        }
    }

    pub fn metric_key(self) -> &'static str {
        match self {
            ResponseClass::Informational => "resp_1xx",
            ResponseClass::Success => "resp_2xx",
            ResponseClass::Redirect => "resp_3xx",
            ResponseClass::ClientError => "resp_4xx",
            ResponseClass::ServerError => "resp_5xx",
            ResponseClass::Other => "resp_other",
        }
    }
}

/// Coarse request outcome used by the request-type counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    Successful,
    Redirect,
    BadRequest,
    ServerError,
    Other,
}

impl RequestOutcome {
    pub const ALL: [RequestOutcome; 5] = [
        RequestOutcome::Successful,
        RequestOutcome::Redirect,
        RequestOutcome::BadRequest,
        RequestOutcome::ServerError,
        RequestOutcome::Other,
    ];

    /// 304 Not Modified counts as a successful request.
    pub fn classify(class: ResponseClass, status: i64) -> Self {
        match class {
            ResponseClass::Informational | ResponseClass::Success => RequestOutcome::Successful,
            ResponseClass::Redirect if status == 304 => RequestOutcome::Successful,
            ResponseClass::Redirect => RequestOutcome::Redirect,
            ResponseClass::ClientError => RequestOutcome::BadRequest,
            ResponseClass::ServerError => RequestOutcome::ServerError,
            ResponseClass::Other => RequestOutcome::Other,
        }
    }

    pub fn metric_key(self) -> &'static str {
        match self {
            RequestOutcome::Successful => "successful_requests",
            RequestOutcome::Redirect => "redirects",
            RequestOutcome::BadRequest => "bad_requests",
            RequestOutcome::ServerError => "server_errors",
            RequestOutcome::Other => "other_requests",
        }
    }
}
