//! Metrics definitions for the aggregator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_CACHE_HIT: MetricDef = MetricDef {
    name: "request_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of upstream calls served from the request cache",
};

pub const REQUEST_CACHE_MISS: MetricDef = MetricDef {
    name: "request_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of upstream calls that missed the request cache",
};

pub const RESPONSE_CACHE_HIT: MetricDef = MetricDef {
    name: "response_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of API requests served from the response cache",
};

pub const RESPONSE_CACHE_MISS: MetricDef = MetricDef {
    name: "response_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of API requests that missed the response cache",
};

pub const UPSTREAM_REQUESTS: MetricDef = MetricDef {
    name: "upstream.requests",
    metric_type: MetricType::Counter,
    description: "Number of requests sent to the upstream API",
};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete an upstream request in seconds",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "upstream.failures",
    metric_type: MetricType::Counter,
    description: "Number of upstream requests that failed",
};

pub const ACHIEVEMENT_MERGE_DEGRADED: MetricDef = MetricDef {
    name: "achievements.merge.degraded",
    metric_type: MetricType::Counter,
    description: "Number of games whose achievements were replaced by an empty list after an upstream failure",
};

pub const RATE_LIMIT_REJECTED: MetricDef = MetricDef {
    name: "rate_limit.rejected",
    metric_type: MetricType::Counter,
    description: "Number of requests rejected by the rate limiter",
};

// Every definition must be listed here to be described at startup.
pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_CACHE_HIT,
    REQUEST_CACHE_MISS,
    RESPONSE_CACHE_HIT,
    RESPONSE_CACHE_MISS,
    UPSTREAM_REQUESTS,
    UPSTREAM_REQUEST_DURATION,
    UPSTREAM_FAILURES,
    ACHIEVEMENT_MERGE_DEGRADED,
    RATE_LIMIT_REJECTED,
];
