use metrics::{counter, gauge, Counter, Gauge};
use std::sync::LazyLock;

/// Metric name for counting accepted connections.
pub(crate) const CONNECTIONS_ACCEPTED: &str = "tcpchat.connections.accepted";
pub(crate) const CONNECTIONS_ACCEPTED_HELP: &str =
    "Number of connections accepted by the server. Includes connections that never sent a frame.";

/// Metric for tracking open connections.
pub(crate) const CONNECTIONS_ACTIVE: &str = "tcpchat.connections.active";
pub(crate) const CONNECTIONS_ACTIVE_HELP: &str =
    "Number of connections currently being served, including live chat sessions";

/// Metric name for counting routed calls.
pub(crate) const ROUTER_CALLS: &str = "tcpchat.router.calls";
pub(crate) const ROUTER_CALLS_HELP: &str =
    "Number of requests matched to a route. Not all requests will result in a response.";

/// Metric for counting requests with no matching route.
pub(crate) const ROUTER_NOT_FOUND: &str = "tcpchat.router.not_found";
pub(crate) const ROUTER_NOT_FOUND_HELP: &str =
    "Number of requests that matched no route. This implies no response was sent.";

/// Metric for counting frames that could not be read or decoded.
pub(crate) const ROUTER_BAD_FRAMES: &str = "tcpchat.router.bad_frames";
pub(crate) const ROUTER_BAD_FRAMES_HELP: &str =
    "Number of request frames that could not be read or decoded into a request.";

/// Metric for counting events handed to subscribers.
pub(crate) const BUS_PUBLISHED: &str = "tcpchat.bus.published";
pub(crate) const BUS_PUBLISHED_HELP: &str =
    "Number of events delivered to subscriber channels. One publish counts once per subscriber.";

/// Metric for counting events dropped because a subscriber was full.
pub(crate) const BUS_DROPPED: &str = "tcpchat.bus.dropped";
pub(crate) const BUS_DROPPED_HELP: &str =
    "Number of events dropped because the subscriber channel was full.";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    metrics::describe_counter!(
        CONNECTIONS_ACCEPTED,
        metrics::Unit::Count,
        CONNECTIONS_ACCEPTED_HELP
    );
    metrics::describe_gauge!(
        CONNECTIONS_ACTIVE,
        metrics::Unit::Count,
        CONNECTIONS_ACTIVE_HELP
    );
    metrics::describe_counter!(ROUTER_CALLS, metrics::Unit::Count, ROUTER_CALLS_HELP);
    metrics::describe_counter!(
        ROUTER_NOT_FOUND,
        metrics::Unit::Count,
        ROUTER_NOT_FOUND_HELP
    );
    metrics::describe_counter!(
        ROUTER_BAD_FRAMES,
        metrics::Unit::Count,
        ROUTER_BAD_FRAMES_HELP
    );
    metrics::describe_counter!(BUS_PUBLISHED, metrics::Unit::Count, BUS_PUBLISHED_HELP);
    metrics::describe_counter!(BUS_DROPPED, metrics::Unit::Count, BUS_DROPPED_HELP);
});

/// Get or register the accepted connections counter.
pub(crate) fn accepted() -> Counter {
    let _ = &DESCRIBE;
    counter!(CONNECTIONS_ACCEPTED)
}

/// Get or register the active connections gauge.
pub(crate) fn active_connections() -> Gauge {
    let _ = &DESCRIBE;
    gauge!(CONNECTIONS_ACTIVE)
}

/// Record an accepted connection, incrementing the active gauge.
pub(crate) fn record_connection_opened() {
    accepted().increment(1);
    active_connections().increment(1);
}

/// Decrement the active gauge.
pub(crate) fn record_connection_closed() {
    active_connections().decrement(1);
}

/// Get or register a counter for calls to a specific method and pattern.
pub(crate) fn calls(method: &str, pattern: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(
        ROUTER_CALLS,
        "method" => method.to_string(),
        "pattern" => pattern.to_string()
    )
}

/// Record a routed call.
pub(crate) fn record_call(method: &str, pattern: &str) {
    calls(method, pattern).increment(1);
}

/// Label for a client supplied method. Anything unusual shares one label so
/// clients cannot mint new series.
pub(crate) fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => "other",
    }
}

/// Get or register a counter for unmatched requests with a specific method.
pub(crate) fn not_found(method: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(ROUTER_NOT_FOUND, "method" => method_label(method))
}

/// Record an unmatched request.
pub(crate) fn record_not_found(method: &str) {
    not_found(method).increment(1);
}

/// Get or register the bad frame counter.
pub(crate) fn bad_frames() -> Counter {
    let _ = &DESCRIBE;
    counter!(ROUTER_BAD_FRAMES)
}

/// Record a frame that could not be turned into a request.
pub(crate) fn record_bad_frame() {
    bad_frames().increment(1);
}

/// Get or register a counter for delivered events of a specific type.
pub(crate) fn published(kind: &'static str) -> Counter {
    let _ = &DESCRIBE;
    counter!(BUS_PUBLISHED, "type" => kind)
}

/// Record `n` deliveries of an event.
pub(crate) fn record_published(kind: &'static str, n: usize) {
    published(kind).increment(n as u64);
}

/// Get or register a counter for dropped events of a specific type.
pub(crate) fn dropped(kind: &'static str) -> Counter {
    let _ = &DESCRIBE;
    counter!(BUS_DROPPED, "type" => kind)
}

/// Record an event dropped for one subscriber.
pub(crate) fn record_dropped(kind: &'static str) {
    dropped(kind).increment(1);
}
