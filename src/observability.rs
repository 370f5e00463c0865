use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("agentchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("agentchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("agentchat.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("agentchat.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("agentchat.client.retry_backoff_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("agentchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("agentchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("agentchat.stream.bytes");

pub(crate) static TURNS: Counter = Counter::new("agentchat.session.turns");
pub(crate) static TURN_FAILURES: Counter = Counter::new("agentchat.session.turn_failures");
pub(crate) static HISTORY_EVICTIONS: Counter = Counter::new("agentchat.history.evictions");
pub(crate) static PERSIST_ERRORS: Counter = Counter::new("agentchat.persist.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&TURNS);
    collector.register_counter(&TURN_FAILURES);
    collector.register_counter(&HISTORY_EVICTIONS);
    collector.register_counter(&PERSIST_ERRORS);
}
