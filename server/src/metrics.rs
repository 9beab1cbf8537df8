//! Cache server metrics.

use metriken::{Counter, Gauge, metric};

#[metric(
    name = "connections_accepted",
    description = "Total number of connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "connections_active",
    description = "Number of currently active connections"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(name = "request_get", description = "Keys looked up by get/gets")]
pub static GETS: Counter = Counter::new();

#[metric(name = "request_set", description = "Total set commands")]
pub static SETS: Counter = Counter::new();

#[metric(name = "request_delete", description = "Total delete commands")]
pub static DELETES: Counter = Counter::new();

#[metric(name = "request_incr", description = "Total incr commands")]
pub static INCRS: Counter = Counter::new();

#[metric(name = "request_decr", description = "Total decr commands")]
pub static DECRS: Counter = Counter::new();

#[metric(name = "cache_hits", description = "Lookups that found a live item")]
pub static HITS: Counter = Counter::new();

#[metric(name = "cache_misses", description = "Lookups that missed")]
pub static MISSES: Counter = Counter::new();

#[metric(
    name = "protocol_errors",
    description = "Commands rejected with CLIENT_ERROR"
)]
pub static PROTOCOL_ERRORS: Counter = Counter::new();

#[metric(
    name = "store_errors",
    description = "Writes rejected with SERVER_ERROR"
)]
pub static STORE_ERRORS: Counter = Counter::new();
