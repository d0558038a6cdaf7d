use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use signal_proto::{KIND_HEARTBEAT, KIND_ICE, KIND_MONITOR_ID, KIND_SDP};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static STREAMS_OPENED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("relay_streams_opened_total", "event streams opened by role"),
        &["role"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ENVELOPES_FORWARDED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "relay_envelopes_forwarded_total",
            "envelopes accepted for forwarding by kind",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static EVICTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("relay_registry_evictions_total", "registry evictions by reason"),
        &["reason"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static REQUEST_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("relay_request_errors_total", "rejected relay requests by error"),
        &["error"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static LIVE_STREAMS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new(
        "relay_live_streams",
        "entries currently held by the stream registry",
    ))
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

/// Caller-chosen kinds collapse into `custom` to keep label cardinality fixed.
pub fn kind_label(kind: &str) -> &'static str {
    match kind {
        KIND_HEARTBEAT => KIND_HEARTBEAT,
        KIND_MONITOR_ID => KIND_MONITOR_ID,
        KIND_SDP => KIND_SDP,
        KIND_ICE => KIND_ICE,
        _ => "custom",
    }
}

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "metrics encode error");
    }
    buffer
}
