//! Process-wide Prometheus registry and the fixed metric families the
//! pipeline publishes. Metric names and label sets are part of the on-call
//! contract, so they're spelled out explicitly rather than derived.

use once_cell::sync::Lazy;
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static PRENOTE_ENTRIES_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new(
            "prenote_entries_processed",
            "Count of prenotification entries classified by the inbound pipeline",
        ),
        &["origin", "destination", "transactionCode"],
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("metric registered exactly once");
    vec
});

static FTP_AGENT_UP: Lazy<GaugeVec> = Lazy::new(|| {
    let vec = GaugeVec::new(
        Opts::new("ftp_agent_up", "1 if the FTP agent's last ping succeeded"),
        &["hostname"],
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("metric registered exactly once");
    vec
});

static SFTP_AGENT_UP: Lazy<GaugeVec> = Lazy::new(|| {
    let vec = GaugeVec::new(
        Opts::new("sftp_agent_up", "1 if the SFTP agent's last ping succeeded"),
        &["hostname"],
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("metric registered exactly once");
    vec
});

pub fn record_prenote_entry(origin: &str, destination: &str, transaction_code: u16) {
    PRENOTE_ENTRIES_PROCESSED
        .with_label_values(&[origin, destination, &transaction_code.to_string()])
        .inc();
}

pub fn set_ftp_agent_up(hostname: &str, up: bool) {
    FTP_AGENT_UP
        .with_label_values(&[hostname])
        .set(if up { 1.0 } else { 0.0 });
}

pub fn set_sftp_agent_up(hostname: &str, up: bool) {
    SFTP_AGENT_UP
        .with_label_values(&[hostname])
        .set(if up { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_a_prenote_entry_increments_the_counter() {
        record_prenote_entry("origin1", "dest1", 23);
        let families = REGISTRY.gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "prenote_entries_processed")
            .expect("prenote counter registered");
        assert!(!family.get_metric().is_empty());
    }

    #[test]
    fn agent_gauges_reflect_last_ping() {
        set_ftp_agent_up("ftp.example.com", true);
        set_ftp_agent_up("ftp.example.com", false);
        let families = REGISTRY.gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "ftp_agent_up")
            .expect("ftp gauge registered");
        let metric = family.get_metric().iter().find(|m| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == "hostname" && l.get_value() == "ftp.example.com")
        });
        assert_eq!(metric.unwrap().get_gauge().get_value(), 0.0);
    }
}
