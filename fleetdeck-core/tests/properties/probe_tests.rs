//! Property tests for metric probe parsers

use fleetdeck_core::MetricSample;
use fleetdeck_core::monitoring::Probe;
use fleetdeck_core::monitoring::probes::{
    parse_cpu_percent, parse_disk, parse_loadavg, parse_memory, parse_net_dev,
};
use proptest::prelude::*;
use uuid::Uuid;

fn is_sane(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

proptest! {
    /// Property: every probe accepts arbitrary output and leaves sane fields
    #[test]
    fn probes_are_total(output in ".{0,400}") {
        let mut sample = MetricSample::empty(Uuid::nil());
        for probe in Probe::ALL {
            probe.apply(&output, &mut sample);
        }
        prop_assert!((0.0..=100.0).contains(&sample.cpu_percent));
        for value in [
            sample.memory_used_mb,
            sample.memory_total_mb,
            sample.disk_used_gb,
            sample.disk_total_gb,
            sample.load_avg_1m,
            sample.load_avg_5m,
            sample.load_avg_15m,
        ] {
            prop_assert!(is_sane(value));
        }
    }

    /// Property: line-noise around numbers never yields NaN or negatives
    #[test]
    fn numeric_noise_is_sane(
        tokens in prop::collection::vec(
            prop_oneof!["-?[0-9]{1,12}(\\.[0-9]{0,3})?", "NaN|inf|-inf|Mem:|cpu|lo:|eth0:"],
            0..30,
        )
    ) {
        let output = tokens.join(" ");
        let (used, total) = parse_memory(&output);
        prop_assert!(is_sane(used) && is_sane(total));
        let (used, total) = parse_disk(&output);
        prop_assert!(is_sane(used) && is_sane(total));
        let (one, five, fifteen) = parse_loadavg(&output);
        prop_assert!(is_sane(one) && is_sane(five) && is_sane(fifteen));
        prop_assert!((0.0..=100.0).contains(&parse_cpu_percent(&output)));
    }

    /// Property: two well-formed readings give a percentage
    #[test]
    fn cpu_percent_is_bounded(
        first in prop::collection::vec(0u64..1_000_000, 8),
        deltas in prop::collection::vec(0u64..1_000_000, 8),
    ) {
        let second: Vec<u64> = first.iter().zip(&deltas).map(|(a, d)| a + d).collect();
        let line = |values: &[u64]| {
            let fields: Vec<String> = values.iter().map(u64::to_string).collect();
            format!("cpu  {}", fields.join(" "))
        };
        let output = format!("{}\n{}\n", line(&first), line(&second));
        let pct = parse_cpu_percent(&output);
        prop_assert!((0.0..=100.0).contains(&pct));
    }

    /// Property: loopback never contributes to network counters
    #[test]
    fn loopback_is_ignored(rx in 0u64..u64::MAX / 2, tx in 0u64..u64::MAX / 2) {
        let output = format!(
            "Inter-|   Receive\n face |bytes\n    lo: {rx} 1 0 0 0 0 0 0 {tx} 1 0 0 0 0 0 0\n"
        );
        prop_assert_eq!(parse_net_dev(&output), (0, 0));
    }
}
