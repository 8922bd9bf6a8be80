//! Property tests for uptime computation

use fleetdeck_core::uptime::{UptimeWindow, uptime_percent};
use fleetdeck_core::ProbeStatus;
use proptest::prelude::*;

fn history() -> impl Strategy<Value = Vec<ProbeStatus>> {
    prop::collection::vec(
        prop::bool::ANY.prop_map(|up| if up { ProbeStatus::Up } else { ProbeStatus::Down }),
        0..300,
    )
}

proptest! {
    /// Property: uptime is a percentage
    #[test]
    fn uptime_is_bounded(history in history(), n in 1usize..400) {
        for window in [UptimeWindow::Trailing(n), UptimeWindow::AllTime] {
            let pct = uptime_percent(&history, window);
            prop_assert!((0.0..=100.0).contains(&pct));
        }
    }

    /// Property: recomputing over the same history gives the same value
    #[test]
    fn uptime_is_idempotent(history in history(), n in 1usize..400) {
        let window = UptimeWindow::Trailing(n);
        let first = uptime_percent(&history, window);
        let second = uptime_percent(&history, window);
        prop_assert_eq!(first.to_bits(), second.to_bits());
    }

    /// Property: a trailing window only sees the newest probes
    #[test]
    fn trailing_window_ignores_older_probes(
        older in history(),
        newer in history(),
    ) {
        prop_assume!(!newer.is_empty());
        let mut combined = older.clone();
        combined.extend_from_slice(&newer);

        let window = UptimeWindow::Trailing(newer.len());
        let expected = uptime_percent(&newer, UptimeWindow::AllTime);
        prop_assert!((uptime_percent(&combined, window) - expected).abs() < 1e-9);
    }

    /// Property: a window at least as long as the history covers all of it
    #[test]
    fn wide_window_equals_all_time(history in history(), extra in 0usize..50) {
        let window = UptimeWindow::Trailing(history.len() + extra + 1);
        let all = uptime_percent(&history, UptimeWindow::AllTime);
        prop_assert!((uptime_percent(&history, window) - all).abs() < 1e-9);
    }

    /// Property: window sizes survive their text form
    #[test]
    fn window_text_form(n in 1usize..100_000) {
        let window = UptimeWindow::Trailing(n);
        prop_assert_eq!(window.to_string().parse::<UptimeWindow>(), Ok(window));
    }
}
