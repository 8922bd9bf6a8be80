//! Property tests for command classification

use fleetdeck_core::{SafetyCategory, classify, parse_command};
use proptest::prelude::*;

const SAFE_SAMPLES: &[&str] = &["ls -la", "uptime", "df -h", "ps aux", "ping -c 1 host", "docker ps"];

const DANGEROUS_SAMPLES: &[&str] = &[
    "rm", "mv", "dd", "reboot", "apt-get", "curl", "vim", "tar", "kill", "chmod",
];

fn plain_arg() -> impl Strategy<Value = String> {
    "[a-z0-9./_=-]{1,12}"
}

proptest! {
    /// Property: classification is total and a safe verdict always carries a safe category
    #[test]
    fn classify_is_total(input in ".{0,200}") {
        let verdict = classify(&input);
        if verdict.is_safe {
            prop_assert!(matches!(
                verdict.category,
                SafetyCategory::System | SafetyCategory::File | SafetyCategory::Network
            ));
        }
        if matches!(verdict.category, SafetyCategory::Dangerous | SafetyCategory::Unknown) {
            prop_assert!(!verdict.is_safe);
        }
    }

    /// Property: the verdict reports the parser's view of the command
    #[test]
    fn verdict_matches_parser(input in ".{0,200}") {
        let (base, args) = parse_command(&input);
        let verdict = classify(&input);
        prop_assert_eq!(verdict.base_command, base);
        prop_assert_eq!(verdict.arguments, args);
    }

    /// Property: parsed base commands carry no directory or whitespace
    #[test]
    fn base_command_is_a_bare_name(input in ".{0,200}") {
        let (base, _) = parse_command(&input);
        prop_assert!(!base.contains('/'));
        prop_assert!(!base.chars().any(char::is_whitespace));
    }

    /// Property: names outside every rule fail closed
    #[test]
    fn unrecognised_commands_fail_closed(
        name in "zz[a-z]{1,10}",
        args in prop::collection::vec(plain_arg(), 0..5),
    ) {
        let line = std::iter::once(name.clone()).chain(args).collect::<Vec<_>>().join(" ");
        let verdict = classify(&line);
        prop_assert!(!verdict.is_safe);
        prop_assert_eq!(verdict.category, SafetyCategory::Unknown);
        prop_assert_eq!(verdict.base_command, name);
    }

    /// Property: denied commands stay denied whatever their arguments or path
    #[test]
    fn denied_commands_stay_denied(
        idx in 0..DANGEROUS_SAMPLES.len(),
        prefix in prop::option::of("/(usr/)?s?bin/"),
        args in prop::collection::vec(plain_arg(), 0..5),
    ) {
        let command = DANGEROUS_SAMPLES[idx];
        let mut line = format!("{}{command}", prefix.unwrap_or_default());
        for arg in &args {
            line.push(' ');
            line.push_str(arg);
        }
        let verdict = classify(&line);
        prop_assert!(!verdict.is_safe, "{} classified safe", line);
    }

    /// Property: chaining a second command onto a safe one is never safe
    #[test]
    fn chained_commands_are_unsafe(
        idx in 0..SAFE_SAMPLES.len(),
        marker in prop::sample::select(vec![";", "&&", "||", "$(", "`", "&", "<(", ">("]),
        tail in "[a-z ]{0,20}",
    ) {
        let line = format!("{} {marker} {tail}", SAFE_SAMPLES[idx]);
        let verdict = classify(&line);
        prop_assert!(!verdict.is_safe);
        prop_assert_eq!(verdict.category, SafetyCategory::Dangerous);
    }

    /// Property: backgrounding with `&` hides a second command, spaced or not
    #[test]
    fn background_separator_is_unsafe(
        idx in 0..SAFE_SAMPLES.len(),
        tail in "[a-z]{1,10}( [a-z/-]{1,10}){0,3}",
        spaced in prop::bool::ANY,
    ) {
        let sep = if spaced { " & " } else { "&" };
        let line = format!("{}{sep}{tail}", SAFE_SAMPLES[idx]);
        let verdict = classify(&line);
        prop_assert!(!verdict.is_safe, "{} classified safe", line);
        prop_assert_eq!(verdict.category, SafetyCategory::Dangerous);
    }

    /// Property: descriptor duplication alone keeps a safe command safe
    #[test]
    fn descriptor_redirects_stay_safe(
        idx in 0..SAFE_SAMPLES.len(),
        redirect in prop::sample::select(vec!["2>&1", ">&2", "2>&-", "&>/dev/null", "2>/dev/null"]),
    ) {
        let line = format!("{} {redirect}", SAFE_SAMPLES[idx]);
        prop_assert!(classify(&line).is_safe, "{} classified unsafe", line);
    }

    /// Property: a leading sudo does not change the parsed command
    #[test]
    fn sudo_prefix_is_transparent(idx in 0..SAFE_SAMPLES.len()) {
        let plain = SAFE_SAMPLES[idx];
        prop_assert_eq!(parse_command(&format!("sudo {plain}")), parse_command(plain));
    }
}
