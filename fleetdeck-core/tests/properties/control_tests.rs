//! Property tests for in-band terminal control frames

use fleetdeck_core::ControlMessage;
use proptest::prelude::*;

proptest! {
    /// Property: encoded resize frames are recognised as control frames
    #[test]
    fn resize_frames_are_recognised(cols in any::<u16>(), rows in any::<u16>()) {
        let message = ControlMessage::Resize { cols, rows };
        prop_assert_eq!(ControlMessage::parse(&message.to_json()), Some(message));
    }

    /// Property: text that does not start with an object is always input
    #[test]
    fn keystrokes_are_never_control(text in "[a-zA-Z0-9~/.-].{0,40}") {
        prop_assert_eq!(ControlMessage::parse(&text), None);
    }

    /// Property: parsing arbitrary text never panics
    #[test]
    fn parse_is_total(text in ".{0,200}") {
        let _ = ControlMessage::parse(&text);
    }
}
