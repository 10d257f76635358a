//! Port-name helpers.
//!
//! Default port selection picks the enumerated port with the greatest
//! numeric suffix under the host's naming convention: `COM<n>` on Windows,
//! `/dev/cu.usbserial-<n>` on macOS and `/dev/ttyUSB<n>` elsewhere.

use regex::Regex;

/// Canonical prefix of numbered serial ports on this host.
#[cfg(windows)]
pub const DEFAULT_PORT_PREFIX: &str = "COM";
#[cfg(target_os = "macos")]
pub const DEFAULT_PORT_PREFIX: &str = "/dev/cu.usbserial-";
#[cfg(not(any(windows, target_os = "macos")))]
pub const DEFAULT_PORT_PREFIX: &str = "/dev/ttyUSB";

/// Return the name with the greatest numeric suffix among `names` that look
/// like `<prefix><digits>`, or an empty string when none match.
///
/// ```
/// use serial_port_reader::port::highest_numbered_port;
///
/// assert_eq!(highest_numbered_port(["COM1", "COM9", "COM3"], "COM"), "COM9");
/// assert_eq!(highest_numbered_port(Vec::<String>::new(), "COM"), "");
/// assert_eq!(highest_numbered_port(["TTYUSB0"], "COM"), "");
/// ```
pub fn highest_numbered_port<I, S>(names: I, prefix: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let Ok(pattern) = Regex::new(&format!(r"^{}(\d+)$", regex::escape(prefix))) else {
        return String::new();
    };

    let mut best: Option<(u64, String)> = None;
    for name in names {
        let name = name.as_ref();
        let Some(number) = pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };

        if best.as_ref().map_or(true, |(current, _)| number > *current) {
            best = Some((number, name.to_string()));
        }
    }

    best.map(|(_, name)| name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_picks_greatest_suffix() {
        assert_eq!(highest_numbered_port(["COM1", "COM9", "COM3"], "COM"), "COM9");
        assert_eq!(highest_numbered_port(["COM10", "COM9", "COM2"], "COM"), "COM10");
    }

    #[test]
    fn test_empty_enumeration() {
        assert_eq!(highest_numbered_port(Vec::<&str>::new(), "COM"), "");
    }

    #[test]
    fn test_no_name_matches_convention() {
        assert_eq!(highest_numbered_port(["TTYUSB0"], "COM"), "");
        assert_eq!(highest_numbered_port(["COM", "COMX", "xCOM1"], "COM"), "");
    }

    #[test]
    fn test_non_matching_names_are_ignored() {
        assert_eq!(
            highest_numbered_port(["/dev/ttyUSB7", "COM4", "Bluetooth-Incoming"], "COM"),
            "COM4"
        );
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            highest_numbered_port(["/dev/ttyUSB0", "/dev/ttyUSB2", "/dev/ttyACM9"], "/dev/ttyUSB"),
            "/dev/ttyUSB2"
        );
    }

    #[test]
    fn test_leading_zeros_return_enumerated_name() {
        assert_eq!(highest_numbered_port(["COM03", "COM2"], "COM"), "COM03");
    }

    #[test]
    #[cfg(windows)]
    fn test_default_prefix_matches_host_names() {
        assert_eq!(
            highest_numbered_port(["COM1", "COM12", "COM3"], DEFAULT_PORT_PREFIX),
            "COM12"
        );
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn test_default_prefix_matches_host_names() {
        assert_eq!(
            highest_numbered_port(
                ["/dev/cu.usbserial-110", "/dev/cu.usbserial-1420", "/dev/cu.Bluetooth-Incoming-Port"],
                DEFAULT_PORT_PREFIX
            ),
            "/dev/cu.usbserial-1420"
        );
    }

    #[test]
    #[cfg(not(any(windows, target_os = "macos")))]
    fn test_default_prefix_matches_host_names() {
        assert_eq!(
            highest_numbered_port(
                ["/dev/ttyUSB0", "/dev/ttyS0", "/dev/ttyUSB3", "/dev/ttyACM7"],
                DEFAULT_PORT_PREFIX
            ),
            "/dev/ttyUSB3"
        );
    }

    proptest! {
        #[test]
        fn prop_result_is_max_of_matching(numbers in proptest::collection::vec(0u32..10_000, 0..20)) {
            let names: Vec<String> = numbers.iter().map(|n| format!("COM{n}")).collect();
            let result = highest_numbered_port(&names, "COM");

            match numbers.iter().max() {
                Some(max) => prop_assert_eq!(result, format!("COM{max}")),
                None => prop_assert_eq!(result, ""),
            }
        }

        #[test]
        fn prop_result_is_enumerated_or_empty(names in proptest::collection::vec("[A-Z]{0,4}[0-9]{0,3}", 0..12)) {
            let result = highest_numbered_port(&names, "COM");
            prop_assert!(result.is_empty() || names.contains(&result));
        }
    }
}
