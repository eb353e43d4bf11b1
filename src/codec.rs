//! Embedded-address subdomain decoding.
//!
//! Backname queries carry a client address inside the query name itself,
//! in one of two shapes: a single dash-joined label (`203-0-113-7`,
//! `2001-db8--1`) or the address spread over the trailing labels (four
//! for IPv4, eight for IPv6). Decoding is pure string work with no
//! lookups; anything that does not parse is simply not an address.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Decode an IPv4 address embedded in subdomain labels.
///
/// A dash in the last label selects the dash-joined form; otherwise the
/// trailing four labels are read as dotted octets.
///
/// # Arguments
/// * `labels` - The labels in front of the backname marker, in query order.
///
/// # Returns
/// The decoded address, or `None` when the labels do not encode one.
pub fn decode_ipv4(labels: &[&str]) -> Option<Ipv4Addr> {
    let last = labels.last()?;
    if last.contains('-') {
        return last.replace('-', ".").parse().ok();
    }
    if labels.len() < 4 {
        return None;
    }
    labels[labels.len() - 4..].join(".").parse().ok()
}

/// Decode an IPv6 address embedded in subdomain labels.
///
/// In the dash form every dash maps to a colon, so a double dash yields
/// the `::` elision. Otherwise the trailing eight labels are read as
/// colon-separated groups.
///
/// # Arguments
/// * `labels` - The labels in front of the backname marker, in query order.
///
/// # Returns
/// The decoded address, or `None` when the labels do not encode one.
pub fn decode_ipv6(labels: &[&str]) -> Option<Ipv6Addr> {
    let last = labels.last()?;
    if last.contains('-') {
        return last.replace('-', ":").parse().ok();
    }
    if labels.len() < 8 {
        return None;
    }
    labels[labels.len() - 8..].join(":").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_joined_ipv4() {
        assert_eq!(decode_ipv4(&["203-0-113-7"]), "203.0.113.7".parse().ok());
    }

    #[test]
    fn dotted_ipv4_uses_trailing_labels() {
        assert_eq!(
            decode_ipv4(&["203", "0", "113", "7"]),
            "203.0.113.7".parse().ok()
        );
        assert_eq!(
            decode_ipv4(&["extra", "203", "0", "113", "7"]),
            "203.0.113.7".parse().ok()
        );
    }

    #[test]
    fn short_or_garbled_ipv4_is_absent() {
        assert_eq!(decode_ipv4(&["203", "0", "113"]), None);
        assert_eq!(decode_ipv4(&["not-an-address"]), None);
        assert_eq!(decode_ipv4(&["999-0-113-7"]), None);
        assert_eq!(decode_ipv4(&[]), None);
    }

    #[test]
    fn dash_joined_ipv6_maps_double_dash_to_elision() {
        assert_eq!(decode_ipv6(&["2001-db8--1"]), "2001:db8::1".parse().ok());
        assert_eq!(decode_ipv6(&["--1"]), "::1".parse().ok());
    }

    #[test]
    fn dotted_ipv6_uses_trailing_labels() {
        let labels = ["2001", "db8", "0", "0", "0", "0", "0", "1"];
        assert_eq!(decode_ipv6(&labels), "2001:db8::1".parse().ok());
        let extra = ["x", "2001", "db8", "0", "0", "0", "0", "0", "1"];
        assert_eq!(decode_ipv6(&extra), "2001:db8::1".parse().ok());
    }

    #[test]
    fn short_ipv6_is_absent() {
        assert_eq!(decode_ipv6(&["2001", "db8", "1"]), None);
        assert_eq!(decode_ipv6(&[]), None);
    }
}
