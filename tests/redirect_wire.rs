//! Wire-level behavior of the captive DNS redirect and the name service.

use core::net::Ipv4Addr;
use wifi_kit::{build_host_reply, build_redirect_reply, query_matches_host};

/// Build a DNS query for `labels` (e.g. `["example", "com"]`).
fn query(labels: &[&str], qtype: u16) -> Vec<u8> {
    let mut frame = vec![
        0x12, 0x34, // ID
        0x01, 0x00, // RD
        0x00, 0x01, // QDCOUNT
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    for label in labels {
        frame.push(label.len() as u8);
        frame.extend_from_slice(label.as_bytes());
    }
    frame.push(0);
    frame.extend_from_slice(&qtype.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01]); // IN
    frame
}

#[test]
fn redirect_answers_any_query_with_the_portal_address() {
    let portal = Ipv4Addr::new(192, 168, 1, 100);
    let frame = query(&["connectivity-check", "example", "com"], 1);
    let mut reply = [0u8; 512];

    let len = build_redirect_reply(&frame, &mut reply, portal).unwrap();

    assert_eq!(len, frame.len() + 16);
    // Response + authoritative, one answer.
    assert_eq!(reply[2], 0x84);
    assert_eq!(&reply[6..8], &[0x00, 0x01]);
    // ID and question echoed, then a pointer-named A record ending in the
    // portal address.
    assert_eq!(&reply[..2], &frame[..2]);
    assert_eq!(&reply[12..frame.len()], &frame[12..]);
    assert_eq!(&reply[frame.len()..frame.len() + 2], &[0xC0, 0x0C]);
    assert_eq!(&reply[len - 4..len], &[192, 168, 1, 100]);
}

#[test]
fn redirect_ignores_runts() {
    let mut reply = [0u8; 512];
    assert!(build_redirect_reply(&[0u8; 11], &mut reply, Ipv4Addr::LOCALHOST).is_none());
}

#[test]
fn name_service_matches_only_its_own_hostname() {
    let mine = query(&["unit-box", "local"], 1);
    let other = query(&["printer", "local"], 1);
    let wrong_domain = query(&["unit-box", "lan"], 1);
    let any_type = query(&["unit-box", "local"], 255);

    assert!(query_matches_host(&mine, "unit-box"));
    assert!(query_matches_host(&any_type, "unit-box"));
    assert!(!query_matches_host(&other, "unit-box"));
    assert!(!query_matches_host(&wrong_domain, "unit-box"));
}

#[test]
fn name_service_matching_is_case_insensitive() {
    let frame = query(&["Unit-Box", "LOCAL"], 1);
    assert!(query_matches_host(&frame, "unit-box"));
}

#[test]
fn name_service_ignores_responses() {
    let mut frame = query(&["unit-box", "local"], 1);
    frame[2] |= 0x80; // QR: this is a response
    assert!(!query_matches_host(&frame, "unit-box"));
}

#[test]
fn name_reply_carries_the_address() {
    let mut reply = [0u8; 128];
    let address = Ipv4Addr::new(192, 168, 1, 23);

    let len = build_host_reply(&mut reply, "unit-box", address).unwrap();

    // Authoritative response with one answer.
    assert_eq!(reply[2], 0x84);
    assert_eq!(&reply[6..8], &[0x00, 0x01]);
    // Name: "unit-box" "local" root.
    assert_eq!(reply[12], 8);
    assert_eq!(&reply[13..21], b"unit-box");
    assert_eq!(reply[21], 5);
    assert_eq!(&reply[22..27], b"local");
    assert_eq!(reply[27], 0);
    // The record ends in the advertised address.
    assert_eq!(&reply[len - 4..len], &[192, 168, 1, 23]);
}

#[test]
fn name_reply_rejects_illegal_labels() {
    let mut reply = [0u8; 128];
    assert!(build_host_reply(&mut reply, "", Ipv4Addr::LOCALHOST).is_none());
    let long = "x".repeat(64);
    assert!(build_host_reply(&mut reply, &long, Ipv4Addr::LOCALHOST).is_none());
}
