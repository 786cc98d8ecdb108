//! Integration tests for socket options and the dial retry policy

use keel_core::options::SocketOptions;
use keel_core::reconnect::RetryState;
use std::time::Duration;

#[test]
fn test_retry_follows_options() {
    let opts = SocketOptions::new()
        .with_reconnect_ivl(Duration::from_millis(40))
        .with_connect_attempts(2);

    let mut retry = RetryState::new(&opts);
    assert_eq!(retry.next_delay(), Duration::from_millis(40));
    assert!(!retry.exhausted());
    assert_eq!(retry.next_delay(), Duration::from_millis(40));
    assert!(retry.exhausted());
}

#[test]
fn test_options_are_per_socket() {
    let a = SocketOptions::new().with_reconnect_ivl(Duration::from_millis(10));
    let b = SocketOptions::default();

    // Changing one set of options never leaks into another
    assert_eq!(a.reconnect_ivl, Duration::from_millis(10));
    assert_eq!(b.reconnect_ivl, Duration::from_millis(250));
}

#[test]
fn test_timeouts_default_to_blocking() {
    let opts = SocketOptions::default();
    assert_eq!(opts.send_timeout, None);
    assert_eq!(opts.recv_timeout, None);
    assert_eq!(opts.read_buffer_size, 8192);

    let opts = opts
        .with_recv_timeout(Duration::from_millis(100))
        .with_read_buffer_size(4096);
    assert_eq!(opts.recv_timeout, Some(Duration::from_millis(100)));
    assert_eq!(opts.read_buffer_size, 4096);
}

#[test]
fn test_metadata_properties() {
    let opts = SocketOptions::new()
        .with_property("Identity", "edge-7")
        .with_property("identity", "edge-8");

    assert_eq!(opts.metadata.len(), 1);
    assert_eq!(opts.metadata.get("Identity").unwrap().as_ref(), b"edge-8");
}
