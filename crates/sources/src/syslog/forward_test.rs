//! Tests for datagram forwarding

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::syslog::forward::{ForwardOutcome, ForwardTarget, ForwardTargetError, Forwarder};

#[test]
fn test_parse_ip_and_port() {
    let target = ForwardTarget::parse("127.0.0.1:49515").unwrap();
    assert_eq!(target.host, "127.0.0.1");
    assert_eq!(target.port, 49515);
    assert_eq!(target.to_string(), "127.0.0.1:49515");
}

#[test]
fn test_parse_hostname() {
    let target: ForwardTarget = "relay.local:514".parse().unwrap();
    assert_eq!(target.host, "relay.local");
    assert_eq!(target.port, 514);
}

#[test]
fn test_parse_rejects_wrong_part_count() {
    for bad in ["127.0.0.1", "", "a:b:c", "::1", "[::1]:514"] {
        assert!(
            matches!(
                ForwardTarget::parse(bad),
                Err(ForwardTargetError::Format { .. })
            ),
            "expected format error for {bad:?}"
        );
    }
}

#[test]
fn test_parse_rejects_empty_host() {
    assert!(matches!(
        ForwardTarget::parse(":514"),
        Err(ForwardTargetError::Format { .. })
    ));
}

#[test]
fn test_parse_rejects_bad_port() {
    let err = ForwardTarget::parse("127.0.0.1:syslog").unwrap_err();
    assert!(matches!(err, ForwardTargetError::Port { .. }));
    assert!(err.to_string().contains("syslog"));

    assert!(ForwardTarget::parse("127.0.0.1:70000").is_err());
    assert!(ForwardTarget::parse("127.0.0.1:").is_err());
}

#[test]
fn test_parse_keeps_whitespace() {
    assert!(matches!(
        ForwardTarget::parse("127.0.0.1: 514"),
        Err(ForwardTargetError::Port { .. })
    ));

    let target = ForwardTarget::parse(" relay.local:514").unwrap();
    assert_eq!(target.host, " relay.local");
}

#[tokio::test]
async fn test_resolve_ip_literal() {
    let target = ForwardTarget::parse("127.0.0.1:6000").unwrap();
    let addr = target.resolve().await.unwrap();
    assert_eq!(addr, "127.0.0.1:6000".parse().unwrap());
}

#[tokio::test]
async fn test_no_target_skips() {
    let mut forwarder = Forwarder::new(None);
    assert_eq!(forwarder.forward(b"hello").await, ForwardOutcome::Skipped);
    assert_eq!(forwarder.forward(b"hello").await, ForwardOutcome::Skipped);
}

#[tokio::test]
async fn test_malformed_target_stays_disabled() {
    let mut forwarder = Forwarder::new(Some("127.0.0.1".into()));
    for _ in 0..3 {
        assert_eq!(forwarder.forward(b"hello").await, ForwardOutcome::Disabled);
    }
}

#[tokio::test]
async fn test_forwards_exact_bytes_and_reuses_socket() {
    let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap();

    let mut forwarder = Forwarder::new(Some(relay_addr.to_string()));

    let first = b"<134>Dec 20 12:34:56 host app: first\n";
    let second = b"<134>raw \xff bytes";

    assert_eq!(
        forwarder.forward(first).await,
        ForwardOutcome::Sent {
            bytes: first.len(),
            socket_created: true,
        }
    );
    assert_eq!(
        forwarder.forward(second).await,
        ForwardOutcome::Sent {
            bytes: second.len(),
            socket_created: false,
        }
    );

    let mut buf = [0u8; 256];
    let (n, _) = timeout(Duration::from_secs(1), relay.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], first);

    let (n, _) = timeout(Duration::from_secs(1), relay.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], second);
}

#[tokio::test]
async fn test_send_failure_recreates_socket() {
    // Broadcast without SO_BROADCAST is refused by the kernel
    let mut forwarder = Forwarder::new(Some("255.255.255.255:9".into()));

    for _ in 0..3 {
        assert_eq!(
            forwarder.forward(b"hello").await,
            ForwardOutcome::Failed {
                socket_created: true
            }
        );
    }
}

#[tokio::test]
async fn test_recreated_socket_delivers_after_failure() {
    let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap();

    let mut forwarder = Forwarder::new(Some(relay_addr.to_string()));

    // Larger than any UDP payload: the kernel refuses the send
    let oversized = vec![b'x'; 70_000];
    assert_eq!(
        forwarder.forward(&oversized).await,
        ForwardOutcome::Failed {
            socket_created: true
        }
    );

    let payload = b"<134>Dec 20 12:34:56 host app: recovered";
    assert_eq!(
        forwarder.forward(payload).await,
        ForwardOutcome::Sent {
            bytes: payload.len(),
            socket_created: true,
        }
    );

    let mut buf = [0u8; 256];
    let (n, _) = timeout(Duration::from_secs(1), relay.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], payload);
}
