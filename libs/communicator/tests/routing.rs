mod common;

use bytes::Bytes;
use common::*;
use communicator::{
    CommError, Communicator, Envelope, KeyBytes, LocalKeys, OnSent, SealError, Sealer,
    X25519Sealer,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default sealer that counts unseal calls
struct CountingSealer {
    unsealed: Arc<AtomicUsize>,
}

impl Sealer for CountingSealer {
    fn seal(
        &self,
        plaintext: &[u8],
        recipient_key: &KeyBytes,
        local: &LocalKeys,
    ) -> Result<Vec<u8>, SealError> {
        X25519Sealer::new().seal(plaintext, recipient_key, local)
    }

    fn unseal(
        &self,
        sealed: &[u8],
        local: &LocalKeys,
        peer_verify_key: &KeyBytes,
    ) -> Result<Vec<u8>, SealError> {
        self.unsealed.fetch_add(1, Ordering::SeqCst);
        X25519Sealer::new().unseal(sealed, local, peer_verify_key)
    }
}

fn counting_node() -> (Communicator, Arc<AtomicUsize>) {
    let unsealed = Arc::new(AtomicUsize::new(0));
    let comm = Communicator::builder(config())
        .sealer(CountingSealer {
            unsealed: unsealed.clone(),
        })
        .register::<Ping>()
        .build()
        .unwrap();
    (comm, unsealed)
}

/// Sealed envelope from `from` to `to`, captured instead of sent
fn captured_envelope(from: &Communicator, to: &Communicator) -> Envelope {
    let captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    from.resolver().add_neighbour(
        to.host_info().clone(),
        Arc::new(move |bytes: Bytes, on_sent: OnSent| {
            *sink.lock() = Some(bytes);
            on_sent();
            Ok(())
        }),
    );
    from.send(&Ping { tag: fresh_tag() }, to.uid(), false).unwrap();
    from.resolver().remove_neighbour(to.uid());

    let bytes = captured.lock().take().unwrap();
    Envelope::from_bytes(&bytes).unwrap()
}

#[test_log::test]
fn deliver_forwards_foreign_envelopes_without_unsealing() {
    let a = node();
    let c = node();
    let (b, unsealed) = counting_node();

    let tap = Arc::new(Mutex::new(Vec::new()));
    b.resolver()
        .add_neighbour(c.host_info().clone(), tapped_link(&c, tap.clone()));

    let original = captured_envelope(&a, &c);
    b.deliver(original.clone()).unwrap();

    assert_eq!(unsealed.load(Ordering::SeqCst), 0);

    let forwarded = Envelope::from_bytes(&tap.lock()[0]).unwrap();
    assert_eq!(forwarded.route(), &[b.uid()]);
    assert_eq!(forwarded.payload(), original.payload());
    assert_eq!(forwarded.message_id(), original.message_id());
    assert_eq!(forwarded.destination(), c.uid());

    for comm in [a, b, c] {
        comm.end();
    }
}

#[test_log::test]
fn reroute_appends_to_existing_trail() {
    let a = node();
    let b = node();
    let c = node();
    b.resolver().add_neighbour(c.host_info().clone(), link(&c));

    let relay = communicator::Uid::generate();
    let original = captured_envelope(&a, &c).add_router(relay);
    let forwarded = b.reroute(original.clone()).unwrap();

    assert_eq!(forwarded.route(), &[relay, b.uid()]);
    assert_eq!(forwarded.payload(), original.payload());

    for comm in [a, b, c] {
        comm.end();
    }
}

#[test_log::test]
fn reroute_drops_loops_and_long_trails() {
    let a = node();
    let c = node();
    let b = Communicator::builder(communicator::CommunicatorConfig {
        max_route_length: 2,
        ..config()
    })
    .build()
    .unwrap();
    b.resolver().add_neighbour(c.host_info().clone(), link(&c));

    let original = captured_envelope(&a, &c);

    let looped = original.add_router(b.uid());
    assert!(matches!(b.reroute(looped), Err(CommError::Protocol { .. })));

    let long = original
        .add_router(communicator::Uid::generate())
        .add_router(communicator::Uid::generate());
    assert!(matches!(b.reroute(long), Err(CommError::Protocol { .. })));

    assert_eq!(b.stats().rerouted, 0);

    for comm in [a, b, c] {
        comm.end();
    }
}

#[test_log::test]
fn reroute_without_route_fails() {
    let a = node();
    let b = node();
    let c = node();

    let original = captured_envelope(&a, &c);
    assert!(matches!(
        b.reroute(original),
        Err(CommError::UnknownPeer { .. })
    ));

    for comm in [a, b, c] {
        comm.end();
    }
}

#[test_log::test]
fn addressed_envelope_is_unsealed_once() {
    let a = node();
    let (b, unsealed) = counting_node();
    connect(&a, &b);

    let tag = fresh_tag();
    a.send(&Ping { tag }, b.uid(), false).unwrap();

    assert!(wait_until(WAIT, || executions(tag) == 1));
    assert_eq!(unsealed.load(Ordering::SeqCst), 1);

    a.end();
    b.end();
}

#[test_log::test]
fn send_uses_first_registered_route() {
    let a = node();
    let far = node();
    let near = node();
    let c = node();

    let far_gate = Arc::new(Gate::default());
    let near_gate = Arc::new(Gate::default());
    assert!(a.resolver().add_routed_neighbour(
        c.host_info().clone(),
        far.uid(),
        far_gate.callback(),
        3,
    ));
    assert!(a.resolver().add_routed_neighbour(
        c.host_info().clone(),
        near.uid(),
        near_gate.callback(),
        1,
    ));

    a.send(&Ping { tag: fresh_tag() }, c.uid(), false).unwrap();
    assert_eq!(far_gate.len(), 1);
    assert_eq!(near_gate.len(), 0);

    for comm in [a, far, near, c] {
        comm.end();
    }
}
