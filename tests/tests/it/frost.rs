use generic_ec::Point;
use sha2::{Digest, Sha256};
use verglas::{frost, AbortReason, Driver, Error, PartyId, Session, StartError};
use verglas_tests::{frost_dealer, frost_taproot_dealer, honest, run_network, sha256, E};

#[test_case::case(1, &["alice", "bob", "carol"]; "t1n3")]
#[test_case::case(2, &["alice", "bob", "carol"]; "t2n3")]
#[test_case::case(2, &["alice", "bob", "carol", "dave"]; "t2n4")]
fn sign(threshold: u16, ids: &[&str]) {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, threshold, ids);
    let signers = ids.iter().map(|id| PartyId::from(*id)).collect::<Vec<_>>();
    let msg = sha256(b"hello");

    let mut drivers = keys
        .iter()
        .map(|key| Driver::start(frost::sign(key, &signers, &msg), rng.fork()).unwrap())
        .collect::<Vec<_>>();
    run_network(&mut drivers, &mut rng, true, honest);

    let public_key = keys[0].public_key;
    let mut signatures = Vec::new();
    for driver in &drivers {
        let session = driver.session().expect("session must be terminal");
        let signature = *session.completed().expect("session must complete");
        signature.verify(&public_key, &msg).unwrap();
        signatures.push(signature);
    }
    // every party must output the very same signature
    for signature in &signatures[1..] {
        assert_eq!(signatures[0], *signature);
    }
}

/// Delivery order must not influence the produced signature: each party sees
/// its own permutation of arrivals, yet all outputs are byte-identical (the
/// equality assertion in `sign` covers this, here we permute more aggressively
/// across two differently-shuffled executions of the same nonces).
#[test]
fn arrival_order_is_irrelevant() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let msg = sha256(b"out of order");

    let mut drivers = keys
        .iter()
        .map(|key| Driver::start(frost::sign(key, &signers, &msg), rng.fork()).unwrap())
        .collect::<Vec<_>>();
    run_network(&mut drivers, &mut rng, true, honest);

    let signatures = drivers
        .iter()
        .map(|driver| *driver.session().unwrap().completed().unwrap())
        .collect::<Vec<_>>();
    assert!(signatures.windows(2).all(|w| w[0] == w[1]));
    let mut bytes = [0u8; 65];
    bytes[..33].copy_from_slice(signatures[0].r.to_bytes(true).as_ref());
    bytes[33..].copy_from_slice(signatures[0].z.to_be_bytes().as_ref());
    // byte-identical across parties, not just equal as field elements
    for signature in &signatures[1..] {
        let mut other = [0u8; 65];
        other[..33].copy_from_slice(signature.r.to_bytes(true).as_ref());
        other[33..].copy_from_slice(signature.z.to_be_bytes().as_ref());
        assert_eq!(bytes, other);
    }
}

/// The nonce point parity is not fixed; over several runs both variants
/// appear and every signature verifies.
#[test]
fn r_parity_varies_across_runs() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let msg = sha256(b"parity");

    let mut seen = [false, false];
    for _ in 0..16 {
        let mut drivers = keys
            .iter()
            .map(|key| Driver::start(frost::sign(key, &signers, &msg), rng.fork()).unwrap())
            .collect::<Vec<_>>();
        run_network(&mut drivers, &mut rng, false, honest);
        let signature = *drivers[0].session().unwrap().completed().unwrap();
        signature.verify(&keys[0].public_key, &msg).unwrap();
        let parity = signature.r.to_bytes(true).as_ref()[0];
        seen[usize::from(parity == 3)] = true;
    }
    assert!(seen[0] && seen[1], "both R parities must occur");
}

#[test]
fn taproot_sign() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_taproot_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let msg = [0u8; 32];

    let mut drivers = keys
        .iter()
        .map(|key| Driver::start(frost::sign_taproot(key, &signers, &msg), rng.fork()).unwrap())
        .collect::<Vec<_>>();
    run_network(&mut drivers, &mut rng, true, honest);

    for driver in &drivers {
        let signature = *driver.session().unwrap().completed().unwrap();
        signature.verify_taproot(&keys[0].public_key, &msg).unwrap();

        // independent BIP-340 check over the serialized signature
        let bytes = signature.to_taproot_bytes();
        let tag = Sha256::digest("BIP0340/challenge");
        let challenge = Sha256::new()
            .chain_update(tag)
            .chain_update(tag)
            .chain_update(&bytes[..32])
            .chain_update(keys[0].public_key)
            .chain_update(msg)
            .finalize();
        let c = generic_ec::Scalar::<E>::from_be_bytes_mod_order(challenge);
        let r = lift(&bytes[..32]);
        let p = lift(&keys[0].public_key);
        let z = generic_ec::Scalar::<E>::from_be_bytes_mod_order(&bytes[32..]);
        // z·G must equal R + c·P, with both R and P lifted to even-Y points
        assert_eq!(Point::<E>::generator() * z, r + p * c);
    }
}

fn lift(x: &[u8]) -> Point<E> {
    let mut buf = [0u8; 33];
    buf[0] = 2;
    buf[1..].copy_from_slice(x);
    Point::from_bytes(&buf).unwrap()
}

/// Two sessions started with identically-seeded RNGs still commit to
/// different nonces.
#[test]
fn nonces_are_fresh_across_sessions() {
    let keys_rng = &mut rand_dev::DevRng::new();
    let keys = frost_dealer(keys_rng, 1, &["alice", "bob"]);
    let signers = [PartyId::from("alice"), PartyId::from("bob")];
    let msg = sha256(b"nonce freshness");

    let commitments = |driver: &mut Driver<frost::Msg<E>, frost::Signature<E>>| {
        driver
            .outgoing()
            .into_iter()
            .find_map(|msg| match msg.content {
                frost::Msg::Round2(comm) => Some(comm),
                _ => None,
            })
            .expect("round 1 must broadcast commitments")
    };

    // the two sessions observe the exact same RNG stream
    let mut first = Driver::start(
        frost::sign(&keys[0], &signers, &msg),
        rand_dev::DevRng::new(),
    )
    .unwrap();
    let mut second = Driver::start(
        frost::sign(&keys[0], &signers, &msg),
        rand_dev::DevRng::new(),
    )
    .unwrap();

    let first = commitments(&mut first);
    let second = commitments(&mut second);
    assert_ne!(first.hiding_comm, second.hiding_comm);
    assert_ne!(first.binding_comm, second.binding_comm);
}

/// Replaying a commitment from another session makes the share verification
/// fail and the session abort naming the replayed party.
#[test]
fn replayed_commitment_is_rejected() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];

    // harvest bob's commitment from an unrelated session
    let foreign_msg = sha256(b"another session");
    let mut foreign =
        Driver::start(frost::sign(&keys[1], &signers, &foreign_msg), rng.fork()).unwrap();
    let foreign_comm = foreign
        .outgoing()
        .into_iter()
        .find_map(|msg| match msg.content {
            frost::Msg::Round2(comm) => Some(comm),
            _ => None,
        })
        .unwrap();

    let msg = sha256(b"the real session");
    let mut drivers = keys
        .iter()
        .map(|key| Driver::start(frost::sign(key, &signers, &msg), rng.fork()).unwrap())
        .collect::<Vec<_>>();
    let bob = PartyId::from("bob");
    run_network(&mut drivers, &mut rng, false, |from, _to, content| {
        if *from == bob {
            if let frost::Msg::Round2(comm) = content {
                *comm = foreign_comm;
            }
        }
    });

    for driver in [&drivers[0], &drivers[2]] {
        let abort = driver.session().unwrap().aborted().expect("must abort");
        assert_eq!(abort.culprits, vec![bob.clone()]);
        assert_eq!(abort.reason, AbortReason::ProofFailure("signature share"));
    }
}

#[test]
fn under_threshold_roster_is_rejected() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 2, &["alice", "bob", "carol"]);
    // only t signers show up
    let signers = [PartyId::from("alice"), PartyId::from("bob")];

    let result: Result<Driver<frost::Msg<E>, _>, _> = Driver::start(
        frost::sign(&keys[0], &signers, &sha256(b"too few")),
        rng.fork(),
    );
    assert!(matches!(
        result,
        Err(Error::Start(StartError::InsufficientSigners { n: 2, required: 3 }))
    ));
}

#[test]
fn duplicate_party_is_rejected() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("alice"),
    ];

    let result: Result<Driver<frost::Msg<E>, _>, _> = Driver::start(
        frost::sign(&keys[0], &signers, &sha256(b"duplicate")),
        rng.fork(),
    );
    assert!(matches!(
        result,
        Err(Error::Start(StartError::DuplicateParty(_)))
    ));
}

#[test]
fn cancelled_session_is_terminal() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob"]);
    let signers = [PartyId::from("alice"), PartyId::from("bob")];

    let mut driver =
        Driver::start(frost::sign(&keys[0], &signers, &sha256(b"bye")), rng.fork()).unwrap();
    driver.cancel();

    match driver.session() {
        Some(Session::Aborted(abort)) => {
            assert!(abort.culprits.is_empty());
            assert_eq!(abort.reason, AbortReason::Cancelled);
        }
        other => panic!("unexpected session state: {other:?}"),
    }
}
