//! Driver-level behavior: buffering, duplicate suppression, roster checks

use verglas::{frost, Driver, Error, Message, MessageError, PartyId};
use verglas_tests::{frost_dealer, sha256, E};

type FrostDriver = Driver<frost::Msg<E>, frost::Signature<E>>;

fn two_party_session() -> (FrostDriver, FrostDriver, [u8; 32]) {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob"]);
    let signers = [PartyId::from("alice"), PartyId::from("bob")];
    let msg = sha256(b"engine");
    let alice = Driver::start(frost::sign(&keys[0], &signers, &msg), rng.fork()).unwrap();
    let bob = Driver::start(frost::sign(&keys[1], &signers, &msg), rng.fork()).unwrap();
    (alice, bob, msg)
}

/// Messages for a future round are buffered and replayed once the round
/// becomes current.
#[test]
fn future_round_messages_are_buffered() {
    let (mut alice, mut bob, _msg) = two_party_session();

    let alice_r2 = alice.outgoing();
    let mut bob_r2 = bob.outgoing();

    // run bob ahead: he gets alice's commitments and emits his share
    for msg in alice_r2 {
        bob.handle(msg).unwrap();
    }
    let bob_r3 = bob.outgoing();
    assert!(!bob.is_finished());

    // alice receives bob's round-3 share before his round-2 commitments
    for msg in bob_r3 {
        alice.handle(msg).unwrap();
    }
    assert!(!alice.is_finished(), "round-3 share must be buffered");
    assert_eq!(alice.current_round(), Some(2));

    // once the commitments arrive, the buffered share completes the session
    alice.handle(bob_r2.remove(0)).unwrap();
    assert!(alice.is_finished());
    let signature = *alice.session().unwrap().completed().unwrap();

    for msg in alice.outgoing() {
        if bob.is_finished() {
            break;
        }
        bob.handle(msg).unwrap();
    }
    assert_eq!(signature, *bob.session().unwrap().completed().unwrap());
}

/// A second message of the same kind from the same party is dropped while the
/// round keeps waiting for the remaining peers.
#[test]
fn duplicates_are_dropped() {
    let mut rng = rand_dev::DevRng::new();
    let keys = frost_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let msg = sha256(b"duplicates");
    let mut alice: FrostDriver =
        Driver::start(frost::sign(&keys[0], &signers, &msg), rng.fork()).unwrap();
    let mut bob: FrostDriver =
        Driver::start(frost::sign(&keys[1], &signers, &msg), rng.fork()).unwrap();

    let _ = alice.outgoing();
    let bob_r2 = bob.outgoing();

    // carol's commitment is still missing, so round 2 stays active
    alice.handle(bob_r2[0].clone()).unwrap();
    let result = alice.handle(bob_r2[0].clone());
    assert!(matches!(
        result,
        Err(Error::Message(MessageError::Duplicate { round: 2 }))
    ));
    // the session survives the duplicate
    assert!(!alice.is_finished());
    assert_eq!(alice.current_round(), Some(2));
}

#[test]
fn foreign_senders_are_dropped() {
    let (mut alice, mut bob, _msg) = two_party_session();

    let _ = alice.outgoing();
    let mut msg = bob.outgoing().remove(0);
    msg.from = PartyId::from("mallory");

    assert!(matches!(
        alice.handle(msg),
        Err(Error::Message(MessageError::UnknownSender))
    ));
}

#[test]
fn own_messages_are_dropped() {
    let (mut alice, _bob, _msg) = two_party_session();

    let echo: Message<frost::Msg<E>> = alice.outgoing().remove(0);
    assert!(matches!(
        alice.handle(echo),
        Err(Error::Message(MessageError::OwnMessage))
    ));
}

#[test]
fn finished_sessions_reject_messages() {
    let (mut alice, mut bob, _msg) = two_party_session();

    let alice_out = alice.outgoing();
    let bob_out = bob.outgoing();
    for msg in bob_out.iter().cloned() {
        alice.handle(msg).unwrap();
    }
    for msg in alice_out {
        bob.handle(msg).unwrap();
    }
    for msg in alice.outgoing() {
        bob.handle(msg).unwrap();
    }
    for msg in bob.outgoing() {
        alice.handle(msg).unwrap();
    }
    assert!(alice.is_finished() && bob.is_finished());

    let result = alice.handle(bob_out[0].clone());
    assert!(matches!(result, Err(Error::Finished)));
}
