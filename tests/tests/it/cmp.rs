use generic_ec::Scalar;
use sha2::Sha256;
use verglas::{cmp, AbortReason, Driver, PartyId};
use verglas_tests::{cmp_dealer, honest, run_network};

#[test]
fn sign_2_of_4() {
    let mut rng = rand_dev::DevRng::new();
    let configs = cmp_dealer(&mut rng, 2, &["alice", "bob", "carol", "dave"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
        PartyId::from("dave"),
    ];
    let data = cmp::DataToSign::digest::<Sha256>(b"abc");

    let mut drivers = configs
        .iter()
        .map(|config| Driver::start(cmp::sign(config, &signers, data), rng.fork()).unwrap())
        .collect::<Vec<_>>();
    run_network(&mut drivers, &mut rng, true, honest);

    let mut signatures = Vec::new();
    for driver in &drivers {
        let session = driver.session().expect("session must be terminal");
        let signature = *session.completed().expect("session must complete");
        signature.verify(&configs[0].public_key, &data).unwrap();
        // the protocol outputs low-S signatures
        assert_eq!(signature, signature.normalize_s());
        signatures.push(signature);
    }
    for signature in &signatures[1..] {
        assert_eq!(signatures[0], *signature);
    }
}

/// A party claiming a delta share inconsistent with its MtA transcript is
/// identified by the abort subprotocol.
#[test]
fn delta_cheater_is_identified() {
    let mut rng = rand_dev::DevRng::new();
    let configs = cmp_dealer(&mut rng, 2, &["alice", "bob", "carol", "dave"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
        PartyId::from("dave"),
    ];
    let data = cmp::DataToSign::digest::<Sha256>(b"cheated delta");

    let mut drivers = configs
        .iter()
        .map(|config| Driver::start(cmp::sign(config, &signers, data), rng.fork()).unwrap())
        .collect::<Vec<_>>();

    let carol = PartyId::from("carol");
    let bob = PartyId::from("bob");
    run_network(&mut drivers, &mut rng, false, |from, to, content| {
        if let cmp::Msg::Round4Bcast(body) = content {
            // carol announces a shifted delta share to everyone...
            if *from == carol {
                body.delta = body.delta + Scalar::one();
            }
            // ...and carol's own view is poisoned as well, so she reaches the
            // abort gate like everybody else
            if *from == bob && *to == carol {
                body.delta = body.delta + Scalar::one();
            }
        }
    });

    for (i, driver) in drivers.iter().enumerate() {
        let abort = driver
            .session()
            .expect("session must be terminal")
            .aborted()
            .expect("session must abort");
        assert_eq!(abort.reason, AbortReason::DeltaInconsistency);
        if signers[i] != carol {
            assert_eq!(abort.culprits, vec![carol.clone()]);
        }
    }
}

/// A party broadcasting a wrong signature share is identified by the
/// sigma-path abort.
#[test]
fn sigma_cheater_is_identified() {
    let mut rng = rand_dev::DevRng::new();
    let configs = cmp_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let data = cmp::DataToSign::digest::<Sha256>(b"cheated sigma");

    let mut drivers = configs
        .iter()
        .map(|config| Driver::start(cmp::sign(config, &signers, data), rng.fork()).unwrap())
        .collect::<Vec<_>>();

    let carol = PartyId::from("carol");
    let bob = PartyId::from("bob");
    run_network(&mut drivers, &mut rng, false, |from, to, content| {
        if let cmp::Msg::Round5Bcast(body) = content {
            if *from == carol {
                body.sigma = body.sigma + Scalar::one();
            }
            if *from == bob && *to == carol {
                body.sigma = body.sigma + Scalar::one();
            }
        }
    });

    for (i, driver) in drivers.iter().enumerate() {
        let abort = driver
            .session()
            .expect("session must be terminal")
            .aborted()
            .expect("session must abort");
        assert_eq!(abort.reason, AbortReason::SigmaInconsistency);
        if signers[i] != carol {
            assert_eq!(abort.culprits, vec![carol.clone()]);
        }
    }
}

/// Tampering with a range proof in flight aborts the session naming the
/// apparent sender.
#[test]
fn invalid_mta_proof_names_the_sender() {
    let mut rng = rand_dev::DevRng::new();
    let configs = cmp_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let data = cmp::DataToSign::digest::<Sha256>(b"bad proof");

    let mut drivers = configs
        .iter()
        .map(|config| Driver::start(cmp::sign(config, &signers, data), rng.fork()).unwrap())
        .collect::<Vec<_>>();

    let carol = PartyId::from("carol");
    let alice = PartyId::from("alice");
    run_network(&mut drivers, &mut rng, false, |from, to, content| {
        if let cmp::Msg::Round3Direct(body) = content {
            if *from == carol && *to == alice {
                // shifting Γ invalidates the aff-g statement
                body.Gamma = body.Gamma + generic_ec::Point::generator().to_point();
            }
        }
    });

    let abort = drivers[0]
        .session()
        .expect("alice must be terminal")
        .aborted()
        .expect("alice must abort");
    assert_eq!(abort.culprits, vec![carol.clone()]);
    assert_eq!(abort.reason, AbortReason::ProofFailure("aff-g"));
}

/// When parties observe different round-2 broadcasts, no culprit can be named
/// and the whole roster is suspect.
#[test]
fn echo_mismatch_suspects_the_roster() {
    let mut rng = rand_dev::DevRng::new();
    let configs = cmp_dealer(&mut rng, 1, &["alice", "bob", "carol"]);
    let signers = [
        PartyId::from("alice"),
        PartyId::from("bob"),
        PartyId::from("carol"),
    ];
    let data = cmp::DataToSign::digest::<Sha256>(b"echo");

    let mut drivers = configs
        .iter()
        .map(|config| Driver::start(cmp::sign(config, &signers, data), rng.fork()).unwrap())
        .collect::<Vec<_>>();

    let carol = PartyId::from("carol");
    let alice = PartyId::from("alice");
    run_network(&mut drivers, &mut rng, false, |from, to, content| {
        if let cmp::Msg::Round3Bcast(body) = content {
            if *from == carol && *to == alice {
                body.echo[0] ^= 1;
            }
        }
    });

    let abort = drivers[0]
        .session()
        .expect("alice must be terminal")
        .aborted()
        .expect("alice must abort");
    assert_eq!(abort.reason, AbortReason::EchoMismatch);
    assert_eq!(abort.culprits, signers.to_vec());
}
