//! Shared helpers for the integration tests: trusted dealers producing key
//! material and an in-memory message bus driving a set of sessions.

use std::collections::BTreeMap;

use generic_ec::{curves::Secp256k1, Point, Scalar, SecretScalar};
use paillier_zk::libpaillier::{unknown_order::BigNumber, DecryptionKey, EncryptionKey};
use paillier_zk::BigNumberExt;
use rand::{CryptoRng, Rng, RngCore};
use sha2::{Digest, Sha256};

use verglas::{cmp, frost, Driver, Message, PartyId, RoundMsg};

pub type E = Secp256k1;

/// Precomputed 1024-bit primes; generating safe Paillier moduli is far too
/// slow to do inside the tests.
const PRIMES: [&str; 10] = [
    "DDF9C5A6947F6AC440062B5CAE1727119AC978CA402CB5252EE0097EF4646EBA51469A4149EE11C8D03149FFD5D922AF94D89D9C0A6666E9D0BFDF4ADBA9941267EF26DE4A795CE6BE79DDA1B8B630EDCCF0110204BDD2C5CEB040326118C0F92283C87C9970CEE2D301EEDB6264C47F17F614D3515D9859911B6F62A79259BF",
    "FC51045CF6302427308CB7714C6EE2DEE96570821F02CDFA71CF90968E846BD7DB3A0FFE57A66BF8454DED482F5D196A6CB60BAFD76815A91ED86BF1829ED417379717B81533ED0AB6FC708FE2EED31D96A3E99ED9F7D2527F5E1C04E44FBD675BFEAA13369B72305F5FB334E0F01C01D7AEBEBC8245040B0C4CCDEC294B92F1",
    "D7D9146BDBF18AF17991F6E1DA4C28B237392F02C281695F21188A318163D9F4B3C100A92337392D1015F00F7C9F078921DCEC09CB886477EFBF7E9581D155C9B60CF3003B0533C7B44C8ADE22F9A3E08B3589ECDBB0314967C78CCA466CABB679DBEE72D8E01524FC3F787D0DBBE6FBF9D49734EA5A58843C4E59CEB1C4306B",
    "F9640BAFFB7CAA8D78AE76A4099894E009C5FC8BD4402622EEE440432D88ADBD161B014C809EA75063BB866E77E8168B5E3761F2ADF6367739112948BF6F6D5138F4C5A517EBC1292B08444ED6444A64AB0A493EAECF84D6FA77BC6C93737C9896BF9E9B55BDC2704CE932EFB25596F5CF6657D06959EA97E371921E6DB8CD43",
    "EAD0EE9609EE173F08F09F8D53D8113D10AA058AA09D09316041A3FC8C897E80595594A7E3223BF79EE6990783AF9C9C0DED84FC47904562D881C250E3191CCD87315EABD5DBA1592FC26470F538C57F3A2142294CF22497382ED3FDBD10CB8896225726179FCBC0730B1B75F89EA9C4BBAC6E796AE5B691D1B9A0F5645EC991",
    "D7B5C0DFA0FFC011B410B6EF0B728CC8FCB6942389C517145914D16D772155F10D12D326A1D617FD576C71B8D1A23EADC86DF92C379E9F11530410D92558ADEEB56DE123F0DA6923F8451531E2F6842B710F9A71338895C504F277C0A3A945FE7FF40B1CEE7EB108AB07481B6790F2972F226263204E81D8565371D0C8EFBBCF",
    "E49C22FF1142E4196F89099D1C87F042F2970652106455C497EB5624040A9C953737EFBC6FA560179CAB64D23ACB9CB799A8C9436593EC58D00BCA46AFE98DD2184A761860012E78C881525125C2A4573D299E8769AD17DEC392027BA16F6C48348B9B50B3D6E26998B9A1AAB6B90FFF09B1F34460076DCE3736DC88B0F44897",
    "E7B0E6688A445D82F44F3F1BAD693A3A19EE51D2C78F809D7753D41CD7CCEF6DA5C25C530DCCCBFAEC3F55FFFF5BD1519D8F4F829846B35C03DE96056000D2E0EE3A6D95CECC5E90DE9B9FD4112382B77C968A046B6AFD17519A92AF98871E745DAE32D01E7A5D6D9C103F7E48833E0FF56A7E3C5CC98F963AE8D1DB473ECAAB",
    "FA165F697E4C6CC614A58C7E876222E79766587FD0F45A5D34688A4E9433154B44581E32D5FAE3BAABA81403139A3C5C5199B611FFD2A6611B8D1ABD8D029543C9E9BDF2D478163A0180939456261DB7C5C05E1532C360D07199A41809B6D2D46C9F3C501FFFA9C182CF65F8E68DDA89CD1833BB1F10CCE2146AD206089F4A2F",
    "F2D0DE8F14F06538036EECA4A631565D5CF06BFACE4270D498BEEA5E8EAE29FA35DF7ECA28452DE2C1F4F0C9737E230132A0A3B95ACE499AEBDD3520372D9BEFD1FF512401E4C4425244C553140F2273EDE75AE36C84A6FB73FD5A986EC8EC0C029C1CE1E8141A4BFC99E023CFD27BB2DDFC6DAE3DB629DCB3A72B6976893BE9",
];

fn prime(i: usize) -> BigNumber {
    BigNumber::from_slice(hex::decode(PRIMES[i]).expect("valid hex"))
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn share_polynomial<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u16,
    ids: &[PartyId],
) -> (BTreeMap<PartyId, Scalar<E>>, Point<E>) {
    let coefs = (0..=threshold)
        .map(|_| Scalar::<E>::random(rng))
        .collect::<Vec<_>>();
    let eval = |x: &Scalar<E>| {
        coefs
            .iter()
            .rev()
            .fold(Scalar::<E>::zero(), |acc, c| acc * x + c)
    };
    let shares = ids
        .iter()
        .map(|id| (id.clone(), eval(id.to_scalar::<E>().as_ref())))
        .collect::<BTreeMap<_, _>>();
    let public_key = Point::generator() * coefs[0];
    (shares, public_key)
}

/// Deals FROST key shares for the given parties
pub fn frost_dealer<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u16,
    ids: &[&str],
) -> Vec<frost::KeyResult<E>> {
    let ids = ids.iter().map(|id| PartyId::from(*id)).collect::<Vec<_>>();
    let (shares, public_key) = share_polynomial(rng, threshold, &ids);
    let verification_shares = shares
        .iter()
        .map(|(id, share)| (id.clone(), Point::generator() * share))
        .collect::<BTreeMap<_, _>>();

    ids.iter()
        .map(|id| frost::KeyResult {
            threshold,
            self_id: id.clone(),
            private_share: SecretScalar::new(&mut shares[id].clone()),
            public_key,
            verification_shares: verification_shares.clone(),
        })
        .collect()
}

/// Deals FROST key shares with the group key in x-only form
pub fn frost_taproot_dealer<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u16,
    ids: &[&str],
) -> Vec<frost::TaprootKeyResult> {
    let plain = frost_dealer(rng, threshold, ids);
    plain
        .into_iter()
        .map(|key| {
            let compressed = key.public_key.to_bytes(true);
            let mut xonly = [0u8; 32];
            xonly.copy_from_slice(&compressed.as_ref()[1..33]);
            frost::TaprootKeyResult {
                threshold: key.threshold,
                self_id: key.self_id,
                private_share: key.private_share,
                public_key: xonly,
                verification_shares: key.verification_shares,
            }
        })
        .collect()
}

/// Deals CMP key configs (ECDSA shares, Paillier keys, Pedersen parameters)
/// for the given parties
pub fn cmp_dealer<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u16,
    ids: &[&str],
) -> Vec<cmp::KeyConfig<E>> {
    assert!(ids.len() * 2 <= PRIMES.len(), "not enough fixture primes");
    let ids = ids.iter().map(|id| PartyId::from(*id)).collect::<Vec<_>>();
    let (shares, public_key) = share_polynomial(rng, threshold, &ids);
    let rid: [u8; 32] = rng.gen();
    let chain_key: [u8; 32] = rng.gen();

    let elgamal = ids
        .iter()
        .map(|id| (id.clone(), Scalar::<E>::random(rng)))
        .collect::<BTreeMap<_, _>>();
    let paillier = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let (p, q) = (prime(2 * i), prime(2 * i + 1));
            let dec = DecryptionKey::with_primes(&p, &q).expect("fixture primes are valid");
            (id.clone(), (p, q, EncryptionKey::from(&dec)))
        })
        .collect::<BTreeMap<_, _>>();

    let two = BigNumber::one() + BigNumber::one();
    let parties = ids
        .iter()
        .map(|id| {
            let (_, _, enc) = &paillier[id];
            let base = BigNumber::from_rng(enc.n(), rng).modpow(&two, enc.n());
            let exponent = BigNumber::from_rng(enc.n(), rng);
            let public = cmp::PartyPublic {
                ecdsa: Point::generator() * &shares[id],
                elgamal: Point::generator() * &elgamal[id],
                paillier: enc.clone(),
                pedersen_s: base.modpow(&exponent, enc.n()),
                pedersen_t: base,
            };
            (id.clone(), public)
        })
        .collect::<BTreeMap<_, _>>();

    ids.iter()
        .map(|id| {
            let (p, q, _) = &paillier[id];
            cmp::KeyConfig {
                self_id: id.clone(),
                threshold,
                rid,
                chain_key,
                public_key,
                ecdsa: SecretScalar::new(&mut shares[id].clone()),
                elgamal: SecretScalar::new(&mut elgamal[id].clone()),
                paillier_p: p.clone(),
                paillier_q: q.clone(),
                parties: parties.clone(),
            }
        })
        .collect()
}

/// Delivers messages between the drivers until the network goes quiet
///
/// Broadcasts are expanded into one delivery per recipient. `tamper` may
/// modify any delivery in flight (simulating a dishonest sender); `shuffle`
/// permutes the delivery order of every batch.
pub fn run_network<M, O, R>(
    drivers: &mut [Driver<M, O>],
    rng: &mut R,
    shuffle: bool,
    mut tamper: impl FnMut(&PartyId, &PartyId, &mut M),
) where
    M: RoundMsg + Clone,
    R: RngCore,
{
    use rand::seq::SliceRandom;

    let index: BTreeMap<PartyId, usize> = drivers
        .iter()
        .enumerate()
        .map(|(i, driver)| (driver.info().self_id.clone(), i))
        .collect();

    for _ in 0..64 {
        let mut deliveries: Vec<(usize, Message<M>)> = Vec::new();
        for driver in drivers.iter_mut() {
            let self_id = driver.info().self_id.clone();
            for msg in driver.outgoing() {
                match &msg.to {
                    Some(to) => deliveries.push((index[to], msg)),
                    None => {
                        for (id, &i) in &index {
                            if *id != self_id {
                                let mut copy = msg.clone();
                                copy.to = None;
                                deliveries.push((i, copy));
                            }
                        }
                    }
                }
            }
        }
        if deliveries.is_empty() {
            return;
        }
        if shuffle {
            deliveries.shuffle(rng);
        }
        for (target, mut msg) in deliveries {
            let to = drivers[target].info().self_id.clone();
            let from = msg.from.clone();
            tamper(&from, &to, &mut msg.content);
            if drivers[target].is_finished() {
                continue;
            }
            drivers[target]
                .handle(msg)
                .unwrap_or_else(|err| panic!("delivery to {to} failed: {err}"));
        }
    }
    panic!("network did not go quiet");
}

/// `tamper` argument for honest runs
pub fn honest<M>(_from: &PartyId, _to: &PartyId, _content: &mut M) {}
