use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stegstr_engine::dct::{self, BLOCK_AREA};
use stegstr_engine::{StegError, reed_solomon};

fn random_bytes(rng: &mut ChaCha8Rng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random()).collect()
}

#[test]
fn test_fec_corrects_half_nsym_and_rejects_nsym_plus_one() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xFEC);
    for nsym in [16usize, 64] {
        for round in 0..5 {
            let data = random_bytes(&mut rng, 255 - nsym - round * 20);
            let codeword = reed_solomon::encode(&data, nsym).unwrap();

            let mut correctable = codeword.clone();
            for p in sample(&mut rng, codeword.len(), nsym / 2).into_vec() {
                correctable[p] ^= rng.random_range(1..=255u8);
            }
            assert_eq!(reed_solomon::decode(&correctable, nsym, &[]).unwrap(), data);

            let mut broken = codeword.clone();
            for p in sample(&mut rng, codeword.len(), nsym + 1).into_vec() {
                broken[p] ^= rng.random_range(1..=255u8);
            }
            let result = reed_solomon::decode(&broken, nsym, &[]);
            assert!(
                matches!(result, Err(StegError::Uncorrectable(_))),
                "nsym={nsym} round={round}: {result:?}"
            );
        }
    }
}

#[test]
fn test_quantization_table_properties() {
    assert_eq!(dct::quantization_table(50).unwrap(), dct::BASE_LUMINANCE_TABLE);
    for quality in 1..=100u8 {
        let table = dct::quantization_table(quality).unwrap();
        assert!(table.iter().all(|&q| q >= 1), "quality {quality}");
    }
    assert!(matches!(dct::quantization_table(0), Err(StegError::Domain(_))));
    assert!(matches!(dct::quantization_table(101), Err(StegError::Domain(_))));
}

#[test]
fn test_dct_inverse_property() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xDC7);
    for _ in 0..50 {
        let mut block = [0.0f64; BLOCK_AREA];
        for v in block.iter_mut() {
            *v = rng.random_range(-128..=127) as f64;
        }
        let restored = dct::inverse_dct(&dct::forward_dct(&block));
        for (a, b) in block.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }
}
