//! Ciphertext codec at the deployed parameters (N = 8192, 512 values).

mod common;

use face_fhe_service::crypto::{self, EncryptedVector};
use face_fhe_service::error::ServiceError;

/// A unit embedding's encrypted self inner product decrypts to one.
#[test]
fn self_dot_product_is_one() {
    let context = common::face_context();
    let public = context.to_public();

    for seed in [1, 2, 3] {
        let vector = common::face_embedding(seed);
        let wire = crypto::encrypt(context, &vector)
            .unwrap()
            .to_base64()
            .unwrap();

        // The compute side sees only the public context.
        let probe = EncryptedVector::from_base64(&wire).unwrap().link(&public).unwrap();
        let result = probe.dot(&probe).unwrap().into_unlinked().to_base64().unwrap();

        let value = EncryptedVector::from_base64(&result)
            .unwrap()
            .link(context)
            .unwrap()
            .decrypt_scalar()
            .unwrap();
        common::assert_close(value, 1.0, 1e-3);
    }
}

/// Encrypted cosine and squared distance agree with plaintext math.
#[test]
fn similarity_matches_plaintext() {
    let context = common::face_context();
    let a = common::face_embedding(10);
    let b = common::face_embedding(11);
    let expected_dot = a.dot(&b);

    let ea = crypto::encrypt(context, &a).unwrap().link(context).unwrap();
    let eb = crypto::encrypt(context, &b).unwrap().link(context).unwrap();

    let dot = ea.dot(&eb).unwrap().decrypt_scalar().unwrap();
    assert!((dot - expected_dot).abs() < 1e-3, "{dot} vs {expected_dot}");

    let distance = ea.squared_distance(&eb).unwrap().decrypt_scalar().unwrap();
    let expected_distance = 2.0 - 2.0 * expected_dot;
    assert!(
        (distance - expected_distance).abs() < 2e-3,
        "{distance} vs {expected_distance}"
    );
}

/// The deployed context refuses embeddings of any other length.
#[test]
fn wrong_length_embedding_is_rejected() {
    let context = common::face_context();
    let short = face_fhe_service::test_support::ckks::unit_vector(128, 4);

    let err = crypto::encrypt(context, &short).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::DimensionMismatch {
            expected: 512,
            actual: 128
        }
    ));
}

/// Ciphertexts from the small test ring do not link to the deployed one.
#[test]
fn ciphertext_from_other_parameters_is_incompatible() {
    use face_fhe_service::test_support::ckks::{small_secret_context, unit_vector, SMALL_DIM};

    let foreign = crypto::encrypt(small_secret_context(), &unit_vector(SMALL_DIM, 5)).unwrap();
    let err = foreign.link(common::face_context()).unwrap_err();
    assert!(matches!(err, ServiceError::IncompatibleContext(_)));
}
