use super::codec::{decode_key, KeyPair, Prefix};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, VerifyingKey, PUBLIC_KEY_LENGTH};

impl KeyPair {
    /// Sign `message` (the server nonce bytes, UTF-8 encoded) and return the
    /// signature as standard base64, padding included.
    pub fn sign(&self, message: &[u8]) -> String {
        let sig: Signature = self.signing_key.sign(message);
        STANDARD.encode(sig.to_bytes())
    }
}

/// Verify `signature` (standard base64) over `message` against a public
/// key in its prefixed-checksummed text form.
///
/// Keys longer than the Ed25519 public-key size are truncated to the
/// expected length, tolerating text forms where a prefix byte has already
/// been stripped by an upstream decoder.
pub fn verify(public_key_text: &str, message: &[u8], signature_b64: &str) -> bool {
    let Ok(mut key_bytes) = decode_key(public_key_text, Prefix::User)
        .or_else(|_| decode_key(public_key_text, Prefix::Account))
        .or_else(|_| decode_key(public_key_text, Prefix::Server))
        .or_else(|_| decode_key(public_key_text, Prefix::Cluster))
        .or_else(|_| decode_key(public_key_text, Prefix::Operator))
    else {
        return false;
    };
    key_bytes.truncate(PUBLIC_KEY_LENGTH);
    let Ok(key_array): Result<[u8; PUBLIC_KEY_LENGTH], _> = key_bytes.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    verifying_key.verify_strict(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "SUACSSL3UAHUDXKFSNVUZRF5UHPMWZ6BFDTJ7M6USDXIEDNPPQYYYCU3VY";
    const PUBLIC: &str = "UDXU4RCSJNZOIQHZNWXHXORDPRTGNJAHAHFRGZNEEJCPQTT2M7NLCNF4";
    const NONCE: &[u8] = b"DhXdTMAeiHhLDig";
    const EXPECTED_SIG: &str =
        "WosANJXgeyxerXFo0twRiMG+/ZjYp1K/46bFeFax705yFTCTjM18jWl01gGYk4KKbadiHd+hP3WgUQ2iLZUAAA==";

    #[test]
    fn signs_nonce_and_matches_known_signature() {
        let kp = KeyPair::from_seed(SEED).unwrap();
        let sig = kp.sign(NONCE);
        assert_eq!(sig, EXPECTED_SIG);
    }

    #[test]
    fn signature_verifies_against_derived_public_key() {
        let kp = KeyPair::from_seed(SEED).unwrap();
        let sig = kp.sign(NONCE);
        assert!(verify(PUBLIC, NONCE, &sig));
    }

    #[test]
    fn known_signature_verifies() {
        assert!(verify(PUBLIC, NONCE, EXPECTED_SIG));
    }

    #[test]
    fn tampered_message_fails_verification() {
        assert!(!verify(PUBLIC, b"different-nonce", EXPECTED_SIG));
    }
}
