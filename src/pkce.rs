//! State and PKCE generation for the authorization request.
//!
//! Both values come from the system CSPRNG. The challenge is always derived
//! with SHA-256 (`code_challenge_method=S256`); the plain method is never
//! advertised.

use sha2::{Digest, Sha256};

use crate::utils::{UtilError, base64url_encode, gen_random_string};

/// Method string sent alongside the PKCE challenge.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and its derived challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate an unguessable `state` parameter from `entropy_bytes` bytes of
/// CSPRNG output, base64url-encoded without padding. Fails for fewer than
/// 16 bytes of entropy.
pub fn generate_state(entropy_bytes: usize) -> Result<String, UtilError> {
    gen_random_string(entropy_bytes)
}

/// Generate a PKCE verifier/challenge pair.
///
/// The verifier is 43 url-safe characters (32 random bytes, the RFC 7636
/// minimum length); the challenge is `base64url(SHA-256(verifier))`.
pub fn generate_pkce_pair() -> Result<PkcePair, UtilError> {
    let verifier = gen_random_string(32)?;
    let challenge = challenge_for_verifier(&verifier)?;
    Ok(PkcePair {
        verifier,
        challenge,
    })
}

pub(crate) fn challenge_for_verifier(verifier: &str) -> Result<String, UtilError> {
    base64url_encode(Sha256::digest(verifier.as_bytes()).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_challenge_matches_rfc7636_vector() {
        // RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = challenge_for_verifier(verifier).unwrap();
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pair_is_consistent() {
        let pair = generate_pkce_pair().unwrap();
        assert_eq!(
            pair.challenge,
            challenge_for_verifier(&pair.verifier).unwrap()
        );
        assert_ne!(pair.verifier, pair.challenge);
    }

    #[test]
    fn test_state_rejects_low_entropy() {
        assert!(generate_state(15).is_err());
        assert!(generate_state(16).is_ok());
    }

    #[test]
    fn test_state_values_unique() {
        let a = generate_state(32).unwrap();
        let b = generate_state(32).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_verifier_within_rfc_length_and_charset(_i in 0..64u8) {
            let pair = generate_pkce_pair().unwrap();
            prop_assert!(pair.verifier.len() >= 43 && pair.verifier.len() <= 128);
            let charset_ok = pair
                .verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '~');
            prop_assert!(charset_ok);
            // Challenge of a 32-byte digest is always 43 chars unpadded.
            prop_assert_eq!(pair.challenge.len(), 43);
        }
    }
}
