use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use rand::{Rng, distributions::Alphanumeric, thread_rng};

/// Base64url without padding (RFC 4648 §5), as used by PKCE challenges.
#[must_use]
pub fn base64url_no_pad(input: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// Random `[A-Za-z0-9]` string; used for JWT secret keys and bootstrap
/// credentials.
#[must_use]
pub fn random_alphanumeric(length: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64url_no_pad() {
        // '+' and '/' in standard base64 become '-' and '_', padding is dropped.
        assert_eq!(base64url_no_pad(&[0xfb, 0xff]), "-_8");
        assert_eq!(base64url_no_pad(b""), "");
        assert_eq!(base64url_no_pad(b"f"), "Zg");
        assert_eq!(base64url_no_pad(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn test_random_alphanumeric() {
        let secret = random_alphanumeric(32);
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_alphanumeric(32), random_alphanumeric(32));
    }
}
