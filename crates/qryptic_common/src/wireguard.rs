use base64::prelude::{BASE64_STANDARD, Engine as _};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// A WireGuard key pair in the textual (base64) form the `wg` tooling and
/// the gateways expect. 32 bytes each when decoded.
#[derive(Clone, Debug)]
pub struct WireguardKeyPair {
    pub public: String,
    pub private: String,
}

/// Generate a fresh Curve25519 key pair for a gateway interface or a
/// client peer.
#[must_use]
pub fn generate_wireguard_keypair() -> WireguardKeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    WireguardKeyPair {
        public: BASE64_STANDARD.encode(public.as_bytes()),
        private: BASE64_STANDARD.encode(secret.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_ok;

    use super::*;

    #[test]
    fn keypair_is_well_formed() {
        let keypair = generate_wireguard_keypair();

        let public = assert_ok!(BASE64_STANDARD.decode(&keypair.public));
        let private = assert_ok!(BASE64_STANDARD.decode(&keypair.private));
        assert_eq!(public.len(), 32);
        assert_eq!(private.len(), 32);

        // The public half must be derivable from the private half.
        let secret = StaticSecret::from(<[u8; 32]>::try_from(private.as_slice()).unwrap());
        let derived = PublicKey::from(&secret);
        assert_eq!(BASE64_STANDARD.encode(derived.as_bytes()), keypair.public);
    }

    #[test]
    fn keypairs_are_unique() {
        assert_ne!(
            generate_wireguard_keypair().private,
            generate_wireguard_keypair().private
        );
    }
}
