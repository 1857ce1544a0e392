use super::IdentityError;
use crc::{Crc, CRC_16_XMODEM};
use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// The typed prefix byte identifying a key's role. Values are the role
/// index times 8, matching the 5-bit-group packing used for seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Operator,
    Server,
    Cluster,
    Account,
    User,
    Private,
    Seed,
}

impl Prefix {
    const fn byte(self) -> u8 {
        match self {
            Prefix::Operator => 14 << 3,
            Prefix::Server => 13 << 3,
            Prefix::Cluster => 2 << 3,
            Prefix::Account => 0,
            Prefix::User => 20 << 3,
            Prefix::Private => 15 << 3,
            Prefix::Seed => 18 << 3,
        }
    }

    fn from_byte(b: u8) -> Option<Prefix> {
        // Only the top 5 bits of the first byte are ever a well-formed
        // role prefix; the low 3 bits are zero for non-seed prefixes.
        match b {
            b if b == Prefix::Operator.byte() => Some(Prefix::Operator),
            b if b == Prefix::Server.byte() => Some(Prefix::Server),
            b if b == Prefix::Cluster.byte() => Some(Prefix::Cluster),
            b if b == Prefix::Account.byte() => Some(Prefix::Account),
            b if b == Prefix::User.byte() => Some(Prefix::User),
            b if b == Prefix::Private.byte() => Some(Prefix::Private),
            b if b == Prefix::Seed.byte() => Some(Prefix::Seed),
            _ => None,
        }
    }

    fn is_public(self) -> bool {
        matches!(
            self,
            Prefix::Operator | Prefix::Server | Prefix::Cluster | Prefix::Account | Prefix::User
        )
    }
}

fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

fn encode_with_checksum(data: &[u8]) -> String {
    let crc = checksum(data);
    let mut full = Vec::with_capacity(data.len() + 2);
    full.extend_from_slice(data);
    full.extend_from_slice(&crc.to_le_bytes());
    BASE32_NOPAD.encode(&full)
}

fn decode_with_checksum(text: &str) -> Result<Vec<u8>, IdentityError> {
    let raw = BASE32_NOPAD
        .decode(text.as_bytes())
        .map_err(|e| IdentityError::Base32(e.to_string()))?;
    if raw.len() < 2 {
        return Err(IdentityError::BadLength);
    }
    let (data, crc_bytes) = raw.split_at(raw.len() - 2);
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if checksum(data) != expected {
        return Err(IdentityError::ChecksumMismatch);
    }
    Ok(data.to_vec())
}

/// Encode a public (or private) key with its role prefix.
pub fn encode_key(prefix: Prefix, key_bytes: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + key_bytes.len());
    data.push(prefix.byte());
    data.extend_from_slice(key_bytes);
    encode_with_checksum(&data)
}

/// Decode a public (or private) key, verifying it carries `expected` prefix.
pub fn decode_key(text: &str, expected: Prefix) -> Result<Vec<u8>, IdentityError> {
    let data = decode_with_checksum(text)?;
    let (prefix_byte, key_bytes) = data.split_first().ok_or(IdentityError::BadLength)?;
    let actual = Prefix::from_byte(*prefix_byte).ok_or(IdentityError::UnknownPrefix)?;
    if actual != expected {
        return Err(IdentityError::PrefixMismatch { expected, actual });
    }
    Ok(key_bytes.to_vec())
}

/// Encode a seed: the 5-bit-packed header identifies both the `Seed`
/// prefix and the public-key type the seed will derive.
pub fn encode_seed(public_prefix: Prefix, seed_bytes: &[u8; SECRET_KEY_LENGTH]) -> String {
    let b1 = Prefix::Seed.byte() | (public_prefix.byte() >> 5);
    let b2 = (public_prefix.byte() & 0x1F) << 3;
    let mut data = Vec::with_capacity(2 + seed_bytes.len());
    data.push(b1);
    data.push(b2);
    data.extend_from_slice(seed_bytes);
    encode_with_checksum(&data)
}

/// Decode a seed, returning its embedded public-key type alongside the
/// raw 32-byte seed.
pub fn decode_seed(text: &str) -> Result<(Prefix, [u8; SECRET_KEY_LENGTH]), IdentityError> {
    let data = decode_with_checksum(text)?;
    if data.len() != 2 + SECRET_KEY_LENGTH {
        return Err(IdentityError::BadLength);
    }
    let b1 = data[0];
    let b2 = data[1];
    if b1 & 0xF8 != Prefix::Seed.byte() {
        return Err(IdentityError::UnknownPrefix);
    }
    let public_byte = ((b1 & 0x07) << 5) | (b2 >> 3);
    let public_prefix = Prefix::from_byte(public_byte).ok_or(IdentityError::InvalidSeedPublicType)?;
    if !public_prefix.is_public() {
        return Err(IdentityError::InvalidSeedPublicType);
    }
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    seed.copy_from_slice(&data[2..]);
    Ok((public_prefix, seed))
}

/// An Ed25519 key pair derived from a seed, plus the role it was minted
/// for (`User`, `Account`, ...).
pub struct KeyPair {
    pub(super) signing_key: SigningKey,
    pub role: Prefix,
}

impl KeyPair {
    /// Derive a key pair from its prefixed-checksummed seed text form.
    pub fn from_seed(seed_text: &str) -> Result<KeyPair, IdentityError> {
        let (role, seed) = decode_seed(seed_text)?;
        let signing_key = SigningKey::from_bytes(&seed);
        Ok(KeyPair { signing_key, role })
    }

    /// The 32-byte raw seed this pair was derived from.
    pub fn seed_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Re-encode this pair's seed in prefixed-checksummed text form.
    pub fn seed(&self) -> String {
        encode_seed(self.role, &self.seed_bytes())
    }

    /// The public key in prefixed-checksummed text form.
    pub fn public_key(&self) -> String {
        encode_key(self.role, self.signing_key.verifying_key().as_bytes())
    }
}
