//! Short collision-resistant identifier generator, used for inbox roots
//! and per-request reply subjects.

use rand::Rng;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const PREFIX_LEN: usize = 12;
const SEQ_LEN: usize = 10;
const MAX_SEQ: u64 = 62u64.pow(SEQ_LEN as u32); // 62^10
const MIN_INC: u64 = 33;
const MAX_INC: u64 = 333;

/// Generates 22-character ids: a 12-character random prefix followed by a
/// 10-character base-62 sequence. Each instance owns its own prefix and
/// counter; two independently-seeded instances are vanishingly unlikely to
/// collide (see the inline stress test).
pub struct Nuid {
    prefix: [u8; PREFIX_LEN],
    seq: u64,
    inc: u64,
}

impl Nuid {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let mut nuid = Nuid {
            prefix: [0; PREFIX_LEN],
            seq: 0,
            inc: 0,
        };
        nuid.randomize_prefix(&mut rng);
        nuid.seq = rng.gen::<u64>() % MAX_SEQ;
        nuid.inc = rng.gen_range(MIN_INC..MAX_INC);
        nuid
    }

    fn randomize_prefix(&mut self, rng: &mut impl Rng) {
        for b in &mut self.prefix {
            *b = DIGITS[rng.gen_range(0..DIGITS.len())];
        }
    }

    /// Produce the next identifier, advancing internal state.
    pub fn next(&mut self) -> String {
        let mut rng = rand::thread_rng();
        self.seq += self.inc;
        if self.seq >= MAX_SEQ {
            self.randomize_prefix(&mut rng);
            self.seq = rng.gen::<u64>() % MAX_SEQ;
            self.inc = rng.gen_range(MIN_INC..MAX_INC);
        }

        let mut buf = Vec::with_capacity(PREFIX_LEN + SEQ_LEN);
        buf.extend_from_slice(&self.prefix);
        let mut seq_chars = [0u8; SEQ_LEN];
        let mut n = self.seq;
        for slot in seq_chars.iter_mut().rev() {
            *slot = DIGITS[(n % 62) as usize];
            n /= 62;
        }
        buf.extend_from_slice(&seq_chars);
        String::from_utf8(buf).expect("alphabet is ASCII")
    }
}

impl Default for Nuid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn produces_22_char_ids_over_expected_alphabet() {
        let mut n = Nuid::new();
        for _ in 0..50 {
            let id = n.next();
            assert_eq!(id.len(), 22);
            assert!(id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn sequence_is_strictly_increasing_until_rollover() {
        let mut n = Nuid::new();
        let mut prev = n.next();
        for _ in 0..200 {
            let next = n.next();
            assert_ne!(prev, next);
            prev = next;
        }
    }

    #[test]
    fn independent_instances_do_not_collide_across_10k_draws() {
        let mut a = Nuid::new();
        let mut b = Nuid::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(a.next()));
            assert!(seen.insert(b.next()));
        }
    }
}
