//! Autokey XOR cipher used by Kasa smart plugs.
//!
//! Wire format:
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Length (4B)  │ Ciphertext                    │
//! │ big-endian   │ (Length bytes)                │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! Each ciphertext byte is the XOR of the plaintext byte with the previous
//! ciphertext byte, seeded with [`INITIAL_KEY`].

/// Seed for the running key.
pub const INITIAL_KEY: u8 = 0xAB;

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 4;

/// Encrypt `plaintext` and prepend its length.
pub fn encode(plaintext: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(HEADER_SIZE + plaintext.len());
    framed.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());

    let mut key = INITIAL_KEY;
    for &p in plaintext {
        let c = key ^ p;
        framed.push(c);
        key = c;
    }
    framed
}

/// Decrypt a framed payload.
///
/// The first [`HEADER_SIZE`] bytes are skipped without being checked against
/// the payload length. Input shorter than the header decodes to nothing.
pub fn decode(framed: &[u8]) -> Vec<u8> {
    let ciphertext = framed.get(HEADER_SIZE..).unwrap_or_default();

    let mut key = INITIAL_KEY;
    ciphertext
        .iter()
        .map(|&c| {
            let p = key ^ c;
            key = c;
            p
        })
        .collect()
}

/// Read the declared payload length from a frame header, if present.
pub fn declared_len(framed: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = framed.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_get_sysinfo() {
        let framed = encode(br#"{"system":{"get_sysinfo":{}}}"#);
        assert_eq!(
            framed,
            vec![
                0x00, 0x00, 0x00, 0x1d, 0xd0, 0xf2, 0x81, 0xf8, 0x8b, 0xff, 0x9a, 0xf7, 0xd5,
                0xef, 0x94, 0xb6, 0xd1, 0xb4, 0xc0, 0x9f, 0xec, 0x95, 0xe6, 0x8f, 0xe1, 0x87,
                0xe8, 0xca, 0xf0, 0x8b, 0xf6, 0x8b, 0xf6,
            ]
        );
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode(b""), vec![0, 0, 0, 0]);
        assert!(decode(&encode(b"")).is_empty());
    }

    #[test]
    fn test_round_trip() {
        let samples: [&[u8]; 4] = [
            br#"{"system":{"set_relay_state":{"state":1}}}"#,
            &[0x00, 0xAB, 0xFF, 0xAB, 0x00],
            "ünïcödé".as_bytes(),
            &[0xAB; 64],
        ];
        for sample in samples {
            assert_eq!(decode(&encode(sample)), sample);
        }
    }

    #[test]
    fn test_decode_ignores_header() {
        let mut framed = encode(b"hello");
        framed[..HEADER_SIZE].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode(&framed), b"hello");
    }

    #[test]
    fn test_decode_short_input() {
        assert!(decode(&[]).is_empty());
        assert!(decode(&[0, 0, 1]).is_empty());
    }

    #[test]
    fn test_declared_len() {
        assert_eq!(declared_len(&encode(b"abc")), Some(3));
        assert_eq!(declared_len(&[0, 0]), None);
    }
}
