use rand::Rng;

// Skips 0/O, 1/I, and vowels that could spell something unfortunate.
const CODE_ALPHABET: &[u8] = b"23456789BCDFGHJKLMNPQRSTVWXZ";
const CODE_GROUP_LEN: usize = 3;

/// Generate a human-readable pairing code of the form `8X2-A9D`: two groups
/// of three characters from an unambiguous alphabet, joined by a dash. The
/// code is the only shared secret between host and caller, so it is meant
/// to be read aloud or typed from a screen.
pub fn generate_pairing_code() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(CODE_GROUP_LEN * 2 + 1);
    for i in 0..(CODE_GROUP_LEN * 2) {
        if i == CODE_GROUP_LEN {
            out.push('-');
        }
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        out.push(CODE_ALPHABET[idx] as char);
    }
    out
}

/// Uppercase and trim a user-entered code. Dashes are preserved.
pub fn normalize_pairing_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Host ids carried in `REGISTER_HOST` are free-form (any non-empty string
/// is routable); `is_canonical_pairing_code` additionally checks the
/// `XXX-XXX` shape our own hosts generate.
pub fn is_canonical_pairing_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != CODE_GROUP_LEN * 2 + 1 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| {
        if i == CODE_GROUP_LEN {
            *b == b'-'
        } else {
            b.is_ascii_uppercase() || b.is_ascii_digit()
        }
    })
}
