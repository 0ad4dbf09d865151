use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

// Werkzeug-compatible layout: "pbkdf2:sha256:<iterations>$<salt>$<hex digest>".
const METHOD_PREFIX: &str = "pbkdf2:sha256";
pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_CHARS: usize = 16;
const DERIVED_BYTES: usize = 32;

pub fn hash_password_with_iterations(password: &str, iterations: u32) -> anyhow::Result<String> {
    if password.is_empty() {
        anyhow::bail!("Password cannot be blank");
    }
    if iterations == 0 {
        anyhow::bail!("iterations must be > 0");
    }

    let salt: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(SALT_CHARS)
        .map(char::from)
        .collect();
    let derived = derive(password.as_bytes(), salt.as_bytes(), iterations);

    Ok(format!(
        "{METHOD_PREFIX}:{iterations}${salt}${}",
        hex::encode(derived)
    ))
}

/// Whether `password_hash` uses the one scheme [`verify_password`] understands.
pub fn is_supported_hash(password_hash: &str) -> bool {
    password_hash.starts_with(METHOD_PREFIX)
}

/// Only `pbkdf2:sha256` hashes verify. Werkzeug's newer `scrypt:` default, plain sha
/// and malformed hashes never do.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if password.is_empty() {
        return false;
    }

    let mut parts = password_hash.splitn(3, '$');
    let method = parts.next().unwrap_or("");
    let salt = parts.next().unwrap_or("");
    let digest_hex = parts.next().unwrap_or("");

    let Some(iterations_text) = method
        .strip_prefix(METHOD_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
    else {
        return false;
    };
    let iterations: u32 = match iterations_text.parse() {
        Ok(value) if value > 0 => value,
        _ => return false,
    };
    let expected = match hex::decode(digest_hex) {
        Ok(value) if value.len() == DERIVED_BYTES => value,
        _ => return false,
    };

    let derived = derive(password.as_bytes(), salt.as_bytes(), iterations);
    derived.ct_eq(expected.as_slice()).into()
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; DERIVED_BYTES] {
    let mut out = [0u8; DERIVED_BYTES];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}
