//! Password hashing and validation.
//!
//! Hashes are encoded as `sha256$<iterations>$<salt-hex>$<digest-hex>`.

use rand::Rng;
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "sha256";
const SALT_LEN: usize = 16;
const MIN_LENGTH: usize = 8;

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "11111111",
    "00000000",
    "87654321",
    "qwertyui",
    "qwerty123",
    "abc12345",
    "abcd1234",
    "iloveyou",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "superman",
    "letmein1",
    "welcome1",
    "trustno1",
    "passw0rd",
    "starwars",
    "whatever",
    "dragon12",
];

/// Salted, iterated SHA-256 password hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    /// Creates a hasher. An iteration count of zero is raised to one.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hashes `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill(&mut salt);
        let digest = derive(password, &salt, self.iterations);
        format!(
            "{ALGORITHM}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    /// Checks `password` against an encoded hash. Malformed hashes never match.
    ///
    /// The iteration count is read from the hash, so hashes produced with a
    /// different configuration still verify.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let mut parts = encoded.split('$');
        let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        if algorithm != ALGORITHM {
            return false;
        }
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
            return false;
        };

        let actual = derive(password, &salt, iterations.max(1));
        constant_time_eq(&actual, &expected)
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize();
    }
    digest.to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Checks password strength. Returns every failed rule's message.
pub fn validate_password(password: &str, username: &str, email: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    let lowered = password.to_lowercase();

    let email_local = email.split('@').next().unwrap_or_default().to_lowercase();
    if (!username.is_empty() && lowered == username.to_lowercase())
        || (!email_local.is_empty() && lowered == email_local)
    {
        problems.push("The password is too similar to the username.");
    }
    if password.chars().count() < MIN_LENGTH {
        problems.push("This password is too short. It must contain at least 8 characters.");
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.");
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.");
    }

    problems
}

/// Generates a 40 character lowercase hex token key.
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
