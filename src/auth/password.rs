use crate::accounts::domain::AccountError;

/// Hash a plaintext password with bcrypt at the given cost.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, AccountError> {
    Ok(bcrypt::hash(plain, cost)?)
}

/// Check a plaintext password against a stored hash. A malformed hash never
/// matches.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match bcrypt::verify(plain, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Unreadable password hash: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
