use crate::types::{RoleType, ROLE_POOL};
use uuid::Uuid;

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// FNV-1a over the bytes of `s`, used both to seed the deterministic game
/// RNG and to derive a per-agent decode-parameter jitter.
pub fn fnv1a_hash(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub fn role_pool() -> Vec<RoleType> {
    ROLE_POOL.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(fnv1a_hash("abc"), fnv1a_hash("abc"));
        assert_ne!(fnv1a_hash("abc"), fnv1a_hash("abd"));
    }

    #[test]
    fn role_pool_matches_fixed_distribution() {
        let pool = role_pool();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.iter().filter(|r| **r == RoleType::Werewolf).count(), 2);
        assert_eq!(pool.iter().filter(|r| **r == RoleType::Seer).count(), 1);
        assert_eq!(pool.iter().filter(|r| **r == RoleType::Witch).count(), 1);
        assert_eq!(pool.iter().filter(|r| **r == RoleType::Villager).count(), 2);
    }
}
