use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};

/// One named credential slot, e.g. `OPENAI_API_KEY_2`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySlot {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySlot")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}

/// Ordered, non-empty credential slots for one provider.
#[derive(Debug, Clone)]
pub struct KeyPool {
    base_name: String,
    candidates: Vec<KeySlot>,
}

impl KeyPool {
    /// Collect `<BASE>` and `<BASE>_<N>` (N >= 2) from an env snapshot.
    ///
    /// Slots are ordered base first, then by N; empty values are dropped.
    pub fn from_env(env: &HashMap<String, String>, provider: &str) -> Self {
        let base_name = base_key_name(provider);
        let mut ordered: Vec<(u32, KeySlot)> = env
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .filter_map(|(name, value)| {
                let order = slot_order(&base_name, name)?;
                Some((
                    order,
                    KeySlot {
                        name: name.clone(),
                        value: value.clone(),
                    },
                ))
            })
            .collect();
        ordered.sort_by_key(|(order, _)| *order);

        Self {
            base_name,
            candidates: ordered.into_iter().map(|(_, slot)| slot).collect(),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn candidates(&self) -> &[KeySlot] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Deterministic pick: the same seed always lands on the same slot.
    pub fn select(&self, seed: &str) -> Option<&KeySlot> {
        let index = slot_index(seed, self.candidates.len())?;
        self.candidates.get(index)
    }

    /// Next slot after `chosen` in ring order, if there is a different one.
    pub fn alternate(&self, chosen: &KeySlot) -> Option<&KeySlot> {
        if self.candidates.len() < 2 {
            return None;
        }
        let position = self.candidates.iter().position(|slot| slot.name == chosen.name)?;
        self.candidates.get((position + 1) % self.candidates.len())
    }
}

/// `ANTHROPIC` -> `ANTHROPIC_API_KEY`. A full key name is accepted as-is.
pub fn base_key_name(provider: &str) -> String {
    let provider = provider.trim().to_uppercase();
    if provider.ends_with("_API_KEY") {
        provider
    } else {
        format!("{provider}_API_KEY")
    }
}

// 1 for the base name, N for `<BASE>_<N>`; anything else is not a slot.
fn slot_order(base_name: &str, name: &str) -> Option<u32> {
    if name == base_name {
        return Some(1);
    }
    let suffix = name.strip_prefix(base_name)?.strip_prefix('_')?;
    let n: u32 = suffix.parse().ok()?;
    // rejects `_02` and `+2` so each N has a single spelling
    (n >= 2 && suffix == n.to_string()).then_some(n)
}

/// Map a seed onto `0..count`: first 8 bytes of SHA-256 (big-endian) mod count.
pub fn slot_index(seed: &str, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let digest = Sha256::digest(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Some((u64::from_be_bytes(head) % count as u64) as usize)
}

/// Seed used when no override is given: `<run id>:<job>`.
pub fn default_seed(run_id: Option<&str>, job: Option<&str>) -> String {
    format!("{}:{}", run_id.unwrap_or_default(), job.unwrap_or_default())
}

/// Pick one usable key for `provider`, or `None` when every slot is empty.
pub fn select_key(env: &HashMap<String, String>, provider: &str, seed: &str) -> Option<KeySlot> {
    KeyPool::from_env(env, provider).select(seed).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn random_seeds(count: usize) -> Vec<String> {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        (0..count)
            .map(|_| {
                let run: u64 = rng.random();
                let job: u16 = rng.random();
                default_seed(
                    Some(run.to_string().as_str()),
                    Some(format!("review-{job}").as_str()),
                )
            })
            .collect()
    }

    #[test]
    fn test_candidates_in_declaration_order() {
        let pool = KeyPool::from_env(
            &env(&[
                ("OPENAI_API_KEY_10", "k10"),
                ("OPENAI_API_KEY_2", "k2"),
                ("OPENAI_API_KEY", "k1"),
                ("OPENAI_API_KEY_3", "k3"),
                ("ANTHROPIC_API_KEY", "other"),
            ]),
            "openai",
        );
        let names: Vec<&str> = pool.candidates().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["OPENAI_API_KEY", "OPENAI_API_KEY_2", "OPENAI_API_KEY_3", "OPENAI_API_KEY_10"]
        );
    }

    #[test]
    fn test_non_slot_names_ignored() {
        let pool = KeyPool::from_env(
            &env(&[
                ("GEMINI_API_KEY_1", "one"),
                ("GEMINI_API_KEY_02", "zero-two"),
                ("GEMINI_API_KEY_X", "x"),
                ("GEMINI_API_KEY_BACKUP", "b"),
                ("GEMINI_API_KEYS", "s"),
            ]),
            "GEMINI",
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_empty_values_are_absent() {
        let env = env(&[
            ("ANTHROPIC_API_KEY", ""),
            ("ANTHROPIC_API_KEY_2", "   "),
            ("ANTHROPIC_API_KEY_4", "real"),
        ]);
        for seed in random_seeds(50) {
            let slot = select_key(&env, "ANTHROPIC", &seed).unwrap();
            assert_eq!(slot.name, "ANTHROPIC_API_KEY_4");
        }
    }

    #[test]
    fn test_no_candidates_is_none() {
        assert!(select_key(&HashMap::new(), "OPENAI", "run:job").is_none());
        assert!(select_key(&env(&[("OPENAI_API_KEY", "")]), "OPENAI", "").is_none());
        assert_eq!(slot_index("anything", 0), None);
    }

    #[test]
    fn test_same_seed_same_slot() {
        let env = env(&[
            ("OPENAI_API_KEY", "k1"),
            ("OPENAI_API_KEY_2", "k2"),
            ("OPENAI_API_KEY_3", "k3"),
        ]);
        for seed in random_seeds(200) {
            let first = select_key(&env, "OPENAI", &seed).unwrap();
            for _ in 0..3 {
                assert_eq!(select_key(&env, "OPENAI", &seed).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_index_always_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for seed in random_seeds(300) {
            let count = rng.random_range(1..=16usize);
            let index = slot_index(&seed, count).unwrap();
            assert!(index < count);
        }
    }

    #[test]
    fn test_seeds_spread_across_slots() {
        let mut hits = [0usize; 3];
        for seed in random_seeds(600) {
            hits[slot_index(&seed, 3).unwrap()] += 1;
        }
        assert!(hits.iter().all(|&h| h > 100), "uneven spread: {hits:?}");
    }

    #[test]
    fn test_alternate_wraps_around() {
        let pool = KeyPool::from_env(
            &env(&[("OPENAI_API_KEY", "k1"), ("OPENAI_API_KEY_2", "k2")]),
            "OPENAI",
        );
        let first = &pool.candidates()[0];
        let second = &pool.candidates()[1];
        assert_eq!(pool.alternate(first), Some(second));
        assert_eq!(pool.alternate(second), Some(first));
    }

    #[test]
    fn test_alternate_needs_two_slots() {
        let pool = KeyPool::from_env(&env(&[("OPENAI_API_KEY", "k1")]), "OPENAI");
        assert!(pool.alternate(&pool.candidates()[0]).is_none());
    }

    #[test]
    fn test_debug_redacts_value() {
        let slot = KeySlot {
            name: "OPENAI_API_KEY".to_string(),
            value: "sk-secret".to_string(),
        };
        let rendered = format!("{slot:?}");
        assert!(rendered.contains("OPENAI_API_KEY"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn test_base_key_name() {
        assert_eq!(base_key_name("anthropic"), "ANTHROPIC_API_KEY");
        assert_eq!(base_key_name("OPENAI_API_KEY"), "OPENAI_API_KEY");
        assert_eq!(default_seed(Some("123"), Some("review")), "123:review");
        assert_eq!(default_seed(None, None), ":");
    }
}
