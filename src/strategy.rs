use crate::types::DecodeConfig;

/// One of the five named decoding personas assigned to the ephemeral AI
/// seats, in `STRATEGY_SLOTS` order. Each carries its own decode defaults
/// (before per-agent jitter is applied) and a list of phrases that persona
/// must never use, enforced by the validator.
#[derive(Debug, Clone)]
pub struct StrategyProfile {
    pub key: &'static str,
    pub decode: DecodeConfig,
    pub banned_phrases: &'static [&'static str],
}

const PROFILES: [StrategyProfile; 5] = [
    StrategyProfile {
        key: "aggressive_analyst",
        decode: DecodeConfig {
            temperature: 0.55,
            top_p: 0.9,
            presence_penalty: 0.2,
            frequency_penalty: 0.1,
        },
        banned_phrases: &["as an ai", "i cannot", "let's be logical about this"],
    },
    StrategyProfile {
        key: "steady_conservative",
        decode: DecodeConfig {
            temperature: 0.4,
            top_p: 0.85,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        },
        banned_phrases: &["as an ai", "i cannot", "to be safe"],
    },
    StrategyProfile {
        key: "social_blender",
        decode: DecodeConfig {
            temperature: 0.7,
            top_p: 0.92,
            presence_penalty: 0.3,
            frequency_penalty: 0.2,
        },
        banned_phrases: &["as an ai", "i cannot", "just vibing here"],
    },
    StrategyProfile {
        key: "chaos_disruptor",
        decode: DecodeConfig {
            temperature: 0.9,
            top_p: 0.95,
            presence_penalty: 0.4,
            frequency_penalty: 0.3,
        },
        banned_phrases: &["as an ai", "i cannot", "chaos reigns"],
    },
    StrategyProfile {
        key: "adaptive_deceiver",
        decode: DecodeConfig {
            temperature: 0.65,
            top_p: 0.88,
            presence_penalty: 0.15,
            frequency_penalty: 0.15,
        },
        banned_phrases: &["as an ai", "i cannot", "trust me completely"],
    },
];

pub fn profile_for(key: &str) -> Option<&'static StrategyProfile> {
    PROFILES.iter().find(|p| p.key == key)
}

pub fn all_profiles() -> &'static [StrategyProfile] {
    &PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::STRATEGY_SLOTS;

    #[test]
    fn every_slot_has_a_profile() {
        for slot in STRATEGY_SLOTS {
            assert!(profile_for(slot).is_some(), "missing profile for {slot}");
        }
    }

    #[test]
    fn unknown_key_returns_none() {
        assert!(profile_for("does_not_exist").is_none());
    }
}
