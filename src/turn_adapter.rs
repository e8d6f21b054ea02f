use crate::llm::{Decode, LlmClient, RetryConfig};
use crate::strategy::StrategyProfile;
use crate::types::PlayerMemory;
use crate::utils::fnv1a_hash;
use crate::validator::{extract_referenced_seats, validate_speech, validate_vote_reason, UtteranceContext, ValidatorConfig};
use log::warn;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Speech,
    Vote,
    Night,
}

/// Everything the three adapters need to build a prompt and validate the
/// result, independent of which kind of turn it is.
pub struct TurnContext<'a> {
    pub agent_id: &'a str,
    pub round_no: u32,
    pub is_tiebreak: bool,
    pub speaker_seat: u8,
    pub valid_seats: &'a [u8],
    pub alive_seats: &'a [u8],
    pub deaths_last_night: &'a [String],
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

pub struct TurnOutcome {
    pub text: String,
    pub target_seat: Option<u8>,
    pub was_fallback: bool,
}

#[derive(Deserialize)]
struct SpeechPayload {
    speech: String,
}

#[derive(Deserialize)]
struct VotePayload {
    vote_target: u8,
    reason: String,
}

#[derive(Deserialize)]
struct NightPayload {
    #[serde(default)]
    target: Option<u8>,
}

/// A generic self-seat blame the model reaches for when it forgot to name
/// the actual target; rewritten to the real target's seat rather than
/// rejected outright.
const GENERIC_SELF_SEAT_BLAME: &str = "该玩家";

fn repair_vote_reason(reason: &str, target_seat: u8) -> String {
    if reason.contains(GENERIC_SELF_SEAT_BLAME) && extract_referenced_seats(reason).is_empty() {
        reason.replacen(GENERIC_SELF_SEAT_BLAME, &format!("玩家{target_seat}"), 1)
    } else {
        reason.to_string()
    }
}

/// Builds the decode parameters for one call: per-agent FNV jitter (±0.06
/// temperature, ±0.03 top_p, stable across turns for the same agent),
/// layered with round-3+ heating (`+0.06` temperature), tiebreak widening
/// (`+0.02` top_p), and night's narrower, shorter sampling.
fn decode_for(base: crate::types::DecodeConfig, agent_id: &str, kind: TurnKind, round_no: u32, is_tiebreak: bool) -> Decode {
    let mut temperature = base.temperature;
    let mut top_p = base.top_p;

    if round_no >= 3 {
        temperature += 0.06;
    }
    if is_tiebreak {
        top_p += 0.02;
    }
    if kind == TurnKind::Night {
        temperature -= 0.08;
    }

    let hash = fnv1a_hash(agent_id);
    let temp_jitter = ((hash % 1000) as f32 / 1000.0 - 0.5) * 0.12;
    let top_p_jitter = (((hash >> 16) % 1000) as f32 / 1000.0 - 0.5) * 0.06;

    Decode {
        temperature: (temperature + temp_jitter).clamp(0.0, 2.0),
        top_p: (top_p + top_p_jitter).clamp(0.0, 1.0),
        presence_penalty: base.presence_penalty,
        frequency_penalty: base.frequency_penalty,
        max_tokens: if kind == TurnKind::Night { Some(40) } else { None },
    }
}

fn fallback_text(kind: TurnKind, ctx: &TurnContext) -> (String, Option<u8>) {
    match kind {
        TurnKind::Speech => ("今天先继续观察，暂时没有明确怀疑对象。".to_string(), None),
        TurnKind::Vote => {
            let target = ctx.alive_seats.iter().find(|s| **s != ctx.speaker_seat).copied();
            ("没有明确的可疑目标，先投出一票观察后续发言。".to_string(), target)
        }
        TurnKind::Night => (String::new(), None),
    }
}

/// Drives the prompt/validate/retry loop shared by speech, vote, and night
/// turns: call the LLM, parse its kind-specific JSON payload, run the
/// utterance validator (skipped for night actions, which carry no free text
/// seen by other seats), retry with exponential backoff, then fall back to
/// a deterministic, always-valid turn. Night actions default to a single
/// attempt since a malformed or missing kill/check/heal target simply means
/// no action was taken.
pub async fn produce_turn(
    llm: &dyn LlmClient,
    retry: RetryConfig,
    profile: &StrategyProfile,
    kind: TurnKind,
    ctx: &TurnContext<'_>,
    memory: &PlayerMemory,
    validator_cfg: &ValidatorConfig,
) -> TurnOutcome {
    let decode = decode_for(profile.decode, ctx.agent_id, kind, ctx.round_no, ctx.is_tiebreak);
    let max_attempts = match kind {
        TurnKind::Night => 1,
        _ => retry.max_attempts,
    };

    for attempt in 1..=max_attempts {
        match llm.chat_json(ctx.system_prompt, ctx.user_prompt, decode).await {
            Ok(raw) => match try_accept(kind, &raw, ctx, profile, memory, validator_cfg) {
                Ok(outcome) => return outcome,
                Err(reason) => warn!(
                    "[game round={} agent={}] turn rejected on attempt {}/{}: {reason}",
                    ctx.round_no, ctx.agent_id, attempt, max_attempts
                ),
            },
            Err(e) => warn!(
                "[game round={} agent={}] llm transport failure on attempt {}/{}: {e}",
                ctx.round_no, ctx.agent_id, attempt, max_attempts
            ),
        }

        if attempt < max_attempts {
            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
        }
    }

    let (text, target_seat) = fallback_text(kind, ctx);
    TurnOutcome {
        text,
        target_seat,
        was_fallback: true,
    }
}

fn try_accept(
    kind: TurnKind,
    raw: &str,
    ctx: &TurnContext,
    profile: &StrategyProfile,
    memory: &PlayerMemory,
    validator_cfg: &ValidatorConfig,
) -> Result<TurnOutcome, String> {
    match kind {
        TurnKind::Night => {
            let payload: NightPayload = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            if let Some(seat) = payload.target {
                if seat == ctx.speaker_seat || !ctx.alive_seats.contains(&seat) {
                    return Err(format!("night target seat {seat} is not a valid living seat"));
                }
            }
            Ok(TurnOutcome {
                text: String::new(),
                target_seat: payload.target,
                was_fallback: false,
            })
        }
        TurnKind::Speech => {
            let payload: SpeechPayload = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            let vctx = UtteranceContext {
                speaker_seat: ctx.speaker_seat,
                valid_seats: ctx.valid_seats,
                alive_seats: ctx.alive_seats,
                round_no: ctx.round_no,
                deaths_last_night: ctx.deaths_last_night,
                own_history: &memory.speech_history,
                banned_phrases: profile.banned_phrases,
            };
            validate_speech(&payload.speech, &vctx, validator_cfg).map_err(|r| format!("{r:?}"))?;
            Ok(TurnOutcome {
                text: payload.speech,
                target_seat: None,
                was_fallback: false,
            })
        }
        TurnKind::Vote => {
            let payload: VotePayload = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            if payload.vote_target == ctx.speaker_seat || !ctx.alive_seats.contains(&payload.vote_target) {
                return Err(format!("vote target seat {} is not a valid living seat", payload.vote_target));
            }
            let reason = repair_vote_reason(&payload.reason, payload.vote_target);
            let vctx = UtteranceContext {
                speaker_seat: ctx.speaker_seat,
                valid_seats: ctx.valid_seats,
                alive_seats: ctx.alive_seats,
                round_no: ctx.round_no,
                deaths_last_night: ctx.deaths_last_night,
                own_history: &memory.speech_history,
                banned_phrases: profile.banned_phrases,
            };
            validate_vote_reason(&reason, &vctx, validator_cfg).map_err(|r| format!("{r:?}"))?;
            Ok(TurnOutcome {
                text: reason,
                target_seat: Some(payload.vote_target),
                was_fallback: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::strategy::profile_for;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        responses: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat_json(&self, _system: &str, _user: &str, _decode: Decode) -> AppResult<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses[idx.min(self.responses.len() - 1)].to_string())
        }
    }

    fn ctx<'a>() -> TurnContext<'a> {
        TurnContext {
            agent_id: "agent-1",
            round_no: 2,
            is_tiebreak: false,
            speaker_seat: 1,
            valid_seats: &[1, 2, 3, 4, 5, 6],
            alive_seats: &[1, 2, 3, 4, 5, 6],
            deaths_last_night: &[],
            system_prompt: "system",
            user_prompt: "user",
        }
    }

    fn vcfg() -> ValidatorConfig {
        ValidatorConfig {
            speech_min_len: 10,
            speech_max_len: 38,
            speech_similarity_threshold: 0.45,
            vote_similarity_threshold: 0.46,
        }
    }

    #[tokio::test]
    async fn good_speech_payload_passes_on_first_try() {
        let client = ScriptedClient {
            responses: vec![r#"{"speech": "玩家2昨天投票给玩家3，这个顺序让我很在意"}"#],
            calls: AtomicUsize::new(0),
        };
        let profile = profile_for("steady_conservative").unwrap();
        let memory = PlayerMemory::default();
        let outcome = produce_turn(
            &client,
            RetryConfig::default(),
            profile,
            TurnKind::Speech,
            &ctx(),
            &memory,
            &vcfg(),
        )
        .await;
        assert!(!outcome.was_fallback);
    }

    #[tokio::test]
    async fn falls_back_after_exhausting_retries() {
        let client = ScriptedClient {
            responses: vec![r#"{"speech": "这是系统提示里的secret关键词测试内容"}"#],
            calls: AtomicUsize::new(0),
        };
        let profile = profile_for("steady_conservative").unwrap();
        let memory = PlayerMemory::default();
        let retry = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let outcome = produce_turn(&client, retry, profile, TurnKind::Speech, &ctx(), &memory, &vcfg()).await;
        assert!(outcome.was_fallback);
    }

    #[tokio::test]
    async fn vote_payload_repairs_generic_self_seat_blame() {
        let client = ScriptedClient {
            responses: vec![r#"{"vote_target": 2, "reason": "该玩家今天的发言前后矛盾很可疑"}"#],
            calls: AtomicUsize::new(0),
        };
        let profile = profile_for("steady_conservative").unwrap();
        let memory = PlayerMemory::default();
        let outcome = produce_turn(
            &client,
            RetryConfig::default(),
            profile,
            TurnKind::Vote,
            &ctx(),
            &memory,
            &vcfg(),
        )
        .await;
        assert!(!outcome.was_fallback);
        assert_eq!(outcome.target_seat, Some(2));
        assert!(outcome.text.contains("玩家2"));
        assert!(!outcome.text.contains(GENERIC_SELF_SEAT_BLAME));
    }

    #[tokio::test]
    async fn night_payload_accepts_a_living_target() {
        let client = ScriptedClient {
            responses: vec![r#"{"target": 3}"#],
            calls: AtomicUsize::new(0),
        };
        let profile = profile_for("steady_conservative").unwrap();
        let memory = PlayerMemory::default();
        let outcome = produce_turn(
            &client,
            RetryConfig::default(),
            profile,
            TurnKind::Night,
            &ctx(),
            &memory,
            &vcfg(),
        )
        .await;
        assert!(!outcome.was_fallback);
        assert_eq!(outcome.target_seat, Some(3));
    }

    #[tokio::test]
    async fn night_payload_never_retries_on_rejection() {
        let client = ScriptedClient {
            responses: vec![r#"{"target": 1}"#, r#"{"target": 2}"#],
            calls: AtomicUsize::new(0),
        };
        let profile = profile_for("steady_conservative").unwrap();
        let memory = PlayerMemory::default();
        let outcome = produce_turn(
            &client,
            RetryConfig::default(),
            profile,
            TurnKind::Night,
            &ctx(),
            &memory,
            &vcfg(),
        )
        .await;
        // seat 1 is the speaker's own seat, an invalid target; night never
        // retries so this must fall back rather than try the second reply.
        assert!(outcome.was_fallback);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
