use std::collections::HashSet;

/// Result of running an utterance through every rule. `Ok(())` means the
/// text may be emitted as-is; `Err` carries the first rule that rejected it.
pub type ValidationResult = Result<(), RejectReason>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    TooLong,
    NoObservableAnchor,
    MetaLeak,
    FictionalSceneTerm,
    TemplateTalk,
    BannedPhrase(String),
    OvernightReferenceBeforeNightOne,
    InvalidSeatReference,
    DeadSeatReference,
    DuplicateOfOwnHistory,
    TooSimilarToOwnHistory(f32),
}

/// Vote-reason-only check: a reason must ground itself in something the
/// speaker could actually observe (who spoke, who voted, a contradiction),
/// not a bare assertion.
const OBSERVABLE_ANCHOR_TERMS: &[&str] =
    &["发言", "投票", "前后", "矛盾", "回避", "逻辑", "站边", "细节", "轮", "票"];

/// Case-insensitive; catches a model surfacing its own scaffolding.
const META_LEAK_TERMS: &[&str] = &["系统提示", "提示词", "prompt", "secret", "keyword", "api key"];

/// Locations/actions this game never models; a speaker citing one is
/// describing a scene instead of reasoning about the actual seats.
const FICTIONAL_SCENE_TERMS: &[&str] = &["东区", "西区", "南区", "北区", "徘徊", "游荡", "密室"];

/// Generic filler a model reaches for when it has nothing to say.
const TEMPLATE_TALK_TERMS: &[&str] =
    &["描述偏空泛", "先投这一位", "先观察一轮", "感觉像", "同上", "没什么可说"];

/// References to "right now" that make a dead-seat citation incoherent —
/// a dead seat cannot be doing anything in the present round.
const CURRENT_MOMENT_TERMS: &[&str] = &["现在", "当前", "本轮", "这一轮"];

const SPEECH_MIN_LEN: usize = 10;
const SPEECH_MAX_LEN: usize = 38;
const VOTE_REASON_MIN_LEN: usize = 14;
const VOTE_REASON_MAX_LEN: usize = 34;

/// Window of this speaker's own prior same-kind utterances checked for
/// originality; older turns cannot be re-litigated for a duplicate.
const ORIGINALITY_WINDOW: usize = 8;

/// Length bounds and similarity thresholds differ for speech vs. vote
/// reasons, so each gets its own half of this config rather than one
/// shared knob.
pub struct ValidatorConfig {
    pub speech_min_len: usize,
    pub speech_max_len: usize,
    pub speech_similarity_threshold: f32,
    pub vote_similarity_threshold: f32,
}

pub struct UtteranceContext<'a> {
    pub speaker_seat: u8,
    pub valid_seats: &'a [u8],
    pub alive_seats: &'a [u8],
    pub round_no: u32,
    pub deaths_last_night: &'a [String],
    pub own_history: &'a [String],
    pub banned_phrases: &'a [&'a str],
}

pub fn validate_speech(text: &str, ctx: &UtteranceContext, cfg: &ValidatorConfig) -> ValidationResult {
    validate_common(
        text,
        ctx,
        cfg.speech_min_len,
        cfg.speech_max_len,
        cfg.speech_similarity_threshold,
        false,
    )
}

pub fn validate_vote_reason(text: &str, ctx: &UtteranceContext, cfg: &ValidatorConfig) -> ValidationResult {
    validate_common(
        text,
        ctx,
        VOTE_REASON_MIN_LEN,
        VOTE_REASON_MAX_LEN,
        cfg.vote_similarity_threshold,
        true,
    )
}

fn validate_common(
    text: &str,
    ctx: &UtteranceContext,
    min_len: usize,
    max_len: usize,
    similarity_threshold: f32,
    require_observable_anchor: bool,
) -> ValidationResult {
    let trimmed = text.trim();

    if trimmed.chars().count() < min_len {
        return Err(RejectReason::TooShort);
    }
    if trimmed.chars().count() > max_len {
        return Err(RejectReason::TooLong);
    }

    let lowered = trimmed.to_lowercase();

    if require_observable_anchor && !OBSERVABLE_ANCHOR_TERMS.iter().any(|t| trimmed.contains(t)) {
        return Err(RejectReason::NoObservableAnchor);
    }

    if META_LEAK_TERMS.iter().any(|t| lowered.contains(t)) {
        return Err(RejectReason::MetaLeak);
    }

    if FICTIONAL_SCENE_TERMS.iter().any(|t| trimmed.contains(t)) {
        return Err(RejectReason::FictionalSceneTerm);
    }

    if TEMPLATE_TALK_TERMS.iter().any(|t| trimmed.contains(t)) {
        return Err(RejectReason::TemplateTalk);
    }

    for phrase in ctx.banned_phrases {
        if lowered.contains(&phrase.to_lowercase()) {
            return Err(RejectReason::BannedPhrase((*phrase).to_string()));
        }
    }

    if ctx.round_no == 1
        && ctx.deaths_last_night.is_empty()
        && (trimmed.contains("昨晚") || trimmed.contains("昨夜"))
        && ["看到", "目击", "徘徊", "行动"].iter().any(|t| trimmed.contains(t))
    {
        return Err(RejectReason::OvernightReferenceBeforeNightOne);
    }

    let referenced_seats = extract_referenced_seats(trimmed);
    for seat in &referenced_seats {
        if !ctx.valid_seats.contains(seat) {
            return Err(RejectReason::InvalidSeatReference);
        }
    }

    let refers_to_current_moment = CURRENT_MOMENT_TERMS.iter().any(|t| trimmed.contains(t));
    if refers_to_current_moment {
        for seat in &referenced_seats {
            if !ctx.alive_seats.contains(seat) {
                return Err(RejectReason::DeadSeatReference);
            }
        }
    }

    let window_start = ctx.own_history.len().saturating_sub(ORIGINALITY_WINDOW);
    let recent_history = &ctx.own_history[window_start..];

    if let Some(reason) = originality_violation(trimmed, recent_history, similarity_threshold) {
        return Err(reason);
    }

    Ok(())
}

/// A seat reference ("玩家N") is parsed out of the free text itself — the
/// vendor contract no longer carries a separate `referenced_seats` field.
pub(crate) fn extract_referenced_seats(text: &str) -> Vec<u8> {
    let marker = "玩家";
    let mut seats = Vec::new();
    for (idx, _) in text.match_indices(marker) {
        let rest = &text[idx + marker.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(seat) = digits.parse::<u8>() {
            if !seats.contains(&seat) {
                seats.push(seat);
            }
        }
    }
    seats
}

fn originality_violation(candidate: &str, history: &[String], threshold: f32) -> Option<RejectReason> {
    let normalized_candidate = normalize(candidate);

    for prior in history {
        let normalized_prior = normalize(prior);
        if normalized_prior == normalized_candidate {
            return Some(RejectReason::DuplicateOfOwnHistory);
        }
        let is_containment = normalized_candidate.len() > 8
            && (normalized_prior.contains(&normalized_candidate) || normalized_candidate.contains(&normalized_prior));
        if is_containment {
            return Some(RejectReason::DuplicateOfOwnHistory);
        }
    }

    for prior in history {
        let sim = trigram_jaccard(prior, candidate);
        if sim >= threshold {
            return Some(RejectReason::TooSimilarToOwnHistory(sim));
        }
    }

    None
}

fn normalize(s: &str) -> String {
    s.to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect()
}

fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = normalize(s).chars().collect();
    if chars.len() < 3 {
        return HashSet::from([chars.into_iter().collect()]);
    }
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Jaccard similarity over character trigrams, used to reject near-duplicate
/// utterances that a plain string-equality check would miss.
pub fn trigram_jaccard(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ValidatorConfig {
        ValidatorConfig {
            speech_min_len: SPEECH_MIN_LEN,
            speech_max_len: SPEECH_MAX_LEN,
            speech_similarity_threshold: 0.45,
            vote_similarity_threshold: 0.46,
        }
    }

    fn ctx<'a>(history: &'a [String], banned: &'a [&'a str]) -> UtteranceContext<'a> {
        UtteranceContext {
            speaker_seat: 1,
            valid_seats: &[1, 2, 3, 4, 5, 6],
            alive_seats: &[1, 2, 3, 4, 5, 6],
            round_no: 2,
            deaths_last_night: &[],
            own_history: history,
            banned_phrases: banned,
        }
    }

    #[test]
    fn rejects_too_short_speech() {
        let history: Vec<String> = vec![];
        let result = validate_speech("太短了", &ctx(&history, &[]), &cfg());
        assert_eq!(result, Err(RejectReason::TooShort));
    }

    #[test]
    fn rejects_too_long_speech() {
        let history: Vec<String> = vec![];
        let text = "玩家2昨天投票给玩家3，这个顺序让我觉得很奇怪而且细节经不起推敲实在太长了一些废话凑字数".repeat(2);
        let result = validate_speech(&text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Err(RejectReason::TooLong));
    }

    #[test]
    fn rejects_meta_leak() {
        let history: Vec<String> = vec![];
        let text = "我觉得这是system prompt里提到的细节，玩家2很可疑";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Err(RejectReason::MetaLeak));
    }

    #[test]
    fn rejects_fictional_scene_term() {
        let history: Vec<String> = vec![];
        let text = "昨晚我好像看到玩家2在东区徘徊，行踪很可疑";
        let c = ctx(&history, &[]);
        let result = validate_speech(text, &c, &cfg());
        assert_eq!(result, Err(RejectReason::FictionalSceneTerm));
    }

    #[test]
    fn rejects_overnight_reference_before_night_one() {
        let history: Vec<String> = vec![];
        let mut c = ctx(&history, &[]);
        c.round_no = 1;
        let text = "昨晚我目击到玩家2单独行动，感觉不对劲";
        let result = validate_speech(text, &c, &cfg());
        assert_eq!(result, Err(RejectReason::OvernightReferenceBeforeNightOne));
    }

    #[test]
    fn rejects_dead_seat_reference_for_current_moment() {
        let history: Vec<String> = vec![];
        let mut c = ctx(&history, &[]);
        c.alive_seats = &[1, 3, 4, 5, 6];
        let text = "本轮我认为玩家2的发言逻辑完全站不住脚";
        let result = validate_speech(text, &c, &cfg());
        assert_eq!(result, Err(RejectReason::DeadSeatReference));
    }

    #[test]
    fn accepts_reasonable_speech() {
        let history: Vec<String> = vec![];
        let text = "玩家2昨天投票给玩家3，这个顺序让我很在意";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn speech_does_not_require_observable_anchor() {
        let history: Vec<String> = vec![];
        let text = "我今天整体感觉还算平静，暂时没有明确怀疑对象";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn vote_reason_requires_observable_anchor() {
        let history: Vec<String> = vec![];
        let text = "我单纯不喜欢玩家2今天的样子，没有别的原因可言";
        let result = validate_vote_reason(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Err(RejectReason::NoObservableAnchor));
    }

    #[test]
    fn accepts_reasonable_vote_reason() {
        let history: Vec<String> = vec![];
        let text = "玩家2的发言前后矛盾，投票逻辑也很可疑";
        let result = validate_vote_reason(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rejects_near_duplicate_of_history() {
        let history = vec!["玩家2昨天投票给玩家3，这个顺序让我很在意".to_string()];
        let text = "玩家2昨天投票给玩家3，这个顺序让我相当在意";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert!(matches!(result, Err(RejectReason::TooSimilarToOwnHistory(_))));
    }

    #[test]
    fn rejects_substring_containment_duplicate() {
        let history = vec!["玩家2昨天投票给玩家3这个顺序让我很在意".to_string()];
        let text = "玩家2昨天投票给玩家3这个顺序让我很在意，真的";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Err(RejectReason::DuplicateOfOwnHistory));
    }

    #[test]
    fn only_last_eight_history_entries_are_checked() {
        let mut history: Vec<String> = (0..8).map(|i| format!("往轮发言内容编号{i}占位填充文字")).collect();
        history.insert(0, "玩家2昨天投票给玩家3这个顺序让我很在意".to_string());
        let text = "玩家2昨天投票给玩家3这个顺序让我很在意";
        let result = validate_speech(text, &ctx(&history, &[]), &cfg());
        assert_eq!(result, Ok(()));
    }
}
