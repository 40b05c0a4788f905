//! Audio file path parsing: tempo detection, key-signature detection, and
//! linguistic token extraction, per `spec.md` §4.4 and resolved against
//! `original_source/util/Parser.py`.

use regex::Regex;
use std::sync::OnceLock;

const SPACE_ALTS: [char; 20] = [
    '/', '_', '-', '‒', '–', '—', '−', '~', '=', ',', '.', ':', '(', ')', '[', ']', '{', '}', '<', '>',
];

const DROP_CHARS: [char; 4] = ['\'', '"', '!', '?'];

const RANGE_TEMPO_1: (u32, u32) = (80, 140);
const RANGE_TEMPO_2: (u32, u32) = (60, 180);
const RANGE_TEMPO_3: (u32, u32) = (40, 240);
const RANGE_TEMPO_SANITY: (u32, u32) = (20, 300);

fn regex_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[a-g] ?(b|#|sharp|flat)? ?(m(in|aj)?)?(or)?([2-7])?\b").expect("static regex")
    })
}

fn regex_tempo_postfix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2,3}( )?bpm").expect("static regex"))
}

fn regex_tempo_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bpm ?\d{2,3}\b").expect("static regex"))
}

fn regex_tempo_unlabeled() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{2,3}\b").expect("static regex"))
}

fn regex_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2,3}").expect("static regex"))
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ParsedAudioFilePath {
    pub path: String,
    pub key: String,
    pub tempo: Option<u32>,
    pub tokens: Vec<String>,
}

/// Trims the leading path segment and trailing extension, then lowercases.
fn trim(path: &str) -> String {
    let path = path.to_lowercase();
    let path = match path.rfind('.') {
        Some(idx) => &path[..idx],
        None => &path[..],
    };
    match path.find('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path.to_string(),
    }
}

fn normal_spaces(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if SPACE_ALTS.contains(&c) {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    let out = out.trim().to_string();
    let mut collapsed = String::with_capacity(out.len());
    let mut last_was_space = false;
    for c in out.chars() {
        if c == ' ' {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    collapsed
}

fn cleanse(path: &str) -> String {
    path.chars().filter(|c| !DROP_CHARS.contains(c)).collect()
}

fn has_tempo_label(path: &str) -> bool {
    path.contains("bpm")
}

fn normal_tempo(raw: &str) -> Option<u32> {
    regex_digits().find(raw).and_then(|m| m.as_str().parse().ok())
}

fn labeled_raw_tempo_candidates(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(m) = regex_tempo_postfix().find(path) {
        out.push(m.as_str().to_string());
    }
    if let Some(m) = regex_tempo_prefix().find(path) {
        out.push(m.as_str().to_string());
    }
    out
}

fn unlabeled_raw_tempo_candidates(path: &str) -> Vec<String> {
    let mut candidates: Vec<String> = regex_tempo_unlabeled()
        .find_iter(path)
        .map(|m| m.as_str().to_string())
        .collect();
    if candidates.len() > 1 {
        candidates.sort();
        candidates.dedup();
    }
    candidates
}

/// Chooses a single tempo from ambiguous candidates per §8 property 6:
/// try 80-140, then 60-180, then 40-240; stop at the first range with
/// exactly one candidate. Clamp against the 20-300 sanity bound.
fn tempo_from_candidates(candidates: &[String]) -> Option<u32> {
    let numbers: Vec<Option<u32>> = candidates.iter().map(|c| normal_tempo(c)).collect();
    for range in [RANGE_TEMPO_1, RANGE_TEMPO_2, RANGE_TEMPO_3] {
        let indexed: Vec<(usize, u32)> = numbers
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.map(|n| (i, n)))
            .filter(|(_, n)| *n >= range.0 && *n <= range.1)
            .collect();
        if indexed.len() == 1 {
            let (_, n) = indexed[0];
            if n >= RANGE_TEMPO_SANITY.0 && n <= RANGE_TEMPO_SANITY.1 {
                return Some(n);
            }
            return None;
        }
    }
    None
}

fn parse_tempo(space_normal_path: &str) -> (String, Option<u32>) {
    let candidates = if has_tempo_label(space_normal_path) {
        labeled_raw_tempo_candidates(space_normal_path)
    } else {
        unlabeled_raw_tempo_candidates(space_normal_path)
    };
    match candidates.len() {
        0 => (String::new(), None),
        1 => (candidates[0].clone(), normal_tempo(&candidates[0])),
        _ => {
            let tempo = tempo_from_candidates(&candidates);
            let raw = match tempo {
                Some(n) => candidates
                    .iter()
                    .find(|c| normal_tempo(c) == Some(n))
                    .cloned()
                    .unwrap_or_default(),
                None => String::new(),
            };
            (raw, tempo)
        }
    }
}

fn raw_key_signature(path: &str) -> String {
    regex_key().find(path).map(|m| m.as_str().to_string()).unwrap_or_default()
}

fn normal_key_signature(raw: &str) -> String {
    if raw.len() < 2 {
        return raw.to_uppercase();
    }
    let mut sig = String::new();
    let mut chars = raw.chars();
    if let Some(first) = chars.next() {
        sig.push(first.to_ascii_uppercase());
    }
    sig.push_str(&chars.as_str().to_lowercase());
    let sig = sig.replace(' ', "");
    let sig = sig.replace("sharp", "#").replace("flat", "b").replace("or", "");
    let re_m = Regex::new(r"m($|[2-7])").expect("static regex");
    re_m.replace(&sig, "min").to_string()
}

fn parse_key_signature(space_normal_path: &str) -> (String, String) {
    let raw = raw_key_signature(space_normal_path);
    let normal = if raw.is_empty() { String::new() } else { normal_key_signature(&raw) };
    (raw, normal)
}

/// Drops tokens shorter than 3 characters. The original keeps a looser
/// `len() > 1` bound here since its spam filter immediately after catches
/// most 2-char noise anyway; we apply the wider, stated threshold instead
/// (see DESIGN.md).
fn drop_short_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens.into_iter().filter(|t| t.len() >= 3).collect()
}

fn drop_spam_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .filter(|t| {
            let first = t.chars().next();
            match first {
                Some(c) => t.chars().any(|ch| ch != c),
                None => true,
            }
        })
        .collect()
}

fn drop_nonlinguistic_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens.into_iter().filter(|t| t.chars().any(|c| c.is_ascii_lowercase())).collect()
}

fn drop_attribution_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens.into_iter().filter(|t| !t.starts_with('@')).collect()
}

fn filter_tokens(tokens: Vec<String>) -> Vec<String> {
    drop_attribution_tokens(drop_nonlinguistic_tokens(drop_spam_tokens(drop_short_tokens(tokens))))
}

/// Parses one audio file path into its tempo, key signature, and
/// remaining linguistic tokens.
pub fn parse_path(path: &str) -> ParsedAudioFilePath {
    let path = trim(path);
    let space_normal = normal_spaces(&path);
    let (raw_tempo, tempo) = parse_tempo(&space_normal);
    let (raw_key, key) = parse_key_signature(&space_normal);
    let mut stripped = path.clone();
    if !raw_tempo.is_empty() {
        stripped = stripped.replace(&raw_tempo, "");
    }
    if !raw_key.is_empty() {
        stripped = stripped.replace(&raw_key, "");
    }
    let normal_path = normal_spaces(&cleanse(&stripped));
    let tokens = filter_tokens(normal_path.split(' ').filter(|s| !s.is_empty()).map(|s| s.to_lowercase()).collect());
    ParsedAudioFilePath { path, key, tempo, tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_scenario_from_spec() {
        let parsed = parse_path("Label - Title/Drums 128bpm/01 F#min Kick.wav");
        assert_eq!(parsed.tempo, Some(128));
        assert_eq!(parsed.key, "F#min");
        assert!(parsed.tokens.contains(&"drums".to_string()));
        assert!(parsed.tokens.contains(&"kick".to_string()));
        assert!(!parsed.tokens.iter().any(|t| t.len() == 1));
        assert!(!parsed.tokens.contains(&"01".to_string()));
        assert!(!parsed.tokens.contains(&"128".to_string()));
    }

    #[test]
    fn tempo_disambiguation_ranges() {
        assert_eq!(tempo_from_candidates(&["128".into(), "45".into()]), Some(128));
        assert_eq!(tempo_from_candidates(&["128".into(), "90".into()]), None);
        assert_eq!(tempo_from_candidates(&["170".into(), "45".into()]), Some(170));
        assert_eq!(tempo_from_candidates(&["300".into()]), None);
        assert_eq!(tempo_from_candidates(&["999".into()]), None);
    }

    #[test]
    fn spam_tokens_dropped() {
        let parsed = parse_path("Label - Title/xxxx kick.wav");
        assert!(!parsed.tokens.contains(&"xxxx".to_string()));
        assert!(parsed.tokens.contains(&"kick".to_string()));
    }

    #[test]
    fn prefix_bpm_detected() {
        let parsed = parse_path("Label - Title/bpm140 loop.wav");
        assert_eq!(parsed.tempo, Some(140));
    }

    #[test]
    fn two_char_tokens_are_dropped() {
        let parsed = parse_path("Label - Title/hi kick.wav");
        assert!(!parsed.tokens.contains(&"hi".to_string()));
        assert!(parsed.tokens.contains(&"kick".to_string()));
    }
}
