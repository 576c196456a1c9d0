use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tarla_core::domain::intent::Intent;
use tarla_core::domain::query::{Language, Query};
use tarla_core::domain::recommendation::{ClarificationRequest, ClarificationSlot};

pub const DEFAULT_CLARIFICATION_THRESHOLD: f64 = 0.6;
const STRONG: u32 = 2;
const WEAK: u32 = 1;
const FOLLOW_UP_CONFIDENCE: f64 = 0.65;
const MAX_CONFIDENCE: f64 = 0.95;

/// Keyword stems per intent. A stem matches any token that starts with it; a stem
/// containing a space matches that phrase. Strong stems name the topic outright.
struct KeywordTable {
    intent: Intent,
    strong: &'static [&'static str],
    weak: &'static [&'static str],
}

const KEYWORDS: [KeywordTable; 7] = [
    KeywordTable {
        intent: Intent::Irrigation,
        strong: &["irrigat", "water", "watering", "drip", "sprinkler", "moisture", "suvar", "полив"],
        weak: &["dry", "wilting", "thirsty", "quraq"],
    },
    KeywordTable {
        intent: Intent::Fertilization,
        strong: &[
            "fertiliz", "fertilis", "nitrogen", "phosphor", "potassium", "npk", "urea", "manure",
            "gübrə", "gubre", "удобр",
        ],
        weak: &["nutrient", "feed", "yellow"],
    },
    KeywordTable {
        intent: Intent::PestControl,
        strong: &["pest", "insect", "infest", "bug", "zərərverici", "ziyanverici", "вредител"],
        weak: &["worm", "larva", "spray", "holes in", "disease"],
    },
    KeywordTable {
        intent: Intent::HarvestTiming,
        strong: &["harvest", "ripe", "maturity", "mature", "biçin", "yığım", "урожа", "уборк"],
        weak: &["pick", "ready"],
    },
    KeywordTable {
        intent: Intent::SubsidyInfo,
        strong: &["subsid", "grant", "government support", "dövlət dəstəyi", "субсиди"],
        weak: &["payment", "money", "loan", "aid", "ödəniş"],
    },
    KeywordTable {
        intent: Intent::WeatherInquiry,
        strong: &["weather", "forecast", "rain", "frost", "storm", "hava", "yağış", "погод", "дожд"],
        weak: &["hot", "cold", "wind", "heat", "temperature"],
    },
    KeywordTable {
        intent: Intent::GeneralAdvice,
        strong: &["advice", "recommend", "tips", "best practice", "rotation", "məsləhət", "совет"],
        weak: &["help", "grow", "plant", "sow"],
    },
];

/// Names the farmer may use for a pest, mapped to the canonical pest key.
const PEST_ALIASES: [(&str, &str); 14] = [
    ("cotton bollworm", "cotton bollworm"),
    ("bollworm", "cotton bollworm"),
    ("colorado potato beetle", "colorado potato beetle"),
    ("potato beetle", "colorado potato beetle"),
    ("codling moth", "codling moth"),
    ("spider mite", "spider mite"),
    ("mites", "spider mite"),
    ("whitefl", "whitefly"),
    ("locust", "locust"),
    ("çəyirtkə", "locust"),
    ("саранч", "locust"),
    ("aphid", "aphid"),
    ("mənənə", "aphid"),
    ("тля", "aphid"),
];

const CROP_WORDS: [&str; 18] = [
    "cotton", "wheat", "maize", "corn", "potato", "tomato", "barley", "sunflower", "pambıq",
    "buğda", "kartof", "pomidor", "arpa", "qarğıdalı", "хлоп", "пшениц", "картоф", "томат",
];

const FARM_WORDS: [&str; 10] =
    ["farm", "field", "crop", "soil", "seed", "orchard", "tarla", "torpaq", "поле", "почв"];

const OFF_TOPIC_WORDS: [&str; 12] = [
    "football", "movie", "film", "song", "music", "bitcoin", "crypto", "politic", "election",
    "joke", "recipe", "celebrity",
];

const FOLLOW_UP_MARKERS: [&str; 9] =
    ["what about", "and if", "how much", "how many", "how long", "when", "bəs", "neçə", "а если"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutedIntent {
    pub primary: Intent,
    /// Other detected domain intents, in priority order.
    pub secondary: Vec<Intent>,
    pub confidence: f64,
    pub language: Language,
    pub reported_pest: Option<String>,
    pub clarification: Option<ClarificationRequest>,
}

impl RoutedIntent {
    pub fn needs_clarification(&self) -> bool {
        self.primary == Intent::ClarificationNeeded
    }

    pub fn is_off_topic(&self) -> bool {
        self.primary == Intent::OffTopic
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IntentRouter {
    clarification_threshold: f64,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CLARIFICATION_THRESHOLD)
    }
}

impl IntentRouter {
    pub fn new(clarification_threshold: f64) -> Self {
        Self { clarification_threshold }
    }

    pub fn clarification_threshold(&self) -> f64 {
        self.clarification_threshold
    }

    /// Classifies `query`. `prior` is the intent of the previous turn in the
    /// conversation and only resolves follow-ups that name no topic of their own.
    pub fn route(&self, query: &Query, prior: Option<Intent>) -> RoutedIntent {
        let normalized = normalize_text(&query.text);
        let tokens = tokenize(&normalized);
        let joined = format!(" {} ", tokens.join(" "));

        let reported_pest = extract_pest(&tokens, &joined);
        let scores = score_intents(&tokens, &joined, reported_pest.is_some());
        let mentions_crop = contains_any(&tokens, &joined, &CROP_WORDS);
        let mentions_farm = mentions_crop || contains_any(&tokens, &joined, &FARM_WORDS);

        let mut ranked = scores.iter().map(|(intent, score)| (*intent, *score)).collect::<Vec<_>>();
        ranked.sort_by_key(|(intent, score)| {
            (intent.priority_rank(), std::cmp::Reverse(*score), declaration_index(*intent))
        });

        let detected =
            ranked.iter().filter(|(_, score)| *score >= STRONG).map(|(intent, _)| *intent).collect::<Vec<_>>();

        let outcome = |primary: Intent, secondary: Vec<Intent>, confidence: f64| RoutedIntent {
            primary,
            secondary,
            confidence,
            language: query.language,
            reported_pest: reported_pest.clone(),
            clarification: None,
        };

        // A weak mention of a higher-priority topic never displaces a strongly detected one.
        let leading = ranked.iter().find(|(_, score)| *score >= STRONG).or(ranked.first()).copied();
        if let Some((primary, score)) = leading {
            let confidence = keyword_confidence(score);
            if confidence >= self.clarification_threshold {
                let secondary =
                    detected.iter().copied().filter(|intent| *intent != primary).collect::<Vec<_>>();
                return outcome(primary, secondary, confidence);
            }

            let candidates = ranked.iter().map(|(intent, _)| *intent).collect::<Vec<_>>();
            return self.clarify(outcome(Intent::ClarificationNeeded, Vec::new(), confidence), candidates, mentions_crop);
        }

        let follow_up = contains_any(&tokens, &joined, &FOLLOW_UP_MARKERS) || mentions_crop;
        if let Some(prior) = prior.filter(|intent| intent.category().is_some()) {
            if follow_up && FOLLOW_UP_CONFIDENCE >= self.clarification_threshold {
                return outcome(prior, Vec::new(), FOLLOW_UP_CONFIDENCE);
            }
        }

        if mentions_farm {
            return self.clarify(outcome(Intent::ClarificationNeeded, Vec::new(), 0.0), Vec::new(), mentions_crop);
        }

        let off_topic_confidence =
            if contains_any(&tokens, &joined, &OFF_TOPIC_WORDS) { MAX_CONFIDENCE } else { 0.7 };
        outcome(Intent::OffTopic, Vec::new(), off_topic_confidence)
    }

    fn clarify(&self, mut routed: RoutedIntent, candidates: Vec<Intent>, mentions_crop: bool) -> RoutedIntent {
        let mut slots = vec![ClarificationSlot::Topic];
        if !mentions_crop {
            slots.push(ClarificationSlot::Crop);
        }
        routed.clarification = Some(ClarificationRequest { candidates, slots });
        routed
    }
}

/// Fixed decline for off-topic queries, in the farmer's language.
pub fn decline_message(language: Language) -> &'static str {
    match language {
        Language::Azerbaijani => {
            "Bağışlayın, mən yalnız təsərrüfat məsələlərində kömək edə bilərəm: suvarma, gübrələmə, zərərvericilər, məhsul yığımı, subsidiyalar və hava."
        }
        Language::Russian => {
            "Извините, я могу помочь только с вопросами хозяйства: полив, удобрения, вредители, уборка урожая, субсидии и погода."
        }
        Language::English => {
            "Sorry, I can only help with farming questions: irrigation, fertilizer, pests, harvest timing, subsidies and weather."
        }
    }
}

fn keyword_confidence(score: u32) -> f64 {
    (0.25 + 0.3 * f64::from(score)).min(MAX_CONFIDENCE)
}

fn declaration_index(intent: Intent) -> usize {
    Intent::DOMAIN.iter().position(|candidate| *candidate == intent).unwrap_or(usize::MAX)
}

fn score_intents(tokens: &[String], joined: &str, names_pest: bool) -> BTreeMap<Intent, u32> {
    let mut scores = BTreeMap::new();
    for table in &KEYWORDS {
        let strong = table.strong.iter().filter(|stem| matches_stem(tokens, joined, stem)).count() as u32;
        let weak = table.weak.iter().filter(|stem| matches_stem(tokens, joined, stem)).count() as u32;
        let mut score = strong * STRONG + weak * WEAK;
        if table.intent == Intent::PestControl && names_pest {
            score += STRONG;
        }
        if score > 0 {
            scores.insert(table.intent, score);
        }
    }
    scores
}

fn extract_pest(tokens: &[String], joined: &str) -> Option<String> {
    PEST_ALIASES
        .iter()
        .find(|(alias, _)| matches_stem(tokens, joined, alias))
        .map(|(_, canonical)| (*canonical).to_string())
}

fn contains_any(tokens: &[String], joined: &str, stems: &[&str]) -> bool {
    stems.iter().any(|stem| matches_stem(tokens, joined, stem))
}

fn matches_stem(tokens: &[String], joined: &str, stem: &str) -> bool {
    if stem.contains(' ') {
        joined.contains(&format!(" {stem}"))
    } else {
        tokens.iter().any(|token| token.starts_with(stem))
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use tarla_core::domain::intent::Intent;
    use tarla_core::domain::query::{Language, Query};
    use tarla_core::domain::recommendation::ClarificationSlot;
    use tarla_core::evaluators::pest::KNOWN_PESTS;

    use super::{decline_message, IntentRouter, PEST_ALIASES};

    #[test]
    fn routes_common_phrases() {
        struct Case {
            text: &'static str,
            expected: Intent,
        }

        let cases = vec![
            Case { text: "Should I irrigate my cotton today?", expected: Intent::Irrigation },
            Case { text: "How much water does the wheat field need?", expected: Intent::Irrigation },
            Case { text: "Pambığı nə vaxt suvarmalıyam?", expected: Intent::Irrigation },
            Case { text: "Когда поливать хлопок?", expected: Intent::Irrigation },
            Case { text: "How much nitrogen fertilizer for maize?", expected: Intent::Fertilization },
            Case { text: "Buğdaya nə qədər gübrə lazımdır?", expected: Intent::Fertilization },
            Case { text: "There are pests eating my tomato leaves", expected: Intent::PestControl },
            Case { text: "My cotton has bollworm", expected: Intent::PestControl },
            Case { text: "When should I harvest the barley?", expected: Intent::HarvestTiming },
            Case { text: "Am I eligible for a subsidy on 10 hectares?", expected: Intent::SubsidyInfo },
            Case { text: "Subsidiya almaq üçün nə etməliyəm?", expected: Intent::SubsidyInfo },
            Case { text: "What is the weather forecast for Aran?", expected: Intent::WeatherInquiry },
            Case { text: "Will it rain tomorrow?", expected: Intent::WeatherInquiry },
            Case { text: "Any advice on crop rotation?", expected: Intent::GeneralAdvice },
        ];

        let router = IntentRouter::default();
        for (index, case) in cases.iter().enumerate() {
            let routed = router.route(&Query::new(case.text), None);
            assert_eq!(routed.primary, case.expected, "case {index}: {}", case.text);
            assert!(routed.confidence >= 0.6, "case {index} confidence: {}", case.text);
        }
    }

    #[test]
    fn pest_outranks_other_detected_topics() {
        let routed = IntentRouter::default()
            .route(&Query::new("Should I water the cotton or spray for bollworm first? Rain is coming."), None);

        assert_eq!(routed.primary, Intent::PestControl);
        assert_eq!(routed.secondary, vec![Intent::Irrigation, Intent::WeatherInquiry]);
        assert_eq!(routed.reported_pest.as_deref(), Some("cotton bollworm"));
    }

    #[test]
    fn irrigation_and_harvest_tie_is_broken_by_score() {
        let routed = IntentRouter::default()
            .route(&Query::new("Is it time to harvest, the crop looks mature and ripe, or irrigate?"), None);
        assert_eq!(routed.primary, Intent::HarvestTiming);
        assert_eq!(routed.secondary, vec![Intent::Irrigation]);
    }

    #[test]
    fn weak_mention_of_higher_priority_topic_does_not_displace_strong_one() {
        let routed = IntentRouter::default().route(&Query::new("Should I irrigate before I spray?"), None);

        assert_eq!(routed.primary, Intent::Irrigation);
        assert!((routed.confidence - 0.85).abs() < 1e-9);
        assert!(routed.secondary.is_empty());
        assert!(routed.clarification.is_none());
    }

    #[test]
    fn weak_signal_asks_for_clarification_instead_of_guessing() {
        let routed = IntentRouter::default().route(&Query::new("Can you help me?"), None);

        assert_eq!(routed.primary, Intent::ClarificationNeeded);
        assert!(routed.confidence < 0.6);
        let clarification = routed.clarification.expect("clarification request");
        assert_eq!(clarification.candidates, vec![Intent::GeneralAdvice]);
        assert!(clarification.slots.contains(&ClarificationSlot::Topic));
        assert!(clarification.slots.contains(&ClarificationSlot::Crop));
    }

    #[test]
    fn farm_question_without_topic_needs_clarification() {
        let routed = IntentRouter::default().route(&Query::new("What about my cotton field?"), None);
        assert!(routed.needs_clarification());
        let clarification = routed.clarification.expect("clarification request");
        assert_eq!(clarification.slots, vec![ClarificationSlot::Topic]);
    }

    #[test]
    fn follow_up_reuses_prior_intent() {
        let router = IntentRouter::default();
        let routed = router.route(&Query::new("What about the wheat?"), Some(Intent::Fertilization));
        assert_eq!(routed.primary, Intent::Fertilization);
        assert!(routed.confidence >= 0.6);

        let no_prior = router.route(&Query::new("What about the wheat?"), None);
        assert!(no_prior.needs_clarification());
    }

    #[test]
    fn unrelated_query_is_off_topic_with_localized_decline() {
        let router = IntentRouter::default();
        let routed = router.route(&Query::new("Who won the football match last night?"), None);
        assert!(routed.is_off_topic());
        assert!(routed.clarification.is_none());
        assert!(decline_message(routed.language).contains("farming questions"));
        assert!(decline_message(Language::Azerbaijani).contains("təsərrüfat"));
    }

    #[test]
    fn higher_threshold_turns_confident_routes_into_clarification() {
        let strict = IntentRouter::new(0.99);
        let routed = strict.route(&Query::new("Should I irrigate?"), None);
        assert!(routed.needs_clarification());
        assert_eq!(routed.clarification.map(|request| request.candidates), Some(vec![Intent::Irrigation]));
    }

    #[test]
    fn grain_is_not_mistaken_for_rain() {
        let routed = IntentRouter::default().route(&Query::new("Should I irrigate the grain field?"), None);
        assert_eq!(routed.primary, Intent::Irrigation);
        assert!(routed.secondary.is_empty());
    }

    #[test]
    fn pest_aliases_resolve_to_known_pests() {
        for (_, canonical) in PEST_ALIASES {
            assert!(KNOWN_PESTS.contains(&canonical), "{canonical} must be a known pest");
        }
        let routed = IntentRouter::default().route(&Query::new("Spider mites all over the leaves"), None);
        assert_eq!(routed.reported_pest.as_deref(), Some("spider mite"));
        assert_eq!(routed.primary, Intent::PestControl);
    }
}
