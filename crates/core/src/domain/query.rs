use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Azerbaijani,
    Russian,
}

impl Language {
    /// Cheap script/diacritic heuristic. Good enough to pick keyword tables and the
    /// decline/clarification phrasing; anything unrecognised falls back to English.
    pub fn detect(text: &str) -> Self {
        let mut cyrillic = 0usize;
        let mut azerbaijani = 0usize;
        for character in text.chars() {
            match character {
                '\u{0400}'..='\u{04FF}' => cyrillic += 1,
                'ə' | 'Ə' | 'ğ' | 'Ğ' | 'ı' | 'İ' | 'ş' | 'Ş' | 'ç' | 'Ç' | 'ö' | 'Ö' | 'ü'
                | 'Ü' => azerbaijani += 1,
                _ => {}
            }
        }

        if cyrillic > 0 && cyrillic >= azerbaijani {
            Self::Russian
        } else if azerbaijani > 0 {
            Self::Azerbaijani
        } else {
            Self::English
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub language: Language,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self::received_at(text, Utc::now())
    }

    pub fn received_at(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        let text = text.into();
        let language = Language::detect(&text);
        Self { text, language, received_at }
    }

    pub fn normalized(&self) -> String {
        self.text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::{Language, Query};

    #[test]
    fn detects_language_from_script() {
        assert_eq!(Language::detect("Should I irrigate my cotton?"), Language::English);
        assert_eq!(Language::detect("Pambığı nə vaxt suvarmalıyam?"), Language::Azerbaijani);
        assert_eq!(Language::detect("Когда поливать хлопок?"), Language::Russian);
    }

    #[test]
    fn query_keeps_raw_text_and_normalizes_on_demand() {
        let query = Query::new("Irrigate NOW?");
        assert_eq!(query.text, "Irrigate NOW?");
        assert_eq!(query.normalized(), "irrigate now?");
        assert_eq!(query.language, Language::English);
    }
}
