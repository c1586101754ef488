//! Keyword-based default categorizer
//!
//! Scores each category by the keyword rules whose words appear in the
//! product name (weighted highest), machine name or tags. The best-scoring
//! category wins; its confidence is the score capped at 1.0. Products the
//! platform marks as subscription content are categorized directly.

use hbsync_core::{
    domain::{Categorization, ProductRecord, SyncError},
    ports::ICategorizer,
};

pub const SUBSCRIPTION_CONTENT: &str = "subscription_content";

const NAME_WEIGHT: f32 = 0.8;
const MACHINE_NAME_WEIGHT: f32 = 0.5;
const TAG_WEIGHT: f32 = 0.5;

struct KeywordRule {
    category: &'static str,
    subcategory: &'static str,
    keywords: &'static [&'static str],
    weight: f32,
}

/// Earlier rules win ties
const RULES: &[KeywordRule] = &[
    KeywordRule {
        category: "audio",
        subcategory: "soundtrack",
        keywords: &["soundtrack", "ost", "album"],
        weight: 1.1,
    },
    KeywordRule {
        category: "audio",
        subcategory: "general",
        keywords: &["audio", "music", "mp3", "flac", "audiobook"],
        weight: 1.0,
    },
    KeywordRule {
        category: "comic",
        subcategory: "general",
        keywords: &["comic", "comics", "manga", "graphic novel"],
        weight: 1.1,
    },
    KeywordRule {
        category: "video",
        subcategory: "general",
        keywords: &["video", "film", "movie", "documentary", "course"],
        weight: 1.0,
    },
    KeywordRule {
        category: "software",
        subcategory: "general",
        keywords: &["software", "tool", "toolkit", "utility", "app", "suite", "studio", "editor"],
        weight: 1.0,
    },
    KeywordRule {
        category: "ebook",
        subcategory: "programming",
        keywords: &["programming", "coding", "development", "python", "java", "javascript", "rust"],
        weight: 1.2,
    },
    KeywordRule {
        category: "ebook",
        subcategory: "security",
        keywords: &["security", "hacking", "pentesting", "cyber", "malware"],
        weight: 1.2,
    },
    KeywordRule {
        category: "ebook",
        subcategory: "general",
        keywords: &["book", "books", "ebook", "guide", "manual", "tutorial", "handbook", "cookbook", "novel"],
        weight: 1.0,
    },
    KeywordRule {
        category: "game",
        subcategory: "strategy",
        keywords: &["strategy", "rts", "turn based", "civilization", "tactics"],
        weight: 1.1,
    },
    KeywordRule {
        category: "game",
        subcategory: "rpg",
        keywords: &["rpg", "role playing", "dungeon"],
        weight: 1.1,
    },
    KeywordRule {
        category: "game",
        subcategory: "simulation",
        keywords: &["simulator", "simulation", "tycoon"],
        weight: 1.1,
    },
    KeywordRule {
        category: "game",
        subcategory: "general",
        keywords: &["game", "games", "adventure", "quest", "legend", "dlc"],
        weight: 1.0,
    },
];

/// Default [`ICategorizer`] matching whole words against fixed keyword lists
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordCategorizer;

impl KeywordCategorizer {
    pub fn new() -> Self {
        Self
    }

    fn classify(&self, product: &ProductRecord) -> Categorization {
        if product.is_subscription {
            let subcategory = if product.tags.iter().any(|t| t == "coupon") {
                "coupon"
            } else if product.tags.iter().any(|t| t == "humble_choice") {
                "humble_choice"
            } else {
                "general"
            };
            return Categorization::new(SUBSCRIPTION_CONTENT, Some(subcategory.to_string()), 1.0);
        }

        let fields = [
            (normalize(&product.name), NAME_WEIGHT),
            (normalize(&product.machine_name), MACHINE_NAME_WEIGHT),
            (normalize(&product.tags.join(" ")), TAG_WEIGHT),
        ];

        // (category, total score, best rule score, subcategory of best rule)
        let mut scores: Vec<(&str, f32, f32, &str)> = Vec::new();
        for rule in RULES {
            let rule_score: f32 = fields
                .iter()
                .filter(|(text, _)| rule.keywords.iter().any(|kw| contains_word(text, kw)))
                .map(|(_, field_weight)| rule.weight * field_weight)
                .sum();
            if rule_score <= 0.0 {
                continue;
            }
            match scores.iter_mut().find(|(c, ..)| *c == rule.category) {
                Some(entry) => {
                    entry.1 += rule_score;
                    if rule_score > entry.2 {
                        entry.2 = rule_score;
                        entry.3 = rule.subcategory;
                    }
                }
                None => scores.push((rule.category, rule_score, rule_score, rule.subcategory)),
            }
        }

        let best = scores.into_iter().fold(None, |best: Option<(&str, f32, f32, &str)>, s| {
            match best {
                Some(b) if b.1 >= s.1 => Some(b),
                _ => Some(s),
            }
        });

        match best {
            Some((category, score, _, subcategory)) => {
                Categorization::new(category, Some(subcategory.to_string()), score.min(1.0))
            }
            None => Categorization::uncategorized(),
        }
    }
}

impl ICategorizer for KeywordCategorizer {
    fn categorize(&self, product: &ProductRecord) -> Result<Categorization, SyncError> {
        Ok(self.classify(product))
    }
}

/// Lowercases and pads `text` as ` word word `, splitting on anything
/// that is not alphanumeric
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_word(normalized: &str, keyword: &str) -> bool {
    normalized.contains(&format!(" {keyword} "))
}
