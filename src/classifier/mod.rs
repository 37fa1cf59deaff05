//! Deterministic ticket classifier.
//!
//! Pure functions over ticket text: no database, no network. The
//! enrichment pipeline writes this result first so a safe baseline
//! exists before (and regardless of) any LLM call.

use serde::Serialize;

use crate::shared::models::{Ticket, SEGMENT_PRIORITY, SEGMENT_VIP};

pub const TYPE_SPAM: &str = "Спам";
pub const TYPE_CLAIM: &str = "Претензия";
pub const TYPE_COMPLAINT: &str = "Жалоба";
pub const TYPE_MALFUNCTION: &str = "Неработоспособность";
pub const TYPE_DATA_CHANGE: &str = "Смена данных";
pub const TYPE_CONSULTATION: &str = "Консультация";

pub const SENTIMENT_NEGATIVE: &str = "Негативный";
pub const SENTIMENT_POSITIVE: &str = "Позитивный";
pub const SENTIMENT_NEUTRAL: &str = "Нейтральный";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub sentiment: String,
    pub priority_1_10: i32,
    pub lang: String,
    pub summary: String,
    pub recommended_actions: Vec<String>,
    pub geo_city: Option<String>,
    pub confidence_type: f64,
    pub confidence_sentiment: f64,
    pub confidence_priority: f64,
}

/// Classify a ticket from its stored fields alone.
pub fn classify_ticket(ticket: &Ticket) -> Baseline {
    let (ticket_type, confidence_type) = classify_type(&ticket.body, &ticket.subject);
    let (sentiment, confidence_sentiment) = classify_sentiment(&ticket.body);
    let (priority_1_10, confidence_priority) =
        calculate_priority(ticket.client_segment.as_deref(), &ticket_type, &sentiment);

    Baseline {
        lang: detect_language(&ticket.body),
        summary: summarize(&ticket.body),
        recommended_actions: suggest_actions(&ticket_type, ticket.client_segment.as_deref()),
        geo_city: extract_city_from_address(ticket.raw_address.as_deref()),
        ticket_type,
        sentiment,
        priority_1_10,
        confidence_type,
        confidence_sentiment,
        confidence_priority,
    }
}

const KAZAKH_LETTERS: &str = "әғқңөұүіһӘҒҚҢӨҰҮІҺ";

/// Kazakh has letters Russian does not; their presence is decisive.
/// Otherwise a dominant Latin share means English, and Russian is the
/// default for everything else including empty text.
pub fn detect_language(body: &str) -> String {
    let mut kaz = 0usize;
    let mut cyr = 0usize;
    let mut lat = 0usize;
    let mut total = 0usize;

    for c in body.chars() {
        if !c.is_alphabetic() {
            continue;
        }
        total += 1;
        if KAZAKH_LETTERS.contains(c) {
            kaz += 1;
        }
        if ('а'..='я').contains(&c) || ('А'..='Я').contains(&c) || c == 'ё' || c == 'Ё' {
            cyr += 1;
        }
        if c.is_ascii_alphabetic() {
            lat += 1;
        }
    }

    if total == 0 {
        return "RU".to_string();
    }
    if kaz > 0 {
        return "KZ".to_string();
    }
    if lat > cyr && lat as f64 / total as f64 > 0.6 {
        return "EN".to_string();
    }
    "RU".to_string()
}

struct TypeKeywords {
    ticket_type: &'static str,
    keywords: &'static [&'static str],
    weight: i32,
}

const TYPE_KEYWORDS: &[TypeKeywords] = &[
    TypeKeywords {
        ticket_type: TYPE_SPAM,
        keywords: &[
            "http://", "https://", "www.", "bit.ly", "перейди", "акция", "выигр", "заработ",
            "бесплатн", "нажми", "подписк",
        ],
        weight: 10,
    },
    TypeKeywords {
        ticket_type: TYPE_CLAIM,
        keywords: &[
            "претензи",
            "компенсац",
            "возврат",
            "возместит",
            "ущерб",
            "требую возврат",
            "верните деньги",
            "требую компенсац",
            "официальн",
            "юрист",
            "суд ",
        ],
        weight: 9,
    },
    TypeKeywords {
        ticket_type: TYPE_COMPLAINT,
        keywords: &[
            "жалоба", "жалоб", "недовол", "возмущ", "безобрази", "хамств", "нарушен", "обман",
        ],
        weight: 8,
    },
    TypeKeywords {
        ticket_type: TYPE_MALFUNCTION,
        keywords: &[
            "не работает",
            "ошибка",
            "сбой",
            "зависа",
            "не открыва",
            "баг",
            "глюч",
            "не загруж",
            "не могу войти",
            "не отображ",
            "техническ",
            "приложени",
            "неработоспособн",
            "экран",
        ],
        weight: 7,
    },
    TypeKeywords {
        ticket_type: TYPE_DATA_CHANGE,
        keywords: &[
            "смена данных",
            "изменить данные",
            "сменить",
            "обновить данные",
            "изменить фио",
            "изменить адрес",
            "новый номер",
            "смена телефон",
            "изменить реквизит",
            "обновить информац",
        ],
        weight: 6,
    },
    TypeKeywords {
        ticket_type: TYPE_CONSULTATION,
        keywords: &[
            "вопрос",
            "подскажите",
            "как ",
            "можно ли",
            "интересу",
            "расскажите",
            "объясните",
            "уточните",
            "информаци",
            "узнать",
            "консультаци",
            "спасибо",
            "благодар",
        ],
        weight: 5,
    },
];

/// Keyword scoring: hits × class weight, highest effective score wins.
pub fn classify_type(body: &str, subject: &str) -> (String, f64) {
    let text = format!("{} {}", body, subject).to_lowercase();

    let mut best_type = TYPE_CONSULTATION;
    let mut best_score = 0;
    let mut best_weight = 0;

    for entry in TYPE_KEYWORDS {
        let hits = entry
            .keywords
            .iter()
            .filter(|kw| text.contains(**kw))
            .count() as i32;
        let effective = hits * entry.weight;
        if hits > 0 && effective > best_score {
            best_score = effective;
            best_weight = entry.weight;
            best_type = entry.ticket_type;
        }
    }

    if best_score == 0 {
        return (TYPE_CONSULTATION.to_string(), 0.3);
    }

    let matches = best_score / best_weight;
    let confidence = (0.5 + f64::from(matches - 1) * 0.15).min(0.80);
    (best_type.to_string(), confidence)
}

const NEGATIVE_WORDS: &[&str] = &[
    "плохо",
    "ужасн",
    "недовол",
    "проблем",
    "жалоб",
    "разочаров",
    "не устраива",
    "возмущ",
    "безобрази",
    "хамств",
    "обман",
    "не работ",
    "ошибк",
    "сбой",
    "отврат",
    "кошмар",
];

const POSITIVE_WORDS: &[&str] = &[
    "спасибо",
    "благодар",
    "отлично",
    "хорош",
    "прекрасн",
    "довол",
    "рад",
    "замечател",
    "великолепн",
    "молодц",
    "супер",
    "класс",
];

pub fn classify_sentiment(body: &str) -> (String, f64) {
    let lower = body.to_lowercase();

    let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(**w)).count() as i32;
    let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(**w)).count() as i32;

    if neg > pos && neg > 0 {
        let confidence = (0.5 + f64::from(neg) * 0.1).min(0.75);
        return (SENTIMENT_NEGATIVE.to_string(), confidence);
    }
    if pos > neg && pos > 0 {
        let confidence = (0.5 + f64::from(pos) * 0.1).min(0.75);
        return (SENTIMENT_POSITIVE.to_string(), confidence);
    }
    (SENTIMENT_NEUTRAL.to_string(), 0.60)
}

/// Segment sets the base, ticket type acts as a floor, negative
/// sentiment nudges up. Spam always collapses to 1.
pub fn calculate_priority(segment: Option<&str>, ticket_type: &str, sentiment: &str) -> (i32, f64) {
    let mut priority = 5;
    let mut confidence = 0.60;

    match segment {
        Some(SEGMENT_VIP) => {
            priority = 8;
            confidence = 0.90;
        }
        Some(SEGMENT_PRIORITY) => {
            priority = 7;
            confidence = 0.90;
        }
        Some("Standard") | Some("Mass") => {
            priority = 5;
            confidence = 0.85;
        }
        _ => {}
    }

    match ticket_type {
        TYPE_CLAIM => priority = priority.max(8),
        TYPE_COMPLAINT => priority = priority.max(7),
        TYPE_MALFUNCTION => priority = priority.max(6),
        TYPE_DATA_CHANGE => priority = priority.max(4),
        TYPE_SPAM => priority = 1,
        _ => {}
    }

    if sentiment == SENTIMENT_NEGATIVE && priority < 7 {
        priority += 1;
    }

    (priority.clamp(1, 10), confidence)
}

const KNOWN_CITIES: &[&str] = &[
    "алматы",
    "астана",
    "нур-султан",
    "шымкент",
    "караганда",
    "актобе",
    "тараз",
    "павлодар",
    "усть-каменогорск",
    "семей",
    "атырау",
    "костанай",
    "кызылорда",
    "уральск",
    "петропавловск",
    "актау",
    "туркестан",
    "кокшетау",
    "талдыкорган",
    "экибастуз",
    "москва",
];

/// Raw addresses come in as "country, region, city, street, house";
/// the third part is the city. A known-city scan covers malformed rows.
pub fn extract_city_from_address(raw_address: Option<&str>) -> Option<String> {
    let raw = raw_address?;
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw.split(',').collect();

    if parts.len() >= 3 {
        let city = parts[2].trim();
        if !city.is_empty() {
            return Some(city.to_string());
        }
    }

    for part in &parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if KNOWN_CITIES.contains(&part.to_lowercase().as_str()) {
            return Some(part.to_string());
        }
    }

    None
}

/// Whitespace-normalized body cut to at most 200 characters at a word
/// boundary (not below 150), with an ellipsis when truncated.
pub fn summarize(body: &str) -> String {
    let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= 200 {
        return normalized;
    }
    let mut cutoff = 200;
    while cutoff > 150 && chars[cutoff] != ' ' {
        cutoff -= 1;
    }
    let mut out: String = chars[..cutoff].iter().collect();
    out.push_str("...");
    out
}

pub fn suggest_actions(ticket_type: &str, segment: Option<&str>) -> Vec<String> {
    let elevated = matches!(segment, Some(SEGMENT_VIP) | Some(SEGMENT_PRIORITY));

    match ticket_type {
        TYPE_COMPLAINT => {
            let mut actions = vec![
                "Связаться с клиентом для уточнения деталей жалобы".to_string(),
                "Зарегистрировать жалобу в системе".to_string(),
            ];
            if elevated {
                actions.push("Назначить персонального менеджера для решения".to_string());
            }
            actions
        }
        TYPE_CLAIM => {
            let mut actions = vec![
                "Зарегистрировать претензию в системе".to_string(),
                "Проверить основания для компенсации".to_string(),
                "Связаться с клиентом в течение 24 часов".to_string(),
            ];
            if elevated {
                actions.push("Эскалировать руководителю подразделения".to_string());
            }
            actions
        }
        TYPE_MALFUNCTION => vec![
            "Передать в техническую поддержку".to_string(),
            "Запросить скриншоты/логи у клиента".to_string(),
            "Проверить статус системы".to_string(),
        ],
        TYPE_DATA_CHANGE => vec![
            "Запросить подтверждающие документы".to_string(),
            "Обработать заявку на смену данных".to_string(),
            "Уведомить клиента о сроках обработки".to_string(),
        ],
        TYPE_CONSULTATION => vec![
            "Предоставить запрашиваемую информацию".to_string(),
            "Направить ссылку на соответствующую документацию".to_string(),
        ],
        TYPE_SPAM => vec!["Пометить как спам, не требует обработки".to_string()],
        _ => vec![
            "Изучить обращение и определить тип".to_string(),
            "Связаться с клиентом для уточнения".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn ticket(subject: &str, body: &str, segment: Option<&str>, address: Option<&str>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            external_id: None,
            subject: subject.to_string(),
            body: body.to_string(),
            client_name: None,
            client_segment: segment.map(|s| s.to_string()),
            source_channel: None,
            status: "new".to_string(),
            raw_address: address.map(|s| s.to_string()),
            attachments: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_language_kazakh_letters_win() {
        assert_eq!(detect_language("Менің шотымда қате бар"), "KZ");
        // A single Kazakh letter is decisive even in mostly-Russian text.
        assert_eq!(detect_language("не могу войти в қосымша"), "KZ");
    }

    #[test]
    fn test_language_latin_ratio() {
        assert_eq!(detect_language("I cannot log into the application"), "EN");
        // Mixed text below the 0.6 Latin share stays Russian.
        assert_eq!(detect_language("ошибка в app"), "RU");
    }

    #[test]
    fn test_language_empty_defaults_ru() {
        assert_eq!(detect_language(""), "RU");
        assert_eq!(detect_language("12345 !!!"), "RU");
    }

    #[test]
    fn test_type_spam_from_link() {
        let (t, conf) = classify_type("перейди по ссылке http://bit.ly/x", "");
        assert_eq!(t, TYPE_SPAM);
        assert!(conf >= 0.65, "spam confidence {} too low", conf);
    }

    #[test]
    fn test_type_claim_beats_consultation() {
        let (t, _) = classify_type("Требую компенсацию за списание", "претензия");
        assert_eq!(t, TYPE_CLAIM);
    }

    #[test]
    fn test_type_no_keywords_low_confidence() {
        let (t, conf) = classify_type("зелёное небо", "");
        assert_eq!(t, TYPE_CONSULTATION);
        assert!((conf - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_type_confidence_capped() {
        let body = "претензия компенсация возврат ущерб юрист официальное письмо возместить";
        let (t, conf) = classify_type(body, "");
        assert_eq!(t, TYPE_CLAIM);
        assert!((conf - 0.80).abs() < 1e-9);
    }

    #[test]
    fn test_sentiment_negative() {
        let (s, conf) = classify_sentiment("Это ужасно, всё плохо, сплошные проблемы");
        assert_eq!(s, SENTIMENT_NEGATIVE);
        assert!(conf > 0.5 && conf <= 0.75);
    }

    #[test]
    fn test_sentiment_positive() {
        let (s, _) = classify_sentiment("Спасибо, всё отлично!");
        assert_eq!(s, SENTIMENT_POSITIVE);
    }

    #[test]
    fn test_sentiment_neutral_default() {
        let (s, conf) = classify_sentiment("Хочу узнать график работы");
        assert_eq!(s, SENTIMENT_NEUTRAL);
        assert!((conf - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_priority_vip_claim() {
        let (p, conf) = calculate_priority(Some("VIP"), TYPE_CLAIM, SENTIMENT_NEGATIVE);
        assert_eq!(p, 8);
        assert!((conf - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_priority_spam_always_one() {
        let (p, _) = calculate_priority(Some("VIP"), TYPE_SPAM, SENTIMENT_NEGATIVE);
        assert_eq!(p, 1);
    }

    #[test]
    fn test_priority_negative_bump_below_seven() {
        let (p, _) = calculate_priority(None, TYPE_CONSULTATION, SENTIMENT_NEGATIVE);
        assert_eq!(p, 6);
        let (p, _) = calculate_priority(Some("Priority"), TYPE_CONSULTATION, SENTIMENT_NEGATIVE);
        assert_eq!(p, 7); // already at 7, no bump
    }

    #[test]
    fn test_city_third_part() {
        let city = extract_city_from_address(Some("KZ, Алматинская, Алматы, пр. Достык, 5"));
        assert_eq!(city.as_deref(), Some("Алматы"));
    }

    #[test]
    fn test_city_fallback_known_city() {
        let city = extract_city_from_address(Some("Шымкент, ул. Абая"));
        assert_eq!(city.as_deref(), Some("Шымкент"));
        assert_eq!(extract_city_from_address(Some("KZ, где-то")), None);
        assert_eq!(extract_city_from_address(None), None);
    }

    #[test]
    fn test_summary_short_body_untouched() {
        assert_eq!(summarize("Короткий  текст\nс переносом"), "Короткий текст с переносом");
    }

    #[test]
    fn test_summary_truncates_at_word_boundary() {
        let word = "слово ";
        let body = word.repeat(60);
        let summary = summarize(&body);
        assert!(summary.ends_with("..."));
        let chars = summary.chars().count();
        assert!(chars <= 203, "summary too long: {}", chars);
        assert!(!summary.trim_end_matches("...").ends_with("сло"));
    }

    #[test]
    fn test_actions_vip_claim_escalates() {
        let actions = suggest_actions(TYPE_CLAIM, Some("VIP"));
        assert!(actions.iter().any(|a| a.contains("Эскалировать")));
        let actions = suggest_actions(TYPE_CLAIM, None);
        assert!(!actions.iter().any(|a| a.contains("Эскалировать")));
    }

    #[test]
    fn test_classifier_is_pure() {
        let t = ticket(
            "Претензия",
            "Требую компенсацию за несанкционированное списание",
            Some("VIP"),
            Some("KZ, Алматинская, Алматы, пр. Достык, 5"),
        );
        let a = classify_ticket(&t);
        let b = classify_ticket(&t);
        assert_eq!(a, b);
        assert_eq!(a.ticket_type, TYPE_CLAIM);
        assert_eq!(a.priority_1_10, 8);
        assert_eq!(a.sentiment, SENTIMENT_NEUTRAL);
        assert_eq!(a.geo_city.as_deref(), Some("Алматы"));
    }
}
