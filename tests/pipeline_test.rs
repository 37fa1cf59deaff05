//! End-to-end checks over the pure parts of the enrichment and
//! routing pipeline: classifier → merge → geo → skill → load →
//! rotation index. Database-backed stages are covered by their own
//! unit tests; these scenarios chain the stages the way the
//! enrichment service does.

use chrono::Utc;
use uuid::Uuid;

use triageserver::classifier::{classify_ticket, TYPE_CLAIM, TYPE_DATA_CHANGE, TYPE_SPAM};
use triageserver::enrichment::llm::{parse_verdict, LlmVerdict};
use triageserver::enrichment::merge_results;
use triageserver::geo::resolve_city;
use triageserver::routing::round_robin::next_index;
use triageserver::routing::{choose_office, filter_skills, pick_finalists};
use triageserver::shared::models::{BusinessUnit, Manager, Ticket};

fn ticket(subject: &str, body: &str, segment: Option<&str>, address: Option<&str>) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        external_id: None,
        subject: subject.to_string(),
        body: body.to_string(),
        client_name: None,
        client_segment: segment.map(String::from),
        source_channel: Some("email".to_string()),
        status: "new".to_string(),
        raw_address: address.map(String::from),
        attachments: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn office(city: &str, lat: f64, lon: f64) -> BusinessUnit {
    BusinessUnit {
        id: Uuid::new_v4(),
        name: format!("Офис {}", city),
        city: city.to_string(),
        address: None,
        lat: Some(lat),
        lon: Some(lon),
        created_at: Utc::now(),
    }
}

fn manager(name: &str, vip: bool, chief: bool, languages: &[&str], load: i32) -> Manager {
    Manager {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: None,
        business_unit_id: Uuid::new_v4(),
        is_vip_skill: vip,
        is_chief_spec: chief,
        languages: languages.iter().map(|l| l.to_string()).collect(),
        max_load: 50,
        current_load: load,
        is_active: true,
        created_at: Utc::now(),
    }
}

#[test]
fn vip_claim_routes_to_nearest_office_vip_pool() {
    let t = ticket(
        "Претензия",
        "Требую компенсацию за списание",
        Some("VIP"),
        Some("KZ, Алматинская, Алматы, пр. Достык, 5"),
    );

    let baseline = classify_ticket(&t);
    assert_eq!(baseline.ticket_type, TYPE_CLAIM);
    assert_eq!(baseline.priority_1_10, 8);
    assert_eq!(baseline.geo_city.as_deref(), Some("Алматы"));

    let (lat, lon, geo_status) = resolve_city(baseline.geo_city.as_deref().unwrap());
    assert_eq!(geo_status, "known");
    assert_eq!(lat, Some(43.2220));

    let offices = vec![
        office("Астана", 51.1694, 71.4491),
        office("Алматы", 43.2220, 76.8512),
    ];
    let geo = choose_office(t.id, lat, lon, geo_status, &offices).unwrap();
    assert_eq!(geo.city, "Алматы");
    assert_eq!(geo.method, "nearest");

    let pool = vec![
        manager("Асет", true, false, &["RU"], 3),
        manager("Болат", true, false, &["RU"], 1),
        manager("Гаухар", false, false, &["RU"], 0),
    ];
    let skill = filter_skills(
        pool,
        t.client_segment.as_deref(),
        Some(baseline.ticket_type.as_str()),
        &baseline.lang,
    );
    assert_eq!(skill.skill_group, "vip");
    assert_eq!(skill.candidates.len(), 2);

    let load = pick_finalists(&skill.candidates);
    assert_eq!(load.finalists.len(), 2);
    assert_eq!(load.finalists[0].full_name, "Болат");

    // First assignment in a fresh bucket takes index 0.
    assert_eq!(next_index(-1, load.finalists.len()), 0);
}

#[test]
fn spam_survives_a_disagreeing_overlay() {
    let t = ticket("", "Только сегодня! http://bit.ly/x перейди и выиграй", None, None);

    let baseline = classify_ticket(&t);
    assert_eq!(baseline.ticket_type, TYPE_SPAM);
    assert!(baseline.confidence_type >= 0.65);
    assert_eq!(baseline.priority_1_10, 1);

    // The model misreads the promo text as a consultation.
    let overlay = LlmVerdict {
        ticket_type: "Консультация".to_string(),
        sentiment: "Нейтральный".to_string(),
        priority_1_10: 5,
        lang: "RU".to_string(),
        summary: "Клиент делится ссылкой".to_string(),
        recommended_actions: vec![],
        geo_city: None,
        confidence_type: 0.7,
        confidence_sentiment: 0.6,
        confidence_priority: 0.6,
    };

    let merged = merge_results(&baseline, &overlay);
    assert_eq!(merged.ticket_type, TYPE_SPAM);
    assert_eq!(merged.priority_1_10, 1);
}

#[test]
fn kazakh_data_change_keeps_pool_when_no_chief_spec() {
    let t = ticket(
        "Деректерді өзгерту",
        "Менің мекенжайымды өзгертуді сұраймын, қалаға көштім",
        None,
        None,
    );

    let baseline = classify_ticket(&t);
    assert_eq!(baseline.lang, "KZ");

    // Skill filter driven by the merged type label.
    let pool = vec![
        manager("Айгүль", false, false, &["RU", "KZ"], 2),
        manager("Дамир", false, false, &["RU"], 1),
    ];
    let skill = filter_skills(pool, None, Some(TYPE_DATA_CHANGE), &baseline.lang);
    // No chief specialist: rule skipped. KZ rule then keeps Айгүль.
    assert_eq!(skill.candidates.len(), 1);
    assert_eq!(skill.candidates[0].full_name, "Айгүль");
    assert_eq!(skill.skill_group, "lang_KZ");

    let load = pick_finalists(&skill.candidates);
    assert_eq!(load.finalists.len(), 1);
    // Single finalist: the pointer is never consulted.
}

#[test]
fn unparseable_overlay_leaves_baseline_standing() {
    let t = ticket("Вопрос", "Подскажите, как открыть счёт?", None, None);
    let baseline = classify_ticket(&t);

    // 503 body, refusal text, truncated JSON: all count as failure.
    assert!(parse_verdict("Service Unavailable").is_err());
    assert!(parse_verdict("{\"type\": \"Консультация\"").is_err());

    // The pipeline then routes with the baseline untouched.
    assert_eq!(baseline.ticket_type, "Консультация");
    assert!(baseline.priority_1_10 >= 1 && baseline.priority_1_10 <= 10);
}

#[test]
fn rotation_covers_every_finalist_before_repeating() {
    let finalists = 2;
    let mut last = -1;
    let mut picks = Vec::new();
    for _ in 0..6 {
        let next = next_index(last, finalists);
        picks.push(next);
        last = next as i32;
    }
    assert_eq!(picks, vec![0, 1, 0, 1, 0, 1]);
}
