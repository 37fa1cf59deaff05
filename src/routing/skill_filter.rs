use serde::Serialize;

use crate::shared::models::{Manager, SEGMENT_PRIORITY, SEGMENT_VIP};

pub const SKILL_GROUP_GENERAL: &str = "general";
pub const SKILL_GROUP_VIP: &str = "vip";
pub const SKILL_GROUP_CHIEF_SPEC: &str = "chief_spec";

#[derive(Debug, Clone, Serialize)]
pub struct SkillDecision {
    pub candidates: Vec<Manager>,
    pub skill_group: String,
    pub decision: String,
}

/// Narrow the candidate pool by segment, ticket type and language.
/// A rule that would leave nobody is skipped: the previous pool and
/// skill group stand.
pub fn filter_skills(
    managers: Vec<Manager>,
    segment: Option<&str>,
    ticket_type: Option<&str>,
    lang: &str,
) -> SkillDecision {
    let mut candidates = managers;
    let mut skill_group = SKILL_GROUP_GENERAL.to_string();
    let mut decisions: Vec<String> = Vec::new();

    if matches!(segment, Some(SEGMENT_VIP) | Some(SEGMENT_PRIORITY)) {
        let segment = segment.unwrap_or_default();
        let filtered: Vec<Manager> = candidates
            .iter()
            .filter(|m| m.is_vip_skill)
            .cloned()
            .collect();
        if !filtered.is_empty() {
            decisions.push(format!(
                "Segment '{}' → filtered to {} VIP-skill managers",
                segment,
                filtered.len()
            ));
            candidates = filtered;
            skill_group = SKILL_GROUP_VIP.to_string();
        } else {
            decisions.push(format!(
                "Segment '{}' → no VIP managers found, keeping all {}",
                segment,
                candidates.len()
            ));
        }
    }

    if matches!(ticket_type, Some("Смена данных") | Some("Change Data")) {
        let ticket_type = ticket_type.unwrap_or_default();
        let filtered: Vec<Manager> = candidates
            .iter()
            .filter(|m| m.is_chief_spec)
            .cloned()
            .collect();
        if !filtered.is_empty() {
            decisions.push(format!(
                "Type '{}' → filtered to {} Chief Specialists",
                ticket_type,
                filtered.len()
            ));
            candidates = filtered;
            skill_group = SKILL_GROUP_CHIEF_SPEC.to_string();
        } else {
            decisions.push(format!(
                "Type '{}' → no Chief Spec found, keeping current {} candidates",
                ticket_type,
                candidates.len()
            ));
        }
    }

    if lang == "KZ" || lang == "EN" {
        let filtered: Vec<Manager> = candidates
            .iter()
            .filter(|m| m.languages.iter().any(|l| l == lang))
            .cloned()
            .collect();
        if !filtered.is_empty() {
            decisions.push(format!(
                "Language '{}' → filtered to {} managers with that skill",
                lang,
                filtered.len()
            ));
            candidates = filtered;
            skill_group = format!("lang_{}", lang);
        } else {
            decisions.push(format!(
                "Language '{}' → no matching managers, keeping current {} candidates",
                lang,
                candidates.len()
            ));
        }
    }

    let decision = if decisions.is_empty() {
        format!("Pool: {} managers (no skill filters applied)", candidates.len())
    } else {
        decisions.join("; ")
    };

    SkillDecision {
        candidates,
        skill_group,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

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
    fn test_vip_segment_keeps_vip_managers() {
        let pool = vec![
            manager("A", true, false, &["RU"], 0),
            manager("B", false, false, &["RU"], 0),
        ];
        let result = filter_skills(pool, Some("VIP"), None, "RU");
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].full_name, "A");
        assert_eq!(result.skill_group, SKILL_GROUP_VIP);
    }

    #[test]
    fn test_empty_rule_is_skipped() {
        let pool = vec![
            manager("A", false, false, &["RU"], 0),
            manager("B", false, false, &["RU"], 0),
        ];
        let result = filter_skills(pool, Some("VIP"), None, "RU");
        // Nobody has the VIP skill: pool and group unchanged.
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.skill_group, SKILL_GROUP_GENERAL);
        assert!(result.decision.contains("no VIP managers found"));
    }

    #[test]
    fn test_data_change_keeps_chief_specialists() {
        let pool = vec![
            manager("A", false, true, &["RU"], 0),
            manager("B", false, false, &["RU"], 0),
        ];
        let result = filter_skills(pool, None, Some("Смена данных"), "RU");
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.skill_group, SKILL_GROUP_CHIEF_SPEC);

        // The English label is the only other accepted spelling.
        let pool = vec![manager("A", false, true, &["RU"], 0)];
        let result = filter_skills(pool, None, Some("Change Data"), "RU");
        assert_eq!(result.skill_group, SKILL_GROUP_CHIEF_SPEC);

        let pool = vec![manager("A", false, true, &["RU"], 0)];
        let result = filter_skills(pool, None, Some("смена данных"), "RU");
        assert_eq!(result.skill_group, SKILL_GROUP_GENERAL);
    }

    #[test]
    fn test_language_filter() {
        let pool = vec![
            manager("A", false, false, &["RU", "KZ"], 0),
            manager("B", false, false, &["RU"], 0),
        ];
        let result = filter_skills(pool, None, None, "KZ");
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.skill_group, "lang_KZ");
    }

    #[test]
    fn test_rules_compose_in_order() {
        let pool = vec![
            manager("A", true, true, &["RU", "EN"], 0),
            manager("B", true, false, &["RU", "EN"], 0),
            manager("C", false, true, &["RU"], 0),
        ];
        let result = filter_skills(pool, Some("Priority"), Some("Смена данных"), "EN");
        // VIP keeps A,B; chief-spec keeps A; language EN keeps A.
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].full_name, "A");
        assert_eq!(result.skill_group, "lang_EN");
    }

    #[test]
    fn test_russian_language_applies_no_filter() {
        let pool = vec![manager("A", false, false, &["RU"], 0)];
        let result = filter_skills(pool, None, None, "RU");
        assert_eq!(result.skill_group, SKILL_GROUP_GENERAL);
        assert!(result.decision.contains("no skill filters applied"));
    }
}
