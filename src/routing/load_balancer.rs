use serde::Serialize;

use crate::shared::models::Manager;

#[derive(Debug, Clone, Serialize)]
pub struct LoadDecision {
    pub finalists: Vec<Manager>,
    pub decision: String,
}

/// Stable-sort by current load and keep the two least-loaded managers
/// (one, when the pool is that small).
pub fn pick_finalists(candidates: &[Manager]) -> LoadDecision {
    if candidates.is_empty() {
        return LoadDecision {
            finalists: Vec::new(),
            decision: "No candidates available".to_string(),
        };
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|m| m.current_load);

    let count = sorted.len().min(2);
    let finalists: Vec<Manager> = sorted.into_iter().take(count).collect();

    let mut decision = format!(
        "Selected {} from {} candidates by lowest load:",
        count,
        candidates.len()
    );
    for (i, m) in finalists.iter().enumerate() {
        if i > 0 {
            decision.push(',');
        }
        decision.push_str(&format!(" {} (load: {})", m.full_name, m.current_load));
    }

    LoadDecision { finalists, decision }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn manager(name: &str, load: i32) -> Manager {
        Manager {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: None,
            business_unit_id: Uuid::new_v4(),
            is_vip_skill: false,
            is_chief_spec: false,
            languages: vec!["RU".to_string()],
            max_load: 50,
            current_load: load,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_two_lowest_load_win() {
        let pool = vec![manager("A", 5), manager("B", 1), manager("C", 3)];
        let result = pick_finalists(&pool);
        assert_eq!(result.finalists.len(), 2);
        assert_eq!(result.finalists[0].full_name, "B");
        assert_eq!(result.finalists[1].full_name, "C");
    }

    #[test]
    fn test_single_candidate() {
        let pool = vec![manager("A", 9)];
        let result = pick_finalists(&pool);
        assert_eq!(result.finalists.len(), 1);
    }

    #[test]
    fn test_empty_pool() {
        let result = pick_finalists(&[]);
        assert!(result.finalists.is_empty());
        assert_eq!(result.decision, "No candidates available");
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let pool = vec![manager("A", 2), manager("B", 2), manager("C", 2)];
        let result = pick_finalists(&pool);
        assert_eq!(result.finalists[0].full_name, "A");
        assert_eq!(result.finalists[1].full_name, "B");
    }
}
