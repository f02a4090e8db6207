//! Group-level rollup of entity forecasts.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::forecast::ForecastResult;
use crate::series::Entity;

/// A group and its member entity ids, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: String,
    pub members: Vec<String>,
}

/// Collect groups from entities (each entity belongs to the group it was
/// first seen in).
pub fn build_groups<'a, I>(entities: I) -> Vec<Group>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for entity in entities {
        let idx = *index.entry(entity.group_id.as_str()).or_insert_with(|| {
            groups.push(Group {
                id: entity.group_id.clone(),
                members: Vec::new(),
            });
            groups.len() - 1
        });
        if !groups[idx].members.contains(&entity.id) {
            groups[idx].members.push(entity.id.clone());
        }
    }
    groups
}

/// Why a member contributed nothing to its group total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    InsufficientHistory,
    ForecastFailed,
    /// No forecast and no recorded failure (e.g. outside the run's selection).
    NotForecast,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExclusionReason::InsufficientHistory => "insufficient history",
            ExclusionReason::ForecastFailed => "forecast failed",
            ExclusionReason::NotForecast => "not forecast",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedMember {
    pub entity_id: String,
    pub reason: ExclusionReason,
}

/// Summed forecast for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRollup {
    pub group_id: String,
    pub horizon: usize,
    pub total: f64,
    /// Members whose forecasts were summed.
    pub contributing: Vec<String>,
    /// Members that contributed zero, with the reason.
    pub excluded: Vec<ExcludedMember>,
}

/// Sum the last `horizon` point estimates of every member of `group` that
/// has a forecast. Members without one contribute zero and are listed in
/// [`GroupRollup::excluded`] with the reason found in `exclusions`.
pub fn rollup(
    forecasts: &[ForecastResult],
    group: &Group,
    horizon: usize,
    exclusions: &HashMap<String, ExclusionReason>,
) -> GroupRollup {
    rollup_indexed(&index_by_entity(forecasts), group, horizon, exclusions)
}

fn index_by_entity(forecasts: &[ForecastResult]) -> HashMap<&str, &ForecastResult> {
    forecasts
        .iter()
        .map(|f| (f.entity.id.as_str(), f))
        .collect()
}

fn rollup_indexed(
    by_entity: &HashMap<&str, &ForecastResult>,
    group: &Group,
    horizon: usize,
    exclusions: &HashMap<String, ExclusionReason>,
) -> GroupRollup {
    let mut total = 0.0;
    let mut contributing = Vec::new();
    let mut excluded = Vec::new();

    for member in &group.members {
        match by_entity.get(member.as_str()) {
            Some(forecast) => {
                total += forecast.tail_total(horizon);
                contributing.push(member.clone());
            }
            None => excluded.push(ExcludedMember {
                entity_id: member.clone(),
                reason: exclusions
                    .get(member)
                    .copied()
                    .unwrap_or(ExclusionReason::NotForecast),
            }),
        }
    }

    GroupRollup {
        group_id: group.id.clone(),
        horizon,
        total,
        contributing,
        excluded,
    }
}

/// [`rollup`] for every group, in group order.
pub fn rollup_all(
    forecasts: &[ForecastResult],
    groups: &[Group],
    horizon: usize,
    exclusions: &HashMap<String, ExclusionReason>,
) -> Vec<GroupRollup> {
    let by_entity = index_by_entity(forecasts);
    groups
        .iter()
        .map(|g| rollup_indexed(&by_entity, g, horizon, exclusions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastPoint;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn entity(id: &str, group: &str) -> Entity {
        Entity {
            id: id.into(),
            name: format!("Item {}", id),
            group_id: group.into(),
        }
    }

    fn forecast(id: &str, group: &str, points: &[f64]) -> ForecastResult {
        ForecastResult {
            entity: entity(id, group),
            model_name: "test".into(),
            points: points
                .iter()
                .map(|&p| ForecastPoint {
                    period: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    point: p,
                    lower: p - 1.0,
                    upper: p + 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_build_groups_preserves_order() {
        let entities = [entity("A", "X"), entity("B", "Y"), entity("C", "X")];
        let groups = build_groups(entities.iter());
        assert_eq!(
            groups,
            vec![
                Group {
                    id: "X".into(),
                    members: vec!["A".into(), "C".into()]
                },
                Group {
                    id: "Y".into(),
                    members: vec!["B".into()]
                },
            ]
        );
    }

    #[test]
    fn test_rollup_sums_only_members() {
        let forecasts = vec![
            forecast("A", "X", &[1.0, 2.0, 3.0]),
            forecast("B", "Y", &[100.0, 100.0, 100.0]),
            forecast("C", "X", &[10.0, 20.0, 30.0]),
        ];
        let group = Group {
            id: "X".into(),
            members: vec!["A".into(), "C".into()],
        };
        let result = rollup(&forecasts, &group, 3, &HashMap::new());
        assert_relative_eq!(result.total, 66.0);
        assert_eq!(result.contributing, vec!["A".to_string(), "C".to_string()]);
        assert!(result.excluded.is_empty());
    }

    #[test]
    fn test_rollup_uses_last_horizon_entries() {
        let forecasts = vec![forecast("A", "X", &[1.0, 2.0, 3.0])];
        let group = Group {
            id: "X".into(),
            members: vec!["A".into()],
        };
        assert_relative_eq!(rollup(&forecasts, &group, 2, &HashMap::new()).total, 5.0);
    }

    #[test]
    fn test_excluded_members_are_noted() {
        let forecasts = vec![forecast("A", "X", &[1.0])];
        let group = Group {
            id: "X".into(),
            members: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        };
        let exclusions = HashMap::from([
            ("B".to_string(), ExclusionReason::InsufficientHistory),
            ("C".to_string(), ExclusionReason::ForecastFailed),
        ]);
        let result = rollup(&forecasts, &group, 1, &exclusions);
        assert_relative_eq!(result.total, 1.0);
        let reasons: Vec<(&str, ExclusionReason)> = result
            .excluded
            .iter()
            .map(|e| (e.entity_id.as_str(), e.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("B", ExclusionReason::InsufficientHistory),
                ("C", ExclusionReason::ForecastFailed),
                ("D", ExclusionReason::NotForecast),
            ]
        );
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let forecasts = vec![forecast("A", "X", &[1.5, 2.5]), forecast("B", "X", &[3.0, 4.0])];
        let groups = build_groups(forecasts.iter().map(|f| &f.entity));
        let first = rollup_all(&forecasts, &groups, 2, &HashMap::new());
        let second = rollup_all(&forecasts, &groups, 2, &HashMap::new());
        assert_eq!(first, second);
        assert_relative_eq!(first[0].total, 11.0);
    }
}
