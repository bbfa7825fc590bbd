//! Policy Engine — evaluates a `Policy` over a list of candidate records
//! (§4.3). Candidates are JSON objects; this keeps the engine agnostic to
//! whatever domain data a recipe author puts in `vars`.

use crate::recipe::{Condition, ConditionOp, PickStrategy, Policy};
use serde_json::Value;

/// Returns the index into `candidates` of the winning record, or `None` if
/// no candidate survives the hard filter.
pub fn evaluate(candidates: &[Value], policy: &Policy) -> Option<usize> {
    let filtered: Vec<usize> = (0..candidates.len())
        .filter(|&i| policy.hard.iter().all(|c| eval_condition(&candidates[i], c)))
        .collect();

    if filtered.is_empty() {
        return None;
    }

    if policy.pick == PickStrategy::First {
        return Some(filtered[0]);
    }

    let scores: Vec<(usize, f64)> = filtered
        .iter()
        .map(|&i| (i, score(&candidates[i], policy)))
        .collect();

    let best_score = match policy.pick {
        PickStrategy::Argmax => scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max),
        PickStrategy::Argmin => scores.iter().map(|(_, s)| *s).fold(f64::MAX, f64::min),
        PickStrategy::First => unreachable!("handled above"),
    };

    let mut tied: Vec<usize> = scores
        .into_iter()
        .filter(|(_, s)| (*s - best_score).abs() < f64::EPSILON)
        .map(|(i, _)| i)
        .collect();

    for field_spec in &policy.tie_break {
        if tied.len() <= 1 {
            break;
        }
        tied = narrow_by_tie_break(candidates, &tied, field_spec);
    }

    tied.into_iter().next()
}

fn score(candidate: &Value, policy: &Policy) -> f64 {
    policy
        .score
        .iter()
        .filter(|rule| eval_condition(candidate, &rule.when))
        .map(|rule| rule.add)
        .sum()
}

fn eval_condition(candidate: &Value, cond: &Condition) -> bool {
    let field_value = candidate.get(&cond.field);
    match cond.op {
        ConditionOp::Eq => field_value.map(|v| v == &cond.value).unwrap_or(false),
        ConditionOp::Ne => field_value.map(|v| v != &cond.value).unwrap_or(true),
        ConditionOp::Lt => numeric_cmp(field_value, &cond.value).is_some_and(|o| o.is_lt()),
        ConditionOp::Le => numeric_cmp(field_value, &cond.value).is_some_and(|o| o.is_le()),
        ConditionOp::Gt => numeric_cmp(field_value, &cond.value).is_some_and(|o| o.is_gt()),
        ConditionOp::Ge => numeric_cmp(field_value, &cond.value).is_some_and(|o| o.is_ge()),
        ConditionOp::In => cond
            .value
            .as_array()
            .map(|list| field_value.is_some_and(|fv| list.contains(fv)))
            .unwrap_or(false),
        ConditionOp::NotIn => cond
            .value
            .as_array()
            .map(|list| !field_value.is_some_and(|fv| list.contains(fv)))
            .unwrap_or(true),
        ConditionOp::Contains => {
            let (Some(hay), Some(needle)) = (
                field_value.and_then(Value::as_str),
                cond.value.as_str(),
            ) else {
                return false;
            };
            hay.contains(needle)
        }
    }
}

fn numeric_cmp(a: Option<&Value>, b: &Value) -> Option<std::cmp::Ordering> {
    let a = as_f64(a?)?;
    let b = as_f64(b)?;
    a.partial_cmp(&b)
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Parses a `tie_break` entry's `_asc`/`_desc` suffix (default `_asc`) and
/// narrows `tied` to the candidates sharing the best value on that field.
fn narrow_by_tie_break(candidates: &[Value], tied: &[usize], field_spec: &str) -> Vec<usize> {
    let (field, descending) = if let Some(f) = field_spec.strip_suffix("_desc") {
        (f, true)
    } else if let Some(f) = field_spec.strip_suffix("_asc") {
        (f, false)
    } else {
        (field_spec, false)
    };

    let values: Vec<(usize, &Value)> = tied
        .iter()
        .filter_map(|&i| candidates[i].get(field).map(|v| (i, v)))
        .collect();

    if values.is_empty() {
        return tied.to_vec();
    }

    let extreme = if descending {
        values.iter().map(|(_, v)| *v).max_by(|a, b| compare_values(a, b))
    } else {
        values.iter().map(|(_, v)| *v).min_by(|a, b| compare_values(a, b))
    }
    .expect("values is non-empty");

    values
        .into_iter()
        .filter(|(_, v)| compare_values(v, extreme) == std::cmp::Ordering::Equal)
        .map(|(i, _)| i)
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (as_f64(a), as_f64(b)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a
            .as_str()
            .unwrap_or_default()
            .cmp(b.as_str().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{PickStrategy, ScoreRule};
    use serde_json::json;

    fn policy(hard: Vec<Condition>, score: Vec<ScoreRule>, tie_break: Vec<&str>, pick: PickStrategy) -> Policy {
        Policy {
            hard,
            score,
            tie_break: tie_break.into_iter().map(String::from).collect(),
            pick,
        }
    }

    #[test]
    fn empty_candidates_is_none() {
        let p = policy(vec![], vec![], vec![], PickStrategy::First);
        assert_eq!(evaluate(&[], &p), None);
    }

    #[test]
    fn no_hard_rules_pick_first_returns_first_input() {
        let candidates = vec![json!({"id": "A"}), json!({"id": "B"})];
        let p = policy(vec![], vec![], vec![], PickStrategy::First);
        assert_eq!(evaluate(&candidates, &p), Some(0));
    }

    #[test]
    fn scenario_3_policy_ranking() {
        let candidates = vec![
            json!({"id": "A", "available": true, "zone": "back", "price": 50}),
            json!({"id": "B", "available": true, "zone": "front", "price": 80}),
            json!({"id": "C", "available": true, "zone": "front", "price": 60}),
        ];
        let p = policy(
            vec![Condition {
                field: "available".into(),
                op: ConditionOp::Eq,
                value: json!(true),
            }],
            vec![ScoreRule {
                when: Condition {
                    field: "zone".into(),
                    op: ConditionOp::Eq,
                    value: json!("front"),
                },
                add: 30.0,
            }],
            vec!["price_asc"],
            PickStrategy::Argmax,
        );
        let winner = evaluate(&candidates, &p).map(|i| candidates[i]["id"].as_str().unwrap());
        assert_eq!(winner, Some("C"));
    }

    #[test]
    fn hard_filter_excludes_all_returns_none() {
        let candidates = vec![json!({"available": false})];
        let p = policy(
            vec![Condition {
                field: "available".into(),
                op: ConditionOp::Eq,
                value: json!(true),
            }],
            vec![],
            vec![],
            PickStrategy::Argmax,
        );
        assert_eq!(evaluate(&candidates, &p), None);
    }

    #[test]
    fn contains_and_in_operators() {
        let candidates = vec![json!({"tag": "red-shoe"}), json!({"tag": "blue-hat"})];
        let p = policy(
            vec![Condition {
                field: "tag".into(),
                op: ConditionOp::Contains,
                value: json!("shoe"),
            }],
            vec![],
            vec![],
            PickStrategy::First,
        );
        assert_eq!(evaluate(&candidates, &p), Some(0));

        let p2 = policy(
            vec![Condition {
                field: "tag".into(),
                op: ConditionOp::In,
                value: json!(["blue-hat", "green-cap"]),
            }],
            vec![],
            vec![],
            PickStrategy::First,
        );
        assert_eq!(evaluate(&candidates, &p2), Some(1));
    }
}
