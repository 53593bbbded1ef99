use serde_json::Value;
use std::collections::HashMap;

use atlas_core::types::{GroupSummary, SearchResultItem};

/// Groups result items by a discriminator field and ranks the groups by
/// their closest member.
#[derive(Debug, Clone)]
pub struct NeighborGroupAggregator {
    discriminator: Option<String>,
    unknown_label: String,
}

impl NeighborGroupAggregator {
    pub fn new(discriminator: Option<String>, unknown_label: impl Into<String>) -> Self {
        Self { discriminator, unknown_label: unknown_label.into() }
    }

    fn key_of(&self, item: &SearchResultItem) -> Option<String> {
        if let Some(k) = item.group_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Some(k.to_string());
        }
        let value = item.fields.get(self.discriminator.as_deref()?)?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Groups ordered by ascending representative distance, groups without
    /// any finite distance last, ties broken by label.
    pub fn aggregate(&self, items: &[SearchResultItem]) -> Vec<GroupSummary> {
        let mut groups: Vec<GroupSummary> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in items {
            let key = self.key_of(item).unwrap_or_else(|| self.unknown_label.clone());
            let distance = item.distance.filter(|d| d.is_finite()).unwrap_or(f64::INFINITY);
            match index.get(&key) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.items.push(item.clone());
                    group.count += 1;
                    if distance < group.distance {
                        group.distance = distance;
                        group.representative = item.clone();
                    }
                }
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(GroupSummary {
                        label: key.clone(),
                        key,
                        representative: item.clone(),
                        items: vec![item.clone()],
                        count: 1,
                        distance,
                    });
                }
            }
        }
        groups.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.label.cmp(&b.label)));
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::types::RowId;
    use serde_json::json;

    fn item(id: i64, condition: Value, distance: Option<f64>) -> SearchResultItem {
        let mut item = SearchResultItem::new(RowId::Int(id));
        item.fields.insert("condition".to_string(), condition);
        item.distance = distance;
        item
    }

    #[test]
    fn orders_by_closest_member_then_label() {
        let agg = NeighborGroupAggregator::new(Some("condition".to_string()), "unknown");
        let items = vec![
            item(1, json!("acne"), Some(0.5)),
            item(2, json!(" eczema "), Some(0.3)),
            item(3, json!("acne"), Some(0.2)),
            item(4, json!(null), None),
            item(5, json!("psoriasis"), Some(0.2)),
            item(6, json!(""), Some(0.9)),
        ];
        let groups = agg.aggregate(&items);
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["acne", "psoriasis", "eczema", "unknown"]);
        assert_eq!(groups[0].representative.id, RowId::Int(3));
        assert_eq!(groups[0].count, 2);
        let unknown = &groups[3];
        assert_eq!(unknown.count, 2);
        assert_eq!(unknown.distance, 0.9);
        assert_eq!(unknown.representative.id, RowId::Int(6));
    }

    #[test]
    fn ties_keep_first_representative_and_unscored_groups_sort_last() {
        let agg = NeighborGroupAggregator::new(Some("condition".to_string()), "n/a");
        let items = vec![item(1, json!(7), Some(0.4)), item(2, json!(7), Some(0.4)), item(3, json!(true), None)];
        let groups = agg.aggregate(&items);
        assert_eq!(groups[0].key, "7");
        assert_eq!(groups[0].representative.id, RowId::Int(1));
        assert_eq!(groups[1].key, "true");
        assert!(groups[1].distance.is_infinite());
    }

    #[test]
    fn explicit_group_key_wins() {
        let agg = NeighborGroupAggregator::new(None, "unknown");
        let mut a = item(1, json!("acne"), Some(0.1));
        a.group_key = Some("cluster-2".to_string());
        let b = item(2, json!("acne"), Some(0.2));
        let groups = agg.aggregate(&[a, b]);
        assert_eq!(groups.iter().map(|g| g.key.as_str()).collect::<Vec<_>>(), vec!["cluster-2", "unknown"]);
    }
}
