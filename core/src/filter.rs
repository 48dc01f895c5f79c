//! Structured field filters evaluated against flattened data nodes.

use crate::model::{DataNode, FilterCondition, ParsedDocument, SearchFilter};

fn numeric(node: &DataNode) -> Option<f64> {
    match &node.value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Evaluates one filter against one node. The caller is responsible for
/// pairing the filter with a node whose key equals `filter.field`.
///
/// Numeric conditions fail (rather than error) on non-numeric operands.
pub fn evaluate(filter: &SearchFilter, node: &DataNode) -> bool {
    use FilterCondition::*;

    match filter.condition {
        IsNull => return node.is_null(),
        IsNotNull => return !node.is_null(),
        GreaterThan | GreaterThanOrEqualTo | LessThan | LessThanOrEqualTo => {
            let rhs = filter.value.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
            let (Some(lhs), Some(rhs)) = (numeric(node), rhs) else { return false };
            return match filter.condition {
                GreaterThan => lhs > rhs,
                GreaterThanOrEqualTo => lhs >= rhs,
                LessThan => lhs < rhs,
                _ => lhs <= rhs,
            };
        }
        _ => {}
    }

    match (filter.value.as_deref(), node.text()) {
        // Null against null matches the positive conditions.
        (None, None) => matches!(filter.condition, Equals | Contains | StartsWith | EndsWith),
        (Some(expected), Some(actual)) => match filter.condition {
            Equals => actual == expected,
            NotEquals => actual != expected,
            Contains => actual.contains(expected),
            ContainsNot => !actual.contains(expected),
            StartsWith => actual.starts_with(expected),
            EndsWith => actual.ends_with(expected),
            _ => false,
        },
        // Exactly one side is null.
        _ => matches!(filter.condition, NotEquals | ContainsNot),
    }
}

/// True if any node carrying the filter's field satisfies it. A document
/// without the field never matches.
pub fn matches_document(filter: &SearchFilter, document: &ParsedDocument) -> bool {
    document.nodes_for(&filter.field).any(|node| evaluate(filter, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, DocumentType};
    use serde_json::json;

    fn f(condition: FilterCondition, value: Option<&str>) -> SearchFilter {
        SearchFilter::new("k", condition, value)
    }

    fn node(value: serde_json::Value) -> DataNode {
        DataNode::new("k", value)
    }

    #[test]
    fn string_conditions() {
        let n = node(json!("Hello World"));
        assert!(evaluate(&f(FilterCondition::Equals, Some("Hello World")), &n));
        assert!(!evaluate(&f(FilterCondition::Equals, Some("hello world")), &n));
        assert!(evaluate(&f(FilterCondition::NotEquals, Some("x")), &n));
        assert!(evaluate(&f(FilterCondition::Contains, Some("lo Wo")), &n));
        assert!(evaluate(&f(FilterCondition::ContainsNot, Some("xyz")), &n));
        assert!(!evaluate(&f(FilterCondition::ContainsNot, Some("World")), &n));
        assert!(evaluate(&f(FilterCondition::StartsWith, Some("Hell")), &n));
        assert!(evaluate(&f(FilterCondition::EndsWith, Some("rld")), &n));
        assert!(!evaluate(&f(FilterCondition::EndsWith, Some("RLD")), &n));
    }

    #[test]
    fn numeric_conditions() {
        let n = node(json!(42));
        assert_eq!(n.data_type, DataType::Number);
        assert!(evaluate(&f(FilterCondition::GreaterThan, Some("10")), &n));
        assert!(!evaluate(&f(FilterCondition::LessThan, Some("10")), &n));
        assert!(evaluate(&f(FilterCondition::GreaterThanOrEqualTo, Some("42")), &n));
        assert!(evaluate(&f(FilterCondition::LessThanOrEqualTo, Some("42.0")), &n));
        assert!(evaluate(&f(FilterCondition::GreaterThan, Some("3.5")), &node(json!("7"))));
    }

    #[test]
    fn non_numeric_operands_fail() {
        assert!(!evaluate(&f(FilterCondition::GreaterThan, Some("ten")), &node(json!(42))));
        assert!(!evaluate(&f(FilterCondition::LessThan, Some("10")), &node(json!("abc"))));
        assert!(!evaluate(&f(FilterCondition::LessThan, None), &node(json!(1))));
    }

    #[test]
    fn null_semantics() {
        let n = node(serde_json::Value::Null);
        assert!(evaluate(&f(FilterCondition::IsNull, None), &n));
        assert!(!evaluate(&f(FilterCondition::IsNotNull, None), &n));
        assert!(evaluate(&f(FilterCondition::Equals, None), &n));
        assert!(evaluate(&f(FilterCondition::Contains, None), &n));
        assert!(evaluate(&f(FilterCondition::StartsWith, None), &n));
        assert!(evaluate(&f(FilterCondition::EndsWith, None), &n));
        assert!(!evaluate(&f(FilterCondition::NotEquals, None), &n));
        assert!(!evaluate(&f(FilterCondition::ContainsNot, None), &n));

        assert!(!evaluate(&f(FilterCondition::Equals, Some("x")), &n));
        assert!(evaluate(&f(FilterCondition::NotEquals, Some("x")), &n));
        assert!(!evaluate(&f(FilterCondition::Equals, None), &node(json!("x"))));
    }

    #[test]
    fn document_level_matching() {
        let mut doc = ParsedDocument::new("d", DocumentType::Json);
        doc.nodes = Some(vec![DataNode::new("tags", json!("red")), DataNode::new("tags", json!("blue"))]);
        assert!(matches_document(&SearchFilter::new("tags", FilterCondition::Equals, Some("blue")), &doc));
        assert!(!matches_document(&SearchFilter::new("tags", FilterCondition::Equals, Some("green")), &doc));
        assert!(!matches_document(&SearchFilter::new("size", FilterCondition::IsNull, None), &doc));
    }
}
