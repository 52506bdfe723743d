//! Merge Operator: fold several guides of one list into the first of them.

use crate::model::Guide;
use std::collections::HashSet;

/// Bracketed stand-in for a merged guide without a title.
pub const UNTITLED: &str = "Untitled";

/// Result of planning a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// The primary guide carrying the combined fields.
    pub merged: Guide,
    /// Ids to delete once the primary is saved, in list order.
    pub removed: Vec<String>,
}

/// Build the merge of `selected`, given in list order.
///
/// Returns `None` for fewer than two guides or guides from different lists.
pub fn plan(selected: &[Guide], now_ms: u64) -> Option<MergePlan> {
    let (primary, rest) = selected.split_first()?;
    if rest.is_empty() {
        return None;
    }
    if rest
        .iter()
        .any(|g| g.scope != primary.scope || g.conversation_id != primary.conversation_id)
    {
        return None;
    }

    let mut title = primary.title.clone();
    for guide in rest {
        let part = if guide.title.is_empty() {
            UNTITLED
        } else {
            guide.title.as_str()
        };
        title.push_str(&format!(" [{}]", part));
    }

    let content = selected
        .iter()
        .map(|g| g.content.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut seen = HashSet::new();
    let files = selected
        .iter()
        .flat_map(|g| g.files.iter())
        .filter(|f| seen.insert(f.id.clone()))
        .cloned()
        .collect();

    let merged = Guide {
        title,
        content,
        files,
        updated_at: now_ms.max(primary.updated_at + 1),
        ..primary.clone()
    };

    Some(MergePlan {
        merged,
        removed: rest.iter().map(|g| g.id.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GuideFile, Scope};

    fn file(id: &str) -> GuideFile {
        GuideFile {
            id: id.into(),
            file_name: format!("{}.txt", id),
            ..Default::default()
        }
    }

    fn guide(id: &str, title: &str, content: &str, files: Vec<GuideFile>) -> Guide {
        Guide {
            id: id.into(),
            scope: Scope::Global,
            conversation_id: None,
            title: title.into(),
            content: content.into(),
            files,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_merge_two_guides() {
        let a = guide("a", "A", "c1", vec![file("f1")]);
        let b = guide("b", "B", "c2", vec![file("f1"), file("f2")]);

        let plan = plan(&[a, b], 100).unwrap();
        assert_eq!(plan.merged.id, "a");
        assert_eq!(plan.merged.title, "A [B]");
        assert_eq!(plan.merged.content, "c1\n\nc2");
        let ids: Vec<&str> = plan.merged.files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
        assert_eq!(plan.removed, vec!["b".to_string()]);
        assert_eq!(plan.merged.updated_at, 100);
    }

    #[test]
    fn test_merge_skips_empty_content_and_names_untitled() {
        let a = guide("a", "A", "", vec![]);
        let b = guide("b", "", "only", vec![]);
        let c = guide("c", "C", "", vec![]);

        let plan = plan(&[a, b, c], 5).unwrap();
        assert_eq!(plan.merged.title, "A [Untitled] [C]");
        assert_eq!(plan.merged.content, "only");
        assert_eq!(plan.removed, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_merge_keeps_whitespace_verbatim() {
        let a = guide("a", " A ", "c1", vec![]);
        let b = guide("b", " ", "  ", vec![]);
        let c = guide("c", "C", "c3", vec![]);

        let plan = plan(&[a, b, c], 5).unwrap();
        assert_eq!(plan.merged.title, " A  [ ] [C]");
        assert_eq!(plan.merged.content, "c1\n\n  \n\nc3");
    }

    #[test]
    fn test_merge_untitled_primary_is_not_trimmed() {
        let a = guide("a", "", "x", vec![]);
        let b = guide("b", "B", "y", vec![]);

        let plan = plan(&[a, b], 5).unwrap();
        assert_eq!(plan.merged.title, " [B]");
    }

    #[test]
    fn test_merge_requires_two_guides_of_one_list() {
        let a = guide("a", "A", "x", vec![]);
        assert!(plan(&[], 1).is_none());
        assert!(plan(std::slice::from_ref(&a), 1).is_none());

        let mut other = guide("b", "B", "y", vec![]);
        other.scope = Scope::Conversation;
        other.conversation_id = Some("c1".into());
        assert!(plan(&[a, other], 1).is_none());
    }
}
