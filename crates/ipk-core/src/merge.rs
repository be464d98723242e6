//! Merging of localized resource families such as `packsLang.xml_<iso3>`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::descriptor::{DescriptorNode, XmlContent, parse_xml, write_xml};
use crate::error::CompileError;
use crate::resources::{LocalizedPart, TempArtifacts};

/// Element name of a string entry.
pub const STRING_ENTRY: &str = "str";

/// Append the string entries of every later document to the first one.
///
/// Everything else in the first document is kept; only string entries are
/// taken from the others.
pub fn merge_documents(documents: impl IntoIterator<Item = DescriptorNode>) -> Option<DescriptorNode> {
    let mut documents = documents.into_iter();
    let mut base = documents.next()?;
    for doc in documents {
        base.content.extend(
            doc.content
                .into_iter()
                .filter(|c| matches!(c, XmlContent::Element(e) if e.name == STRING_ENTRY)),
        );
    }
    Some(base)
}

/// Produce one finalized file per localized id.
pub fn merge_localized(
    localized: &BTreeMap<String, Vec<LocalizedPart>>,
    temp: &TempArtifacts,
) -> Result<BTreeMap<String, PathBuf>, CompileError> {
    let mut merged = BTreeMap::new();
    for (id, parts) in localized {
        let path = match parts.as_slice() {
            [] => continue,
            [only] => only.path.clone(),
            _ => {
                let mut documents = Vec::with_capacity(parts.len());
                for part in parts {
                    let fail = |message: String| CompileError::ResourceTransform {
                        at: part.at.clone(),
                        id: id.clone(),
                        message: format!("unable to merge: {message}"),
                    };
                    let text = std::fs::read_to_string(&part.path).map_err(|e| fail(e.to_string()))?;
                    documents.push(parse_xml(&text, Some(&part.path)).map_err(|e| fail(e.to_string()))?);
                }
                let Some(doc) = merge_documents(documents) else {
                    continue;
                };
                tracing::debug!(%id, contributions = parts.len(), "merged localized resource");
                temp.persist(id, write_xml(&doc).as_bytes()).map_err(|e| {
                    CompileError::ResourceTransform {
                        at: parts[0].at.clone(),
                        id: id.clone(),
                        message: e.to_string(),
                    }
                })?
            }
        };
        merged.insert(id.clone(), path);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use tempfile::TempDir;

    fn doc(ids: &[&str]) -> DescriptorNode {
        let mut root = DescriptorNode::new("langpack").with_child(DescriptorNode::new("meta"));
        for id in ids {
            root = root.with_child(DescriptorNode::new("str").with_attribute("id", *id));
        }
        root
    }

    #[test]
    fn test_entry_count_is_sum_and_order_preserved() {
        let merged = merge_documents([doc(&["a", "b"]), doc(&["c"]), doc(&["d", "e"])]).unwrap();
        let ids: Vec<_> = merged
            .children_named("str")
            .filter_map(|s| s.attribute("id"))
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        // Only the first document's other content survives.
        assert_eq!(merged.children_named("meta").count(), 1);
    }

    #[test]
    fn test_merge_localized_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        std::fs::write(&a, r#"<langpack><str id="core" txt="Core"/></langpack>"#).unwrap();
        std::fs::write(&b, r#"<langpack><str id="docs" txt="Docs"/></langpack>"#).unwrap();
        let part = |path: &PathBuf| LocalizedPart {
            path: path.clone(),
            at: Location::default(),
        };
        let localized = BTreeMap::from([
            ("packsLang.xml_eng".to_string(), vec![part(&a), part(&b)]),
            ("packsLang.xml_deu".to_string(), vec![part(&a)]),
        ]);
        let temp = TempArtifacts::new().unwrap();
        let merged = merge_localized(&localized, &temp).unwrap();
        assert_eq!(merged["packsLang.xml_deu"], a);
        let text = std::fs::read_to_string(&merged["packsLang.xml_eng"]).unwrap();
        let tree = parse_xml(&text, None).unwrap();
        assert_eq!(tree.children_named("str").count(), 2);
    }

    #[test]
    fn test_unparsable_contribution_fails() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        std::fs::write(&a, "<langpack/>").unwrap();
        std::fs::write(&b, "not xml").unwrap();
        let parts = vec![
            LocalizedPart { path: a, at: Location::default() },
            LocalizedPart { path: b, at: Location::new(None, 9) },
        ];
        let localized = BTreeMap::from([("packsLang.xml".to_string(), parts)]);
        let err = merge_localized(&localized, &TempArtifacts::new().unwrap()).unwrap_err();
        assert!(matches!(err, CompileError::ResourceTransform { ref at, .. } if at.line == Some(9)));
    }
}
