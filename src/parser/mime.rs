//! Body-structure flattening: assigns an IMAP section address to every node.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::part::{MajorType, RawPart};

/// Dotted section address (`"2.1.3"`), stored as numbers so that ordering
/// follows depth-first traversal (`1 < 1.1 < 1.2 < 2 < 10`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionPath(Vec<u32>);

impl SectionPath {
    pub fn root(index: u32) -> Self {
        Self(vec![index])
    }

    pub fn child(&self, index: u32) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{n}")?;
        }
        Ok(())
    }
}

impl FromStr for SectionPath {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// A body-structure node paired with its section address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatPart<'a> {
    pub section: &'a SectionPath,
    pub part: &'a RawPart,
}

impl FlatPart<'_> {
    /// Content-bearing node (no children).
    pub fn is_leaf(&self) -> bool {
        !self.part.has_children()
    }
}

/// Every node of a body structure keyed by section address, in traversal order.
#[derive(Debug, Clone, Default)]
pub struct FlatParts<'a> {
    map: BTreeMap<SectionPath, &'a RawPart>,
}

impl<'a> FlatParts<'a> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, section: &SectionPath) -> Option<&'a RawPart> {
        self.map.get(section).copied()
    }

    /// All entries, containers included, in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = FlatPart<'_>> + '_ {
        self.map
            .iter()
            .map(|(section, part)| FlatPart { section, part })
    }

    /// Only entries without children, in ascending address order.
    pub fn leaves(&self) -> impl Iterator<Item = FlatPart<'_>> + '_ {
        self.iter().filter(|p| p.is_leaf())
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionPath> + '_ {
        self.map.keys()
    }
}

/// Flatten a body structure into section-addressed entries.
///
/// A childless root is the single entry `"1"`. Otherwise child `n` of a node
/// at `p` is addressed `p.n`, except under an embedded message
/// (`message/*`): the message's own body is not addressed, its children take
/// the message's numbering directly (IMAP addresses the parts of an
/// encapsulated multipart as `p.1`, `p.2`…). A childless embedded message
/// gets a synthesized `p.1` entry pointing at itself.
///
/// Traversal uses an explicit stack, so deep nesting cannot exhaust the call
/// stack. When two nodes resolve to the same address the later one in
/// traversal order wins.
pub fn flatten(root: &RawPart) -> FlatParts<'_> {
    let mut map: BTreeMap<SectionPath, &RawPart> = BTreeMap::new();

    if !root.has_children() {
        map.insert(SectionPath::root(1), root);
        return FlatParts { map };
    }

    let mut stack: Vec<(SectionPath, &RawPart)> = Vec::new();
    push_children(&mut stack, None, &root.parts);

    while let Some((path, part)) = stack.pop() {
        map.insert(path.clone(), part);

        if part.major != MajorType::Message {
            push_children(&mut stack, Some(&path), &part.parts);
            continue;
        }

        if !part.has_children() {
            map.insert(path.child(1), part);
            continue;
        }

        let mut nested: Vec<(SectionPath, &RawPart)> = Vec::new();
        for (idx, body) in part.parts.iter().enumerate() {
            if body.has_children() {
                for (grand_idx, grand) in body.parts.iter().enumerate() {
                    nested.push((path.child(index(grand_idx)), grand));
                }
            } else {
                nested.push((path.child(index(idx)), body));
            }
        }
        stack.extend(nested.into_iter().rev());
    }

    FlatParts { map }
}

fn push_children<'a>(
    stack: &mut Vec<(SectionPath, &'a RawPart)>,
    parent: Option<&SectionPath>,
    children: &'a [RawPart],
) {
    for (idx, child) in children.iter().enumerate().rev() {
        let path = match parent {
            Some(parent) => parent.child(index(idx)),
            None => SectionPath::root(index(idx)),
        };
        stack.push((path, child));
    }
}

/// 1-based section number for a 0-based child position.
fn index(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::part::TransferEncoding;

    fn leaf(major: MajorType, subtype: &str) -> RawPart {
        RawPart::new(major, subtype, TransferEncoding::SevenBit)
    }

    fn multipart(subtype: &str, parts: Vec<RawPart>) -> RawPart {
        leaf(MajorType::Multipart, subtype).with_parts(parts)
    }

    fn addresses(flat: &FlatParts<'_>) -> Vec<String> {
        flat.sections().map(ToString::to_string).collect()
    }

    #[test]
    fn test_section_path_order_and_display() {
        let mut paths: Vec<SectionPath> = ["10", "2", "1.2", "1", "1.10", "1.1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        paths.sort();
        let shown: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(shown, ["1", "1.1", "1.2", "1.10", "2", "10"]);
        assert!("1..2".parse::<SectionPath>().is_err());
    }

    #[test]
    fn test_childless_root() {
        let root = leaf(MajorType::Text, "plain");
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1"]);
        assert!(std::ptr::eq(flat.get(&SectionPath::root(1)).unwrap(), &root));
    }

    #[test]
    fn test_flat_multipart() {
        let root = multipart(
            "mixed",
            vec![
                leaf(MajorType::Text, "plain"),
                leaf(MajorType::Image, "png"),
                leaf(MajorType::Application, "pdf"),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1", "2", "3"]);
        assert_eq!(flat.leaves().count(), 3);
    }

    #[test]
    fn test_nested_multipart() {
        let root = multipart(
            "mixed",
            vec![
                multipart(
                    "alternative",
                    vec![leaf(MajorType::Text, "plain"), leaf(MajorType::Text, "html")],
                ),
                leaf(MajorType::Image, "png"),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1", "1.1", "1.2", "2"]);
        let leaves: Vec<String> = flat.leaves().map(|p| p.section.to_string()).collect();
        assert_eq!(leaves, ["1.1", "1.2", "2"]);
    }

    #[test]
    fn test_embedded_message_with_multipart_body() {
        let inner = multipart(
            "mixed",
            vec![leaf(MajorType::Text, "plain"), leaf(MajorType::Image, "gif")],
        );
        let root = multipart(
            "mixed",
            vec![
                leaf(MajorType::Text, "plain"),
                leaf(MajorType::Message, "rfc822").with_parts(vec![inner]),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1", "2", "2.1", "2.2"]);
        assert_eq!(flat.get(&"2.2".parse().unwrap()).unwrap().subtype, "gif");
    }

    #[test]
    fn test_embedded_message_with_single_body() {
        let root = multipart(
            "mixed",
            vec![
                leaf(MajorType::Text, "plain"),
                leaf(MajorType::Message, "rfc822").with_parts(vec![leaf(MajorType::Text, "html")]),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1", "2", "2.1"]);
        assert_eq!(flat.get(&"2.1".parse().unwrap()).unwrap().subtype, "html");
    }

    #[test]
    fn test_childless_embedded_message_points_at_itself() {
        let root = multipart(
            "mixed",
            vec![leaf(MajorType::Message, "rfc822"), leaf(MajorType::Text, "plain")],
        );
        let flat = flatten(&root);
        assert_eq!(addresses(&flat), ["1", "1.1", "2"]);
        let one = flat.get(&"1".parse().unwrap()).unwrap();
        let synthesized = flat.get(&"1.1".parse().unwrap()).unwrap();
        assert!(std::ptr::eq(one, synthesized));
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut node = leaf(MajorType::Text, "plain");
        for _ in 0..1_000 {
            node = multipart("mixed", vec![node]);
        }
        let root = multipart("mixed", vec![node]);
        let flat = flatten(&root);
        assert_eq!(flat.leaves().count(), 1);
        assert_eq!(flat.len(), 1_001);
        let deepest = flat.sections().map(SectionPath::depth).max();
        assert_eq!(deepest, Some(1_001));
    }

    #[test]
    fn test_addresses_strictly_increasing() {
        let root = multipart(
            "mixed",
            vec![
                multipart(
                    "related",
                    vec![
                        multipart("alternative", vec![leaf(MajorType::Text, "plain")]),
                        leaf(MajorType::Image, "jpeg"),
                    ],
                ),
                leaf(MajorType::Message, "rfc822").with_parts(vec![multipart(
                    "mixed",
                    vec![leaf(MajorType::Text, "plain"), leaf(MajorType::Audio, "ogg")],
                )]),
                leaf(MajorType::Application, "zip"),
            ],
        );
        let flat = flatten(&root);
        let sections: Vec<&SectionPath> = flat.sections().collect();
        assert!(sections.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            addresses(&flat),
            ["1", "1.1", "1.1.1", "1.2", "2", "2.1", "2.2", "3"]
        );
    }
}
