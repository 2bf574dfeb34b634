//! Union Analyzer
//!
//! Detects the anonymous union group of a struct declaration and assigns
//! discriminants in declaration order.

use crate::error::{PodgenError, Result};
use crate::parser::FieldDecl;

use super::{TypeId, UnionGroup, UnionMember};

/// Analyze a struct's field list for an anonymous union group.
///
/// Returns `None` when the struct has no union construct. Members get
/// discriminants 0..n-1 in declaration order. More than one union block at
/// the same level is rejected outright rather than silently picking one.
pub fn analyze(
    type_name: &str,
    owner: TypeId,
    fields: &[FieldDecl],
    union_blocks: usize,
) -> Result<Option<UnionGroup>> {
    if union_blocks > 1 {
        return Err(PodgenError::MultipleUnionGroups {
            type_name: type_name.to_string(),
        });
    }
    if union_blocks == 0 {
        return Ok(None);
    }

    let members: Vec<UnionMember> = fields
        .iter()
        .filter(|f| f.union_block.is_some())
        .enumerate()
        .map(|(i, f)| UnionMember {
            field_name: f.name.clone(),
            discriminant: i as u16,
        })
        .collect();

    Ok(Some(UnionGroup { owner, members }))
}

/// Discriminant for a field, if it belongs to the group
pub fn discriminant_of(group: Option<&UnionGroup>, field_name: &str) -> Option<u16> {
    group?
        .members
        .iter()
        .find(|m| m.field_name == field_name)
        .map(|m| m.discriminant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FieldType, PrimitiveKind};

    fn field(name: &str, ordinal: u16, union_block: Option<usize>) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            ordinal,
            ty: FieldType::Primitive(PrimitiveKind::Bool),
            union_block,
        }
    }

    #[test]
    fn test_no_union_yields_no_group() {
        let fields = vec![field("a", 0, None), field("b", 1, None)];
        assert!(analyze("S", TypeId(1), &fields, 0).unwrap().is_none());
    }

    #[test]
    fn test_discriminants_follow_declaration_order() {
        let fields = vec![
            field("before", 0, None),
            field("x", 1, Some(0)),
            field("y", 2, Some(0)),
            field("z", 3, Some(0)),
        ];
        let group = analyze("S", TypeId(1), &fields, 1).unwrap().unwrap();

        assert_eq!(group.owner, TypeId(1));
        let tags: Vec<(&str, u16)> = group
            .members
            .iter()
            .map(|m| (m.field_name.as_str(), m.discriminant))
            .collect();
        assert_eq!(tags, vec![("x", 0), ("y", 1), ("z", 2)]);

        assert_eq!(discriminant_of(Some(&group), "z"), Some(2));
        assert_eq!(discriminant_of(Some(&group), "before"), None);
    }

    #[test]
    fn test_multiple_union_blocks_rejected() {
        let fields = vec![field("a", 0, Some(0)), field("b", 1, Some(1))];
        let err = analyze("S", TypeId(1), &fields, 2).unwrap_err();
        assert!(matches!(
            err,
            PodgenError::MultipleUnionGroups { type_name } if type_name == "S"
        ));
    }
}
