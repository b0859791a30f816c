//! Type layout information consumed by expression lowering.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A C-like type, as far as lowering needs to know it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum AstTyp {
    Void,
    /// An integer of the given byte size.
    Int { bytes: usize },
    Pointer { target: Box<AstTyp> },
    /// An array; `size` is the element count when declared.
    Array {
        element: Box<AstTyp>,
        size: Option<usize>,
    },
    /// A composite (struct) type, referencing a compinfo by key.
    Comp { compkey: usize, name: String },
    /// A type known only by name; treated as opaque.
    Named { name: String },
}

impl AstTyp {
    pub fn int(bytes: usize) -> AstTyp {
        AstTyp::Int { bytes }
    }

    pub fn pointer(target: AstTyp) -> AstTyp {
        AstTyp::Pointer {
            target: Box::new(target),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, AstTyp::Pointer { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, AstTyp::Array { .. })
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, AstTyp::Comp { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, AstTyp::Void)
    }

    /// The byte size of a value of this type, when statically known.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            AstTyp::Void => None,
            AstTyp::Int { bytes } => Some(*bytes),
            AstTyp::Pointer { .. } => Some(4),
            AstTyp::Array { element, size } => {
                Some(element.byte_size()? * (*size)?)
            }
            AstTyp::Comp { .. } | AstTyp::Named { .. } => None,
        }
    }
}

/// One declared field of a composite type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AstFieldInfo {
    pub name: String,
    /// Byte offset of the field within the composite.
    pub offset: i64,
    pub typ: AstTyp,
    /// Byte size of the field.
    pub size: usize,
}

impl AstFieldInfo {
    /// True if this field's extent covers the given byte offset.
    pub fn spans(&self, offset: i64) -> bool {
        offset >= self.offset && offset < self.offset + self.size as i64
    }
}

/// The layout of one composite type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AstCompInfo {
    pub compkey: usize,
    pub name: String,
    pub fields: Vec<AstFieldInfo>,
}

impl AstCompInfo {
    /// The field spanning the given byte offset, together with the
    /// residual offset within that field. Fails when no declared field
    /// covers the offset, which indicates a malformed or unsupported
    /// layout.
    pub fn field_at_offset(&self, offset: i64) -> Result<(&AstFieldInfo, i64), Error> {
        for field in &self.fields {
            if field.spans(offset) {
                return Ok((field, offset - field.offset));
            }
        }
        Err(Error::NoFieldAtOffset {
            compname: self.name.clone(),
            offset,
        })
    }
}

/// One formal parameter of the function being lowered.
///
/// `arglocs` names the architectural storage locations that jointly hold
/// the parameter (more than one register for an aggregate passed in
/// registers).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AstFormal {
    pub name: String,
    /// Index of the first argument location this formal occupies.
    pub argindex: usize,
    pub arglocs: Vec<String>,
}

impl AstFormal {
    /// The indices within `arglocs` covered by argument index `argindex`,
    /// if this formal occupies it.
    pub fn locindex(&self, argindex: usize) -> Option<usize> {
        let span = self.arglocs.len();
        if argindex >= self.argindex && argindex < self.argindex + span {
            Some(argindex - self.argindex)
        } else {
            None
        }
    }
}

/// A declared global variable.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VarInfo {
    pub name: String,
    pub typ: Option<AstTyp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_struct() -> AstCompInfo {
        AstCompInfo {
            compkey: 1,
            name: "pair".to_string(),
            fields: vec![
                AstFieldInfo {
                    name: "first".to_string(),
                    offset: 0,
                    typ: AstTyp::int(4),
                    size: 4,
                },
                AstFieldInfo {
                    name: "second".to_string(),
                    offset: 4,
                    typ: AstTyp::int(4),
                    size: 4,
                },
            ],
        }
    }

    #[test]
    fn test_field_at_offset_direct_and_residual() {
        let comp = pair_struct();
        let (field, rest) = comp.field_at_offset(4).unwrap();
        assert_eq!(field.name, "second");
        assert_eq!(rest, 0);
        let (field, rest) = comp.field_at_offset(6).unwrap();
        assert_eq!(field.name, "second");
        assert_eq!(rest, 2);
    }

    #[test]
    fn test_field_at_offset_out_of_range() {
        let comp = pair_struct();
        assert!(comp.field_at_offset(8).is_err());
        assert!(comp.field_at_offset(-1).is_err());
    }

    #[test]
    fn test_formal_locindex() {
        let formal = AstFormal {
            name: "buf".to_string(),
            argindex: 1,
            arglocs: vec!["R1".to_string(), "R2".to_string()],
        };
        assert_eq!(formal.locindex(0), None);
        assert_eq!(formal.locindex(1), Some(0));
        assert_eq!(formal.locindex(2), Some(1));
        assert_eq!(formal.locindex(3), None);
    }

    #[test]
    fn test_byte_size() {
        assert_eq!(AstTyp::int(2).byte_size(), Some(2));
        assert_eq!(
            AstTyp::Array {
                element: Box::new(AstTyp::int(1)),
                size: Some(4)
            }
            .byte_size(),
            Some(4)
        );
        assert_eq!(AstTyp::Void.byte_size(), None);
    }
}
