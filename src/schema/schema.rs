use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::MAX_FIELDS;

const ROWITEM_BITS: u32 = 32;

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    /// Unsigned integer, packed into `bits` bits (1..=32)
    Integer { bits: u32 },
    /// Unix timestamp, seconds
    Timestamp,
    Bool,
    Float,
    /// Multi-valued integer set; the row stores an offset into MVA storage
    Multi,
}

impl AttrType {
    pub fn integer() -> Self {
        AttrType::Integer { bits: ROWITEM_BITS }
    }

    pub fn bit_count(&self) -> u32 {
        match self {
            AttrType::Integer { bits } => *bits,
            AttrType::Bool => 1,
            AttrType::Timestamp | AttrType::Float | AttrType::Multi => ROWITEM_BITS,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, AttrType::Multi)
    }
}

/// Where multi-valued attribute values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrSource {
    None,
    /// Value list carried by each document
    Field,
    /// Separate (doc-id, value) iteration over the source
    Query,
}

/// Bit-level address of an attribute inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrLocator {
    pub bit_offset: u32,
    pub bit_count: u32,
}

impl AttrLocator {
    pub fn new(bit_offset: u32, bit_count: u32) -> Self {
        AttrLocator { bit_offset, bit_count }
    }

    /// Index of the row word holding this attribute.
    #[inline]
    pub fn rowitem(&self) -> usize {
        (self.bit_offset / ROWITEM_BITS) as usize
    }

    #[inline]
    pub fn shift(&self) -> u32 {
        self.bit_offset % ROWITEM_BITS
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        if self.bit_count >= ROWITEM_BITS {
            u32::MAX
        } else {
            (1u32 << self.bit_count) - 1
        }
    }

    /// True when the attribute occupies one full row word.
    #[inline]
    pub fn is_whole_word(&self) -> bool {
        self.bit_count == ROWITEM_BITS && self.shift() == 0
    }

    /// `value` saturated to the locator width, and whether it was cut.
    #[inline]
    pub fn saturate(&self, value: u32) -> (u32, bool) {
        let max = self.mask();
        if value > max { (max, true) } else { (value, false) }
    }

    pub fn is_valid(&self) -> bool {
        self.bit_count > 0 && self.bit_count <= ROWITEM_BITS && self.shift() + self.bit_count <= ROWITEM_BITS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrDefinition {
    pub name: String,
    pub attr_type: AttrType,
    pub source: AttrSource,
    pub locator: AttrLocator,
}

/// Outcome of comparing two schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMatch {
    Equal,
    /// Same attribute layout, names or fields differ
    Compatible,
    Incompatible,
}

/// Full-text fields plus attribute layout.
///
/// Fields and attributes live in separate namespaces. Attribute order
/// determines the row layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    fields: Vec<FieldDefinition>,
    attrs: Vec<AttrDefinition>,
    // bits used in each row word
    used_bits: Vec<u32>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Schema {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_field(&mut self, name: &str) -> Result<usize> {
        if self.fields.len() >= MAX_FIELDS {
            return Err(Error::schema(format!(
                "too many fields in '{}' (max {})",
                self.name, MAX_FIELDS
            )));
        }
        if self.field_index(name).is_some() {
            return Err(Error::schema(format!("duplicate field '{}'", name)));
        }
        self.fields.push(FieldDefinition { name: name.to_string() });
        Ok(self.fields.len() - 1)
    }

    pub fn add_attr(&mut self, name: &str, attr_type: AttrType, source: AttrSource) -> Result<usize> {
        if self.attr_index(name).is_some() {
            return Err(Error::schema(format!("duplicate attribute '{}'", name)));
        }
        if let AttrType::Integer { bits } = attr_type {
            if bits == 0 || bits > ROWITEM_BITS {
                return Err(Error::schema(format!(
                    "attribute '{}': integer width must be 1..=32 bits, got {}",
                    name, bits
                )));
            }
        }
        if (attr_type == AttrType::Multi) != (source != AttrSource::None) {
            return Err(Error::schema(format!(
                "attribute '{}': only multi-valued attributes take a value source",
                name
            )));
        }
        let locator = self.allocate(attr_type.bit_count());
        self.attrs.push(AttrDefinition {
            name: name.to_string(),
            attr_type,
            source,
            locator,
        });
        Ok(self.attrs.len() - 1)
    }

    fn allocate(&mut self, bits: u32) -> AttrLocator {
        if bits < ROWITEM_BITS {
            if let Some(item) = self.used_bits.iter().position(|&used| used + bits <= ROWITEM_BITS) {
                let offset = item as u32 * ROWITEM_BITS + self.used_bits[item];
                self.used_bits[item] += bits;
                return AttrLocator::new(offset, bits);
            }
        }
        self.used_bits.push(bits);
        AttrLocator::new((self.used_bits.len() as u32 - 1) * ROWITEM_BITS, bits)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn attrs(&self) -> &[AttrDefinition] {
        &self.attrs
    }

    pub fn attr(&self, index: usize) -> &AttrDefinition {
        &self.attrs[index]
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Position in this schema of each of `other`'s fields, matched by
    /// name. Fails if `other` has a field this schema lacks.
    pub fn field_map(&self, other: &Schema) -> Result<Vec<usize>> {
        other
            .fields
            .iter()
            .map(|f| {
                self.field_index(&f.name).ok_or_else(|| {
                    Error::schema(format!(
                        "field '{}' of '{}' is missing from '{}'",
                        f.name, other.name, self.name
                    ))
                })
            })
            .collect()
    }

    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attrs.iter().position(|a| a.name == name)
    }

    pub fn find_attr(&self, name: &str) -> Option<&AttrDefinition> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Looks up an attribute for a query, failing with a query error.
    pub fn require_attr(&self, name: &str) -> Result<&AttrDefinition> {
        self.find_attr(name)
            .ok_or_else(|| Error::query(format!("unknown attribute '{}' in '{}'", name, self.name)))
    }

    pub fn mva_attrs(&self) -> impl Iterator<Item = (usize, &AttrDefinition)> {
        self.attrs
            .iter()
            .enumerate()
            .filter(|(_, a)| a.attr_type == AttrType::Multi)
    }

    /// Row width in 32-bit words.
    pub fn row_size(&self) -> usize {
        self.used_bits.len()
    }

    /// Compares attribute layouts. Fields may differ freely; attribute
    /// types and locators must match for the schemas to be compatible.
    pub fn compare_to(&self, other: &Schema) -> (SchemaMatch, String) {
        if self.attrs.len() != other.attrs.len() {
            return (
                SchemaMatch::Incompatible,
                format!(
                    "attribute count mismatch: '{}' has {}, '{}' has {}",
                    self.name,
                    self.attrs.len(),
                    other.name,
                    other.attrs.len()
                ),
            );
        }

        let mut reason = String::new();
        for (a, b) in self.attrs.iter().zip(&other.attrs) {
            if a.attr_type != b.attr_type || a.locator != b.locator || a.source != b.source {
                return (
                    SchemaMatch::Incompatible,
                    format!(
                        "attribute '{}' ({:?}) does not match '{}' ({:?})",
                        a.name, a.attr_type, b.name, b.attr_type
                    ),
                );
            }
            if a.name != b.name && reason.is_empty() {
                reason = format!("attribute name '{}' differs from '{}'", a.name, b.name);
            }
        }

        if reason.is_empty() && self.fields != other.fields {
            reason = format!(
                "field lists differ: {} vs {} fields",
                self.fields.len(),
                other.fields.len()
            );
        }
        if reason.is_empty() {
            (SchemaMatch::Equal, reason)
        } else {
            (SchemaMatch::Compatible, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        let mut schema = Schema::new("products");
        schema.add_field("title").unwrap();
        schema.add_field("body").unwrap();
        schema.add_attr("group_id", AttrType::integer(), AttrSource::None).unwrap();
        schema.add_attr("flag", AttrType::Bool, AttrSource::None).unwrap();
        schema.add_attr("rating", AttrType::Integer { bits: 4 }, AttrSource::None).unwrap();
        schema.add_attr("price", AttrType::Float, AttrSource::None).unwrap();
        schema
    }

    #[test]
    fn bitfields_share_a_row_word() {
        let schema = sample();
        let flag = schema.find_attr("flag").unwrap().locator;
        let rating = schema.find_attr("rating").unwrap().locator;
        assert_eq!(flag.rowitem(), rating.rowitem());
        assert_eq!((flag.bit_offset, flag.bit_count), (32, 1));
        assert_eq!((rating.bit_offset, rating.bit_count), (33, 4));
        assert!(schema.find_attr("price").unwrap().locator.is_whole_word());
        assert_eq!(schema.row_size(), 3);
    }

    #[test]
    fn fields_and_attrs_are_separate_namespaces() {
        let mut schema = sample();
        assert!(schema.add_attr("title", AttrType::Timestamp, AttrSource::None).is_ok());
        assert!(schema.add_field("title").is_err());
        assert!(schema.add_attr("price", AttrType::Float, AttrSource::None).is_err());
    }

    #[test]
    fn compare_reports_equal_compatible_incompatible() {
        let a = sample();
        assert_eq!(a.compare_to(&a.clone()).0, SchemaMatch::Equal);

        let mut renamed = Schema::new("other");
        renamed.add_field("title").unwrap();
        renamed.add_attr("gid", AttrType::integer(), AttrSource::None).unwrap();
        renamed.add_attr("flag", AttrType::Bool, AttrSource::None).unwrap();
        renamed.add_attr("rating", AttrType::Integer { bits: 4 }, AttrSource::None).unwrap();
        renamed.add_attr("price", AttrType::Float, AttrSource::None).unwrap();
        let (m, reason) = a.compare_to(&renamed);
        assert_eq!(m, SchemaMatch::Compatible);
        assert!(reason.contains("gid"));

        let mut retyped = a.clone();
        retyped.attrs[3].attr_type = AttrType::Timestamp;
        assert_eq!(a.compare_to(&retyped).0, SchemaMatch::Incompatible);
    }

    #[test]
    fn field_map_matches_by_name() {
        let base = sample();
        let mut other = Schema::new("other");
        other.add_field("body").unwrap();
        other.add_field("title").unwrap();
        assert_eq!(base.field_map(&other).unwrap(), vec![1, 0]);

        other.add_field("summary").unwrap();
        assert!(base.field_map(&other).unwrap_err().is_kind(crate::core::error::ErrorKind::Schema));
    }

    #[test]
    fn only_mva_takes_a_source() {
        let mut schema = Schema::new("t");
        assert!(schema.add_attr("tags", AttrType::Multi, AttrSource::None).is_err());
        assert!(schema.add_attr("tags", AttrType::Multi, AttrSource::Field).is_ok());
        assert!(schema.add_attr("n", AttrType::integer(), AttrSource::Query).is_err());
        assert!(schema.add_attr("wide", AttrType::Integer { bits: 33 }, AttrSource::None).is_err());
    }
}
