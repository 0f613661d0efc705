use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::schema::{AttrLocator, AttrType, Row, Schema};
use crate::search::query::{Filter, FilterValues};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    DocId,
    Int(AttrLocator),
    Float(AttrLocator),
    Multi(AttrLocator),
}

/// Filter resolved against a schema.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundFilter {
    target: Target,
    values: FilterValues,
    exclude: bool,
}

impl BoundFilter {
    pub(crate) fn bind(filter: &Filter, schema: &Schema) -> Result<Self> {
        let target = if filter.attr == "@id" {
            Target::DocId
        } else {
            let attr = schema
                .find_attr(&filter.attr)
                .ok_or_else(|| Error::query(format!("filter attribute '{}' not found", filter.attr)))?;
            match attr.attr_type {
                AttrType::Float => Target::Float(attr.locator),
                AttrType::Multi => Target::Multi(attr.locator),
                AttrType::Integer { .. } | AttrType::Timestamp | AttrType::Bool => Target::Int(attr.locator),
            }
        };
        let is_float = matches!(target, Target::Float(_));
        let values = match &filter.values {
            FilterValues::FloatRange { .. } if !is_float => {
                return Err(Error::query(format!("float range on non-float attribute '{}'", filter.attr)));
            }
            FilterValues::Values(_) | FilterValues::Range { .. } if is_float => {
                return Err(Error::query(format!("float attribute '{}' needs a float range", filter.attr)));
            }
            FilterValues::Values(values) => {
                let mut values = values.clone();
                values.sort_unstable();
                values.dedup();
                FilterValues::Values(values)
            }
            other => other.clone(),
        };
        Ok(BoundFilter {
            target,
            values,
            exclude: filter.exclude,
        })
    }

    pub(crate) fn bind_all(filters: &[Filter], schema: &Schema) -> Result<Vec<Self>> {
        filters.iter().map(|f| BoundFilter::bind(f, schema)).collect()
    }

    pub(crate) fn uses_attrs(&self) -> bool {
        self.target != Target::DocId
    }

    fn accepts(&self, value: u64) -> bool {
        match &self.values {
            FilterValues::Values(values) => values.binary_search(&value).is_ok(),
            FilterValues::Range { min, max } => (*min..=*max).contains(&value),
            FilterValues::FloatRange { .. } => false,
        }
    }

    /// `mva` resolves a stored multi-valued offset to its values.
    pub(crate) fn matches<'m>(&self, doc_id: DocId, row: &Row, mva: impl Fn(u32) -> &'m [u32]) -> bool {
        let hit = match self.target {
            Target::DocId => self.accepts(doc_id.0),
            Target::Int(loc) => self.accepts(row.get(&loc) as u64),
            Target::Float(loc) => match self.values {
                FilterValues::FloatRange { min, max } => {
                    let v = row.get_float(&loc);
                    v >= min && v <= max
                }
                FilterValues::Values(_) | FilterValues::Range { .. } => false,
            },
            Target::Multi(loc) => mva(row.get(&loc)).iter().any(|&v| self.accepts(v as u64)),
        };
        hit != self.exclude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttrSource;

    fn setup() -> (Schema, Row) {
        let mut schema = Schema::new("f");
        schema.add_attr("price", AttrType::integer(), AttrSource::None).unwrap();
        schema.add_attr("rating", AttrType::Float, AttrSource::None).unwrap();
        schema.add_attr("tags", AttrType::Multi, AttrSource::Field).unwrap();
        let mut row = Row::new(schema.row_size());
        row.set(&schema.attr(0).locator, 15).unwrap();
        row.set_float(&schema.attr(1).locator, 4.5).unwrap();
        row.set(&schema.attr(2).locator, 1).unwrap();
        (schema, row)
    }

    static MVA: [u32; 4] = [0, 2, 3, 9];

    fn check(filter: Filter) -> bool {
        let (schema, row) = setup();
        let bound = BoundFilter::bind(&filter, &schema).unwrap();
        bound.matches(DocId(42), &row, |off| {
            let off = off as usize;
            if off == 0 { &MVA[0..0] } else { &MVA[off + 1..off + 1 + MVA[off] as usize] }
        })
    }

    #[test]
    fn integer_float_and_id_filters() {
        assert!(check(Filter::values("price", vec![20, 15])));
        assert!(!check(Filter::values("price", vec![20, 15]).excluded()));
        assert!(check(Filter::range("price", 10, 15)));
        assert!(!check(Filter::range("price", 16, 99)));
        assert!(check(Filter::float_range("rating", 4.0, 5.0)));
        assert!(check(Filter::float_range("rating", 0.0, 1.0).excluded()));
        assert!(check(Filter::range("@id", 40, 50)));
        assert!(!check(Filter::values("@id", vec![1])));
    }

    #[test]
    fn multi_valued_filters_match_any_value() {
        assert!(check(Filter::values("tags", vec![9])));
        assert!(check(Filter::range("tags", 0, 3)));
        assert!(!check(Filter::values("tags", vec![4])));
        assert!(!check(Filter::values("tags", vec![3]).excluded()));
    }

    #[test]
    fn rejects_mismatched_filters() {
        let (schema, _) = setup();
        for filter in [
            Filter::float_range("price", 0.0, 1.0),
            Filter::range("rating", 0, 1),
            Filter::values("nope", vec![1]),
        ] {
            assert!(BoundFilter::bind(&filter, &schema).is_err());
        }
    }
}
