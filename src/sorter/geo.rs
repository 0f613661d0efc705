use crate::core::error::{Error, Result};
use crate::schema::{AttrLocator, AttrType, Row, Schema};
use crate::search::query::GeoAnchor;

/// Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS: f64 = 6_384_000.0;

/// Great-circle distance in meters between two points given in radians.
pub fn geodist(lat1: f32, long1: f32, lat2: f32, long2: f32) -> f32 {
    let (lat1, long1, lat2, long2) = (lat1 as f64, long1 as f64, lat2 as f64, long2 as f64);
    let dlat = lat2 - lat1;
    let dlong = long2 - long1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlong / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    (EARTH_RADIUS * c) as f32
}

/// Geo anchor resolved against a schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocator {
    lat: AttrLocator,
    long: AttrLocator,
    anchor_lat: f32,
    anchor_long: f32,
}

impl GeoLocator {
    pub fn bind(anchor: &GeoAnchor, schema: &Schema) -> Result<Self> {
        let float_attr = |name: &str| -> Result<AttrLocator> {
            let attr = schema.require_attr(name)?;
            if attr.attr_type != AttrType::Float {
                return Err(Error::query(format!("geo anchor attribute '{}' must be a float", name)));
            }
            Ok(attr.locator)
        };
        Ok(GeoLocator {
            lat: float_attr(&anchor.lat_attr)?,
            long: float_attr(&anchor.long_attr)?,
            anchor_lat: anchor.lat,
            anchor_long: anchor.long,
        })
    }

    pub fn distance(&self, row: &Row) -> f32 {
        geodist(self.anchor_lat, self.anchor_long, row.get_float(&self.lat), row.get_float(&self.long))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;
    use crate::schema::AttrSource;

    #[test]
    fn distance_between_known_points() {
        assert_eq!(geodist(0.5, 0.5, 0.5, 0.5), 0.0);
        let quarter = geodist(0.0, 0.0, 0.0, FRAC_PI_2);
        let expected = (EARTH_RADIUS * std::f64::consts::FRAC_PI_2) as f32;
        assert!((quarter - expected).abs() < 10.0, "{}", quarter);
        assert!((geodist(0.1, 0.2, 0.3, 0.4) - geodist(0.3, 0.4, 0.1, 0.2)).abs() < 1e-3);
    }

    #[test]
    fn binds_float_attributes_only() {
        let mut schema = Schema::new("geo");
        schema.add_attr("lat", AttrType::Float, AttrSource::None).unwrap();
        schema.add_attr("long", AttrType::Float, AttrSource::None).unwrap();
        schema.add_attr("id2", AttrType::integer(), AttrSource::None).unwrap();

        let anchor = GeoAnchor::new("lat", "long", 0.0, 0.0);
        let geo = GeoLocator::bind(&anchor, &schema).unwrap();
        let mut row = Row::new(schema.row_size());
        row.set_float(&schema.attr(1).locator, FRAC_PI_2).unwrap();
        assert!(geo.distance(&row) > 10_000_000.0);

        assert!(GeoLocator::bind(&GeoAnchor::new("lat", "id2", 0.0, 0.0), &schema).is_err());
        assert!(GeoLocator::bind(&GeoAnchor::new("lat", "nope", 0.0, 0.0), &schema).is_err());
    }
}
