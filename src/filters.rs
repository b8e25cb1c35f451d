use std::str::FromStr;

use crate::error::ApiError;

/// BoundingBox
///
/// Axis-aligned geographic rectangle `(x0, y0, x1, y1)` with `x0 <= x1` and
/// `y0 <= y1`. Query boxes are parsed from the `extent` request parameter,
/// a comma-separated `minLng,minLat,maxLng,maxLat` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Standard AABB intersection: two boxes intersect unless one lies
    /// entirely to one side of the other. The comparison is numeric; the
    /// coordinates are never round-tripped through strings.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x0 > other.x1 || self.x1 < other.x0 || self.y0 > other.y1 || self.y1 < other.y0)
    }
}

impl FromStr for BoundingBox {
    type Err = ApiError;

    /// Parses `minLng,minLat,maxLng,maxLat`. Anything other than exactly
    /// four numeric fields is the caller's error (HTTP 400), never a silent
    /// no-op.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(ApiError::Validation(format!(
                "extent must be 'minLng,minLat,maxLng,maxLat', got {} fields",
                parts.len()
            )));
        }

        let mut coords = [0f64; 4];
        for (i, part) in parts.iter().enumerate() {
            coords[i] = part.trim().parse::<f64>().map_err(|_| {
                ApiError::Validation(format!("extent coordinate '{}' is not a number", part))
            })?;
        }

        Ok(BoundingBox {
            x0: coords[0],
            y0: coords[1],
            x1: coords[2],
            y1: coords[3],
        })
    }
}

/// HasExtent
///
/// Access to a record's stored extent. Records are free to have none; those
/// never match a spatial query.
pub trait HasExtent {
    fn extent(&self) -> Option<BoundingBox>;
}

/// Searchable
///
/// The per-resource list of fields the free-text filter matches against.
pub trait Searchable {
    fn searchable_fields(&self) -> Vec<&str>;
}

/// Narrows `records` to those whose extent intersects `query`. A record
/// without an extent is treated as non-intersecting and dropped; that is not
/// an error. Pure narrowing predicate: composes with the visibility and text
/// filters as a logical AND, and preserves the input ordering.
pub fn filter_bbox<T: HasExtent>(records: Vec<T>, query: &BoundingBox) -> Vec<T> {
    records
        .into_iter()
        .filter(|r| r.extent().is_some_and(|b| b.intersects(query)))
        .collect()
}

/// Narrows `records` to those with at least one searchable field containing
/// `token`, case-insensitively. An empty or absent token is the identity:
/// the input comes back unchanged, not empty. No tokenization, stemming, or
/// ranking; plain substring containment, OR-ed across fields.
pub fn filter_text<T: Searchable>(records: Vec<T>, token: Option<&str>) -> Vec<T> {
    let token = match token {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => return records,
    };

    records
        .into_iter()
        .filter(|r| {
            r.searchable_fields()
                .iter()
                .any(|f| f.to_lowercase().contains(&token))
        })
        .collect()
}
