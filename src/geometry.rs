//! Axis-aligned rectangles and the geo-constraint algebra built on top of them.
//!
//! A [`Rectangle`] here is a lat/lon boundary rather than the `x, y, width,
//! height` shape used by the other space-partitioning trees in this crate's
//! lineage — the wire format and the query language both talk about
//! `(minLat, maxLat, minLon, maxLon)` boundaries, so the type follows suit.

use std::f64;

/// An axis-aligned rectangle over latitude/longitude, with `min <= max` on
/// each axis. [`Rectangle::empty`] is the union identity: `union(empty, r) ==
/// r` for any `r`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rectangle {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Rectangle {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        debug_assert!(min_lat <= max_lat && min_lon <= max_lon);
        Rectangle {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// The sentinel empty rectangle. Not a valid geometry on its own; only
    /// meaningful as the identity element of [`Rectangle::union`].
    pub fn empty() -> Self {
        Rectangle {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rectangle {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// The smallest rectangle containing both; alias kept for parity with the
    /// split/reinsert algorithm's vocabulary ("enlarged MBR").
    pub fn enlarged(&self, other: &Rectangle) -> Rectangle {
        self.union(other)
    }

    /// True iff both axes overlap (touching edges count as overlap).
    pub fn overlap(&self, other: &Rectangle) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    /// Alias for [`Rectangle::overlap`]; this crate's query surface spells it
    /// `intersects`.
    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.overlap(other)
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max_lat - self.min_lat) * (self.max_lon - self.min_lon)
        }
    }

    /// Half-perimeter-doubled margin used by the R*-tree axis-choice heuristic.
    pub fn margin(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max_lat - self.min_lat) + (self.max_lon - self.min_lon)
        }
    }

    /// Area of the overlap region between `self` and `other` (0 if disjoint).
    pub fn overlap_area(&self, other: &Rectangle) -> f64 {
        if !self.overlap(other) {
            return 0.0;
        }
        let lat = (self.max_lat.min(other.max_lat) - self.min_lat.max(other.min_lat)).max(0.0);
        let lon = (self.max_lon.min(other.max_lon) - self.min_lon.max(other.min_lon)).max(0.0);
        lat * lon
    }

    /// Additional area required to enlarge `self` so it contains `other`.
    pub fn enlargement(&self, other: &Rectangle) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Coordinate of the centre along `axis` (0 = lat, 1 = lon).
    pub fn center(&self, axis: usize) -> f64 {
        match axis {
            0 => (self.min_lat + self.max_lat) / 2.0,
            1 => (self.min_lon + self.max_lon) / 2.0,
            _ => panic!("Rectangle only has 2 axes"),
        }
    }
}

/// A disjunction of rectangles: `{r_1, ..., r_k}`, unordered, possibly empty.
///
/// `+` is set union (logical OR over `intersects`); `/` is pairwise
/// intersection of every rectangle in `self` against every rectangle in
/// `other` (logical AND, though `intersects(r, a/b)` only implies
/// `intersects(r,a) && intersects(r,b)` in one direction — `a/b` can come out
/// empty even when both `a` and `b` individually intersect `r`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoConstraint {
    rects: Vec<Rectangle>,
}

impl GeoConstraint {
    pub fn empty() -> Self {
        GeoConstraint { rects: Vec::new() }
    }

    pub fn single(r: Rectangle) -> Self {
        GeoConstraint { rects: vec![r] }
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rectangle>) -> Self {
        GeoConstraint {
            rects: rects.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rectangle] {
        &self.rects
    }

    pub fn intersects(&self, r: &Rectangle) -> bool {
        self.rects.iter().any(|ri| ri.overlap(r))
    }

    /// `self + other` — disjunction (set union).
    pub fn union(&self, other: &GeoConstraint) -> GeoConstraint {
        let mut rects = self.rects.clone();
        rects.extend(other.rects.iter().copied());
        GeoConstraint { rects }
    }

    /// `self / other` — pairwise intersection; drops pairs that don't overlap.
    pub fn intersection(&self, other: &GeoConstraint) -> GeoConstraint {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                if a.overlap(b) {
                    rects.push(Rectangle {
                        min_lat: a.min_lat.max(b.min_lat),
                        max_lat: a.max_lat.min(b.max_lat),
                        min_lon: a.min_lon.max(b.min_lon),
                        max_lon: a.max_lon.min(b.max_lon),
                    });
                }
            }
        }
        GeoConstraint { rects }
    }
}

impl std::ops::Add for GeoConstraint {
    type Output = GeoConstraint;
    fn add(self, other: GeoConstraint) -> GeoConstraint {
        self.union(&other)
    }
}

impl std::ops::Div for GeoConstraint {
    type Output = GeoConstraint;
    fn div(self, other: GeoConstraint) -> GeoConstraint {
        self.intersection(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(a: f64, b: f64, c: f64, d: f64) -> Rectangle {
        Rectangle::new(a, b, c, d)
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = r(0.0, 1.0, 0.0, 1.0);
        assert_eq!(Rectangle::empty().union(&a), a);
        assert_eq!(a.union(&Rectangle::empty()), a);
    }

    #[test]
    fn overlap_is_symmetric_and_inclusive_of_touching_edges() {
        let a = r(0.0, 1.0, 0.0, 1.0);
        let b = r(1.0, 2.0, 1.0, 2.0);
        assert!(a.overlap(&b));
        assert!(b.overlap(&a));
        let c = r(2.0, 3.0, 2.0, 3.0);
        assert!(!a.overlap(&c));
    }

    #[test]
    fn geo_constraint_union_is_or() {
        let g1 = GeoConstraint::single(r(0.0, 1.0, 0.0, 1.0));
        let g2 = GeoConstraint::single(r(5.0, 6.0, 5.0, 6.0));
        let u = g1.clone() + g2.clone();
        assert!(u.intersects(&r(0.5, 0.5, 0.5, 0.5)));
        assert!(u.intersects(&r(5.5, 5.5, 5.5, 5.5)));
        assert!(!u.intersects(&r(10.0, 10.0, 10.0, 10.0)));
    }

    #[test]
    fn geo_constraint_intersection_can_be_empty_even_if_both_sides_intersect() {
        let query = r(0.4, 0.6, 0.4, 0.6);
        let g1 = GeoConstraint::single(r(0.0, 1.0, 0.0, 1.0));
        let g2 = GeoConstraint::single(r(2.0, 3.0, 2.0, 3.0));
        assert!(g1.intersects(&query));
        assert!(!g2.intersects(&query));
        let inter = g1 / g2;
        assert!(inter.is_empty());
        assert!(!inter.intersects(&query));
    }

    #[test]
    fn empty_constraint_never_intersects() {
        let g = GeoConstraint::empty();
        assert!(!g.intersects(&r(0.0, 1.0, 0.0, 1.0)));
    }
}
