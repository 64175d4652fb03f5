//! Features, layers and the class table.

use crate::{PipelineError, Result};
use geo::{Area, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Class attribute of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureClass {
    /// Buildings (structures above ground).
    Building,
    /// Other man-made structures (ground-level constructions).
    Structure,
}

impl FeatureClass {
    /// Value of the `class` attribute.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FeatureClass::Building => "building",
            FeatureClass::Structure => "structure",
        }
    }
}

impl fmt::Display for FeatureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureClass {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "building" => Ok(FeatureClass::Building),
            "structure" => Ok(FeatureClass::Structure),
            other => Err(PipelineError::Decode(format!("unknown class {other:?}"))),
        }
    }
}

/// Immutable mapping from mask labels to feature classes.
///
/// Label 0 is background and can never be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u8, FeatureClass>", into = "BTreeMap<u8, FeatureClass>")]
pub struct ClassMap {
    classes: BTreeMap<u8, FeatureClass>,
}

impl ClassMap {
    /// Build a class map, rejecting a mapping for the background label.
    pub fn new(classes: BTreeMap<u8, FeatureClass>) -> Result<Self> {
        if classes.contains_key(&0) {
            return Err(PipelineError::Configuration(
                "label 0 is background and cannot be mapped to a class".to_string(),
            ));
        }
        Ok(Self { classes })
    }

    /// Class for a non-zero label.
    pub fn class_of(&self, label: u8) -> Option<FeatureClass> {
        self.classes.get(&label).copied()
    }
}

impl Default for ClassMap {
    /// `1 → building`, `2 → structure`.
    fn default() -> Self {
        Self {
            classes: BTreeMap::from([(1, FeatureClass::Building), (2, FeatureClass::Structure)]),
        }
    }
}

impl TryFrom<BTreeMap<u8, FeatureClass>> for ClassMap {
    type Error = PipelineError;

    fn try_from(classes: BTreeMap<u8, FeatureClass>) -> Result<Self> {
        Self::new(classes)
    }
}

impl From<ClassMap> for BTreeMap<u8, FeatureClass> {
    fn from(map: ClassMap) -> Self {
        map.classes
    }
}

/// EPSG code of the working reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epsg(pub u32);

impl Epsg {
    /// Reject the unset code 0.
    pub fn validate(&self) -> Result<()> {
        if self.0 == 0 {
            return Err(PipelineError::Configuration(
                "EPSG code must be set".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Epsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Epsg {
    type Err = PipelineError;

    /// Accepts `EPSG:25832` and `urn:ogc:def:crs:EPSG::25832`.
    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .strip_prefix("EPSG:")
            .or_else(|| s.strip_prefix("urn:ogc:def:crs:EPSG::"))
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(|| PipelineError::Configuration(format!("unrecognized CRS {s:?}")))?;
        let epsg = Epsg(code);
        epsg.validate()?;
        Ok(epsg)
    }
}

/// One classified areal feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Class attribute.
    pub class: FeatureClass,
    /// Geometry; a single polygon except after clipping split a feature.
    pub geometry: MultiPolygon<f64>,
}

impl Feature {
    /// Feature made of a single polygon.
    pub fn new(class: FeatureClass, polygon: Polygon<f64>) -> Self {
        Self {
            class,
            geometry: MultiPolygon(vec![polygon]),
        }
    }

    /// Area in square metres, holes excluded.
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Polygons of this feature.
    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.geometry.0
    }
}

/// Ordered feature collection sharing a single reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Reference system of every feature.
    pub epsg: Epsg,
    /// Features; indices are dense from 0.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Layer with the given features.
    pub fn new(epsg: Epsg, features: Vec<Feature>) -> Self {
        Self { epsg, features }
    }

    /// Layer without features.
    pub fn empty(epsg: Epsg) -> Self {
        Self::new(epsg, Vec::new())
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True if there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Sum of feature areas.
    pub fn total_area(&self) -> f64 {
        self.features.iter().map(Feature::area).sum()
    }

    /// Append the features of `other`, which must use the same reference system.
    pub fn extend(&mut self, other: Layer) -> Result<()> {
        if other.epsg != self.epsg {
            return Err(PipelineError::Configuration(format!(
                "cannot combine {} features into a {} layer",
                other.epsg, self.epsg
            )));
        }
        self.features.extend(other.features);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_class_roundtrip() {
        for class in [FeatureClass::Building, FeatureClass::Structure] {
            assert_eq!(class.as_str().parse::<FeatureClass>().unwrap(), class);
        }
        assert!("tower".parse::<FeatureClass>().is_err());
    }

    #[test]
    fn test_class_map_rejects_background() {
        let classes = BTreeMap::from([(0, FeatureClass::Building)]);
        assert!(matches!(
            ClassMap::new(classes),
            Err(PipelineError::Configuration(_))
        ));
        let map = ClassMap::default();
        assert_eq!(map.class_of(1), Some(FeatureClass::Building));
        assert_eq!(map.class_of(2), Some(FeatureClass::Structure));
        assert_eq!(map.class_of(3), None);
    }

    #[test]
    fn test_epsg_parse() {
        assert_eq!("EPSG:25832".parse::<Epsg>().unwrap(), Epsg(25832));
        assert_eq!(
            "urn:ogc:def:crs:EPSG::3857".parse::<Epsg>().unwrap(),
            Epsg(3857)
        );
        assert!("EPSG:0".parse::<Epsg>().is_err());
        assert!("WGS84".parse::<Epsg>().is_err());
        assert_eq!(Epsg(4326).to_string(), "EPSG:4326");
    }

    #[test]
    fn test_layer_extend_checks_crs() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
        let mut layer = Layer::new(Epsg(25832), vec![Feature::new(FeatureClass::Building, square)]);
        assert!(layer.extend(Layer::empty(Epsg(3857))).is_err());
        let copy = layer.clone();
        layer.extend(copy).unwrap();
        assert_eq!(layer.len(), 2);
        assert!((layer.total_area() - 8.0).abs() < 1e-9);
    }
}
