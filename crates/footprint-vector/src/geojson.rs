//! GeoJSON encoding of layers and clip boundaries.
//!
//! Layers are written as a `FeatureCollection` with a named `crs` member
//! (`"EPSG:<code>"`) and a single `class` property per feature.

use crate::feature::{Epsg, Feature, FeatureClass, Layer};
use crate::{PipelineError, Result};
use geo::{MultiPolygon, Polygon};
use geojson::{FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use serde_json::json;
use std::fs;
use std::path::Path;

const CLASS: &str = "class";
const CRS: &str = "crs";

fn geometry_of(geometry: &MultiPolygon<f64>) -> Geometry {
    match geometry.0.as_slice() {
        [single] => Geometry::new(Value::from(single)),
        _ => Geometry::new(Value::from(geometry)),
    }
}

/// Polygons of a polygonal geometry; anything else is rejected.
fn polygons_of(geometry: Option<Geometry>) -> Result<Vec<Polygon<f64>>> {
    let geometry =
        geometry.ok_or_else(|| PipelineError::Decode("feature without geometry".to_string()))?;
    match geo::Geometry::<f64>::try_from(geometry.value)? {
        geo::Geometry::Polygon(polygon) => Ok(vec![polygon]),
        geo::Geometry::MultiPolygon(parts) => Ok(parts.0),
        _ => Err(PipelineError::Decode("geometry is not polygonal".to_string())),
    }
}

fn crs_members(epsg: Epsg) -> JsonObject {
    let mut members = JsonObject::new();
    members.insert(
        CRS.to_string(),
        json!({ "type": "name", "properties": { "name": epsg.to_string() } }),
    );
    members
}

fn crs_of(collection: &FeatureCollection) -> Result<Epsg> {
    collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get(CRS))
        .and_then(|crs| crs["properties"]["name"].as_str())
        .ok_or_else(|| PipelineError::Decode("collection has no crs".to_string()))?
        .parse()
}

/// Encode a layer as a GeoJSON `FeatureCollection`.
pub fn layer_to_string(layer: &Layer) -> Result<String> {
    let features = layer
        .features
        .iter()
        .map(|f| {
            let mut feature = geojson::Feature::from(geometry_of(&f.geometry));
            feature.set_property(CLASS, f.class.as_str());
            feature
        })
        .collect();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(crs_members(layer.epsg)),
    };
    Ok(serde_json::to_string(&collection)?)
}

/// Decode a `FeatureCollection` written by [`layer_to_string`].
///
/// The `crs` member is required.
pub fn layer_from_str(s: &str) -> Result<Layer> {
    let collection = match s.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(PipelineError::Decode(
                "expected a FeatureCollection".to_string(),
            ))
        }
    };
    let epsg = crs_of(&collection)?;
    let features = collection
        .features
        .into_iter()
        .map(|f| {
            let class: FeatureClass = f
                .property(CLASS)
                .and_then(JsonValue::as_str)
                .ok_or_else(|| PipelineError::Decode("feature has no class".to_string()))?
                .parse()?;
            Ok(Feature {
                class,
                geometry: MultiPolygon(polygons_of(f.geometry)?),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Layer::new(epsg, features))
}

/// Write a layer to a GeoJSON file.
pub fn write_layer<P: AsRef<Path>>(path: P, layer: &Layer) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, layer_to_string(layer)?).map_err(|e| PipelineError::storage(path, e))
}

/// Parse a clip boundary: a polygonal geometry, a feature or a collection
/// whose geometries are combined.
pub fn boundary_from_str(s: &str) -> Result<MultiPolygon<f64>> {
    let polygons = match s.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => polygons_of(Some(geometry))?,
        GeoJson::Feature(feature) => polygons_of(feature.geometry)?,
        GeoJson::FeatureCollection(collection) => {
            let mut polygons = Vec::new();
            for feature in collection.features {
                polygons.extend(polygons_of(feature.geometry)?);
            }
            polygons
        }
    };
    if polygons.is_empty() {
        return Err(PipelineError::Decode("boundary has no polygons".to_string()));
    }
    Ok(MultiPolygon(polygons))
}

/// Read a clip boundary file.
pub fn read_boundary<P: AsRef<Path>>(path: P) -> Result<MultiPolygon<f64>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| PipelineError::storage(path, e))?;
    boundary_from_str(&text)
}
