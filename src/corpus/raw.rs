use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::geometry::GeometryStats;
use crate::error::IngestError;
use crate::models::{ObjectKind, PageKey, Point, PolygonAnnotation};

/// Raw annotation record as exported by the markup tool or the hybrid
/// detector. Every field is optional on the wire; [`RawAnnotationFile::validate`]
/// applies the fallback rules once at the ingestion boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnnotationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "page_number", skip_serializing_if = "Option::is_none")]
    pub page_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<RawObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawObject {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<RawPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RawPoint {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// A raw record after its page key has been derived and its objects checked.
#[derive(Debug, Clone)]
pub struct ValidatedAnnotation {
    pub key: PageKey,
    pub objects: Vec<PolygonAnnotation>,
    /// Objects dropped for a missing type, missing points or fewer than two points.
    pub skipped_objects: usize,
    pub auto_detected: bool,
}

impl RawAnnotationFile {
    pub fn parse(bytes: &[u8], origin: &Path) -> Result<Self, IngestError> {
        serde_json::from_slice(bytes).map_err(|e| IngestError::Malformed {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Derive the page key and keep the well-formed objects.
    ///
    /// A missing or empty `project_id` falls back to the name of the folder
    /// containing `origin`; a missing `page_num` falls back to 1. Project ids
    /// with path separators or `..` are rejected.
    pub fn validate(self, origin: &Path) -> Result<ValidatedAnnotation, IngestError> {
        let project_id = match self.project_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => folder_name(origin).ok_or_else(|| IngestError::MissingProject(origin.to_path_buf()))?,
        };
        // Project ids become folder and file names under the image and corpus roots.
        if !is_plain_name(&project_id) {
            return Err(IngestError::UnsafeProjectId {
                path: origin.to_path_buf(),
                project_id,
            });
        }

        let page_num = match self.page_num {
            None => 1,
            Some(n) => u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| IngestError::InvalidPageNumber {
                    path: origin.to_path_buf(),
                    page_num: n,
                })?,
        };

        let raw_objects = self.objects.unwrap_or_default();
        let total = raw_objects.len();
        let objects: Vec<PolygonAnnotation> =
            raw_objects.into_iter().filter_map(RawObject::into_polygon).collect();

        Ok(ValidatedAnnotation {
            key: PageKey::new(project_id, page_num),
            skipped_objects: total - objects.len(),
            objects,
            auto_detected: self.auto_detected.unwrap_or(false),
        })
    }
}

impl RawObject {
    fn into_polygon(self) -> Option<PolygonAnnotation> {
        let kind = self.kind.filter(|k| !k.trim().is_empty())?;
        let points = self
            .points?
            .into_iter()
            .map(|p| Some(Point::new(p.x?, p.y?)))
            .collect::<Option<Vec<_>>>()?;
        if points.len() < 2 {
            return None;
        }
        Some(PolygonAnnotation {
            kind: ObjectKind::parse(&kind),
            points,
        })
    }
}

impl From<&PolygonAnnotation> for RawObject {
    fn from(annotation: &PolygonAnnotation) -> Self {
        Self {
            kind: Some(annotation.kind.to_string()),
            points: Some(
                annotation
                    .points
                    .iter()
                    .map(|p| RawPoint {
                        x: Some(p.x),
                        y: Some(p.y),
                    })
                    .collect(),
            ),
            confidence: None,
        }
    }
}

fn is_plain_name(project_id: &str) -> bool {
    !project_id.contains(['/', '\\']) && !project_id.contains("..") && project_id != "."
}

/// Page numbers exported by browser tools may arrive as `1.0`. Integral
/// floats are taken as integers; anything else is left for [`RawAnnotationFile::validate`]
/// to reject or fails as malformed.
fn page_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    match Option::<Number>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Number::Int(n)) => Ok(Some(n)),
        Some(Number::Float(f)) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Some(f as i64))
        }
        Some(Number::Float(f)) => Err(serde::de::Error::custom(format!("page_num {f} is not a whole number"))),
    }
}

fn folder_name(origin: &Path) -> Option<String> {
    origin
        .parent()?
        .file_name()?
        .to_str()
        .map(str::to_string)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(json: &str, origin: &str) -> Result<ValidatedAnnotation, IngestError> {
        let origin = PathBuf::from(origin);
        RawAnnotationFile::parse(json.as_bytes(), &origin)?.validate(&origin)
    }

    #[test]
    fn explicit_key_fields_win() {
        let v = parse(
            r#"{"project_id": "p1", "page_num": 3, "objects": []}"#,
            "markups/other/a.json",
        )
        .unwrap();
        assert_eq!(v.key, PageKey::new("p1", 3));
    }

    #[test]
    fn falls_back_to_folder_and_first_page() {
        let v = parse(r#"{"objects": []}"#, "markups/tower_b/session.json").unwrap();
        assert_eq!(v.key, PageKey::new("tower_b", 1));

        let v = parse(r#"{"project_id": "", "objects": []}"#, "markups/tower_b/s.json").unwrap();
        assert_eq!(v.key.project_id, "tower_b");
    }

    #[test]
    fn missing_folder_is_rejected() {
        let err = parse(r#"{"objects": []}"#, "session.json").unwrap_err();
        assert!(matches!(err, IngestError::MissingProject(_)));
    }

    #[test]
    fn rejects_non_positive_page() {
        let err = parse(r#"{"project_id": "p", "page_num": 0}"#, "m/p/a.json").unwrap_err();
        assert!(matches!(err, IngestError::InvalidPageNumber { page_num: 0, .. }));
    }

    #[test]
    fn malformed_objects_are_skipped_individually() {
        let v = parse(
            r#"{"project_id": "p", "objects": [
                {"type": "wall", "points": [{"x": 0, "y": 0}, {"x": 10, "y": 5}]},
                {"type": "wall", "points": [{"x": 0, "y": 0}]},
                {"points": [{"x": 0, "y": 0}, {"x": 1, "y": 1}]},
                {"type": "wall"},
                {"type": "wall", "points": [{"x": 0}, {"x": 1, "y": 1}]},
                {"type": "door", "points": [{"x": 2, "y": 2}, {"x": 4, "y": 9}]}
            ]}"#,
            "m/p/a.json",
        )
        .unwrap();
        assert_eq!(v.objects.len(), 2);
        assert_eq!(v.skipped_objects, 4);
        assert_eq!(v.objects[1].kind, ObjectKind::Door);
    }

    #[test]
    fn project_ids_that_leave_their_folder_are_rejected() {
        for id in ["../../x", "a/b", "a\\b", "..", ".", "tower..b"] {
            let json = format!(r#"{{"project_id": {}, "objects": []}}"#, serde_json::to_string(id).unwrap());
            let err = parse(&json, "m/p/a.json").unwrap_err();
            assert!(
                matches!(&err, IngestError::UnsafeProjectId { project_id, .. } if project_id == id),
                "{id}: {err:?}"
            );
        }
        let v = parse(r#"{"project_id": " tower-b_2 ", "objects": []}"#, "m/p/a.json").unwrap();
        assert_eq!(v.key.project_id, "tower-b_2");
    }

    #[test]
    fn integral_float_page_numbers_are_accepted() {
        let v = parse(r#"{"project_id": "p", "page_num": 3.0}"#, "m/p/a.json").unwrap();
        assert_eq!(v.key, PageKey::new("p", 3));

        let err = parse(r#"{"project_id": "p", "page_num": -2.0}"#, "m/p/a.json").unwrap_err();
        assert!(matches!(err, IngestError::InvalidPageNumber { page_num: -2, .. }));

        let err = parse(r#"{"project_id": "p", "page_num": 1.5}"#, "m/p/a.json").unwrap_err();
        assert!(matches!(err, IngestError::Malformed { .. }));

        let v = parse(r#"{"project_id": "p", "page_num": null}"#, "m/p/a.json").unwrap();
        assert_eq!(v.key.page_num, 1);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse("{not json", "m/p/a.json").unwrap_err();
        assert!(matches!(err, IngestError::Malformed { .. }));
    }
}
