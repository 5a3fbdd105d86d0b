use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Creates a white page image of the given size under `<root>/<project>/<name>`.
/// The format follows the file extension.
pub fn write_page_image(root: &Path, project: &str, name: &str, width: u32, height: u32) -> PathBuf {
    let dir = root.join(project);
    std::fs::create_dir_all(&dir).expect("Failed to create project image dir");
    let path = dir.join(name);
    let img = ImageBuffer::from_fn(width, height, |_, _| Rgb([255u8, 255u8, 255u8]));
    img.save(&path).expect("Failed to save test image");
    path
}

/// A rectangular wall object as the annotation tool stores it.
pub fn wall(x1: f64, y1: f64, x2: f64, y2: f64) -> Value {
    json!({
        "type": "wall",
        "points": [
            {"x": x1, "y": y1},
            {"x": x2, "y": y1},
            {"x": x2, "y": y2},
            {"x": x1, "y": y2}
        ]
    })
}

pub fn markup(project: &str, page: i64, objects: Vec<Value>) -> Value {
    json!({
        "project_id": project,
        "page_num": page,
        "objects": objects
    })
}

/// Writes `record` as `<dir>/<name>` and returns the path.
pub fn write_markup(dir: &Path, name: &str, record: &Value) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create markup dir");
    }
    std::fs::write(&path, serde_json::to_vec_pretty(record).unwrap()).expect("Failed to write markup");
    path
}

/// Temporary `markup/` and `images/` trees. Keep the struct alive for the
/// duration of the test.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join("markup")).unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        Self { dir }
    }

    pub fn markup(&self) -> PathBuf {
        self.dir.path().join("markup")
    }

    pub fn images(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join("corpus")
    }
}
