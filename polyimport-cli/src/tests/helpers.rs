//! Test helpers writing dataset documents into a scratch workspace.

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;

pub(super) const PARCELS: &str = r#"{
    "layers": [{
        "name": "parcels",
        "crs": { "info": { "proj": "utm", "zone": "32" }, "units": { "unit": "meter" } },
        "fields": [{ "name": "zone", "type": "string", "width": 4 }],
        "features": [
            { "id": 1, "properties": { "zone": "R1" }, "geometry": { "type": "Polygon",
              "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]] } },
            { "id": 2, "properties": { "zone": "C2" }, "geometry": { "type": "Polygon",
              "coordinates": [[[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0], [1.0, 1.0]]] } }
        ]
    }, {
        "name": "wells",
        "crs": { "info": { "proj": "utm", "zone": "32" }, "units": { "unit": "meter" } },
        "features": [
            { "id": 5, "geometry": { "type": "Point", "coordinates": [0.5, 0.5] } }
        ]
    }]
}"#;

pub(super) const UTM_32: &str = r#"{ "info": { "proj": "utm", "zone": "32" }, "units": { "unit": "meter" } }"#;

/// Scratch directory holding a dataset and the paths derived from it.
pub(super) struct Workspace {
    _dir: TempDir,
    pub(super) root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("write workspace file");
        path
    }

    pub(super) fn dataset(&self) -> Utf8PathBuf {
        self.write("parcels.json", PARCELS)
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("out/parcels.db")
    }
}
