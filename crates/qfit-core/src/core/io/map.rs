use crate::core::density::map::{DensityMap, DensityMapError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapIoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed density map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid density map: {0}")]
    Invalid(#[from] DensityMapError),
}

/// On-disk layout of a density map.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapDocument {
    origin: [f64; 3],
    spacing: [f64; 3],
    shape: [usize; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution: Option<f64>,
    values: Vec<f64>,
}

pub fn read_map(reader: impl Read) -> Result<DensityMap, MapIoError> {
    let doc: MapDocument = serde_json::from_reader(reader)?;
    let map = DensityMap::new(doc.origin, doc.spacing, doc.shape, doc.values)?
        .with_resolution(doc.resolution);
    Ok(map)
}

pub fn write_map(map: &DensityMap, writer: impl Write) -> Result<(), MapIoError> {
    let doc = MapDocument {
        origin: map.origin(),
        spacing: map.spacing(),
        shape: map.shape(),
        resolution: map.resolution(),
        values: map.values().to_vec(),
    };
    serde_json::to_writer(writer, &doc)?;
    Ok(())
}

pub fn read_map_from_path<P: AsRef<Path>>(path: P) -> Result<DensityMap, MapIoError> {
    let file = File::open(path)?;
    read_map(BufReader::new(file))
}

pub fn write_map_to_path<P: AsRef<Path>>(map: &DensityMap, path: P) -> Result<(), MapIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_map(map, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn map_survives_a_trip_through_disk() {
        let map = DensityMap::new([1.0, 2.0, 3.0], [0.5; 3], [2, 2, 1], vec![0.0, 1.0, 2.0, 3.0])
            .unwrap()
            .with_resolution(Some(1.8));
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.json");
        write_map_to_path(&map, &path).unwrap();
        let back = read_map_from_path(&path).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn inconsistent_shape_is_rejected() {
        let json = r#"{"origin":[0,0,0],"spacing":[1,1,1],"shape":[2,2,2],"values":[1.0]}"#;
        assert!(matches!(
            read_map(json.as_bytes()),
            Err(MapIoError::Invalid(DensityMapError::ShapeMismatch { .. }))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{"origin":[0,0,0],"spacing":[1,1,1],"shape":[1,1,1],"values":[1.0],"axis":"zyx"}"#;
        assert!(matches!(read_map(json.as_bytes()), Err(MapIoError::Json(_))));
    }
}
