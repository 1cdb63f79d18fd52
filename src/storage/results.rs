use super::container::{ContainerReader, ContainerWriter};
use super::{StorageError, StorageResult};
use crate::core::Direction;
use ndarray::Array2;
use retinosync_analysis::{PipelineConfig, RetinotopyResults};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const RESULTS_FILE_NAME: &str = "analysis_results.rsd";

/// How a result set was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsProvenance {
    /// Session the maps were derived from
    pub session: String,
    pub backend: String,
    #[serde(flatten)]
    pub config: PipelineConfig,
    pub statistical_threshold: f64,
    pub directions: Vec<Direction>,
}

/// Maps read back from a results file
#[derive(Debug, Clone)]
pub struct StoredResults {
    pub azimuth: Array2<f64>,
    pub elevation: Array2<f64>,
    pub raw_vfs: Array2<f64>,
    pub coherence_filtered_vfs: Array2<f64>,
    pub filtered_vfs: Array2<f64>,
    pub minimum_coherence: Array2<f64>,
    pub final_mask: Array2<bool>,
    pub positive_mask: Array2<bool>,
    pub negative_mask: Array2<bool>,
    pub positive_borders: Array2<bool>,
    pub negative_borders: Array2<bool>,
    pub provenance: ResultsProvenance,
}

fn add_map(writer: &mut ContainerWriter, name: &str, map: &Array2<f64>) -> StorageResult<()> {
    let (h, w) = map.dim();
    let values: Vec<f64> = map.iter().copied().collect();
    writer.add_dataset(name, &[h, w], &values)
}

fn add_mask(writer: &mut ContainerWriter, name: &str, mask: &Array2<bool>) -> StorageResult<()> {
    let (h, w) = mask.dim();
    let values: Vec<u8> = mask.iter().map(|&m| u8::from(m)).collect();
    writer.add_dataset(name, &[h, w], &values)
}

pub fn write_results(path: &Path, results: &RetinotopyResults, provenance: &ResultsProvenance) -> StorageResult<()> {
    let mut writer = ContainerWriter::new();
    match serde_json::to_value(provenance) {
        Ok(Value::Object(fields)) => writer.extend_attributes(fields.into_iter().collect()),
        Ok(_) => return Err(StorageError::Format("provenance must serialize to an object".into())),
        Err(e) => return Err(StorageError::Format(format!("provenance: {}", e))),
    }

    add_map(&mut writer, "azimuth", &results.retinotopy.azimuth)?;
    add_map(&mut writer, "elevation", &results.retinotopy.elevation)?;
    add_map(&mut writer, "vfs_raw", &results.raw_vfs)?;
    add_map(&mut writer, "vfs_coherence_filtered", &results.filtered.coherence_filtered)?;
    add_map(&mut writer, "vfs_filtered", &results.filtered.filtered)?;
    add_map(&mut writer, "coherence_minimum", &results.minimum_coherence)?;
    add_mask(&mut writer, "final_mask", &results.filtered.final_mask)?;
    add_mask(&mut writer, "positive_mask", &results.boundaries.positive_mask)?;
    add_mask(&mut writer, "negative_mask", &results.boundaries.negative_mask)?;
    add_mask(&mut writer, "positive_borders", &results.boundaries.positive_borders)?;
    add_mask(&mut writer, "negative_borders", &results.boundaries.negative_borders)?;

    for (direction, maps) in &results.fourier {
        add_map(&mut writer, &format!("phase_{}", direction), &maps.phase)?;
        add_map(&mut writer, &format!("magnitude_{}", direction), &maps.magnitude)?;
        add_map(&mut writer, &format!("coherence_{}", direction), &maps.coherence)?;
    }

    writer.write_to(path)
}

fn read_map(reader: &ContainerReader, path: &Path, name: &str) -> StorageResult<Array2<f64>> {
    let (shape, values) = reader.read::<f64>(name)?;
    to_array2(path, name, &shape, values)
}

fn read_mask(reader: &ContainerReader, path: &Path, name: &str) -> StorageResult<Array2<bool>> {
    let (shape, values) = reader.read::<u8>(name)?;
    let values = values.into_iter().map(|v| v != 0).collect();
    to_array2(path, name, &shape, values)
}

fn to_array2<T>(path: &Path, name: &str, shape: &[usize], values: Vec<T>) -> StorageResult<Array2<T>> {
    let corrupt = |reason: String| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("{}: {}", name, reason),
    };
    match shape {
        [h, w] => Array2::from_shape_vec((*h, *w), values).map_err(|e| corrupt(e.to_string())),
        other => Err(corrupt(format!("expected 2 dimensions, got {:?}", other))),
    }
}

pub fn read_results(path: &Path) -> StorageResult<StoredResults> {
    let reader = ContainerReader::open(path)?;
    let attributes = Value::Object(
        reader
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    let provenance = serde_json::from_value(attributes).map_err(|e| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("provenance: {}", e),
    })?;

    Ok(StoredResults {
        azimuth: read_map(&reader, path, "azimuth")?,
        elevation: read_map(&reader, path, "elevation")?,
        raw_vfs: read_map(&reader, path, "vfs_raw")?,
        coherence_filtered_vfs: read_map(&reader, path, "vfs_coherence_filtered")?,
        filtered_vfs: read_map(&reader, path, "vfs_filtered")?,
        minimum_coherence: read_map(&reader, path, "coherence_minimum")?,
        final_mask: read_mask(&reader, path, "final_mask")?,
        positive_mask: read_mask(&reader, path, "positive_mask")?,
        negative_mask: read_mask(&reader, path, "negative_mask")?,
        positive_borders: read_mask(&reader, path, "positive_borders")?,
        negative_borders: read_mask(&reader, path, "negative_borders")?,
        provenance,
    })
}
