use super::container::{ContainerReader, ContainerWriter, DType};
use super::{StorageError, StorageResult};
use crate::core::{Direction, TimestampSource};
use crate::params::MonitorGeometry;
use crate::recorder::DirectionDataset;
use ndarray::Array3;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const FILE_EXTENSION: &str = "rsd";
const MONITOR_PREFIX: &str = "monitor_";

pub fn camera_file_name(direction: Direction) -> String {
    format!("{}_camera.{}", direction, FILE_EXTENSION)
}

pub fn stimulus_file_name(direction: Direction) -> String {
    format!("{}_stimulus.{}", direction, FILE_EXTENSION)
}

pub fn camera_file_path(dir: &Path, direction: Direction) -> PathBuf {
    dir.join(camera_file_name(direction))
}

pub fn stimulus_file_path(dir: &Path, direction: Direction) -> PathBuf {
    dir.join(stimulus_file_name(direction))
}

/// Attributes shared by a direction's camera and stimulus files
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttributes {
    pub session_id: String,
    pub direction: Direction,
    pub camera_fps: f64,
    pub monitor: MonitorGeometry,
    pub cycles: u32,
    pub timestamp_source: Option<TimestampSource>,
}

impl FileAttributes {
    fn write(&self, writer: &mut ContainerWriter) -> StorageResult<()> {
        writer.set_attribute("session_id", &self.session_id)?;
        writer.set_attribute("direction", self.direction)?;
        writer.set_attribute("camera_fps", self.camera_fps)?;
        writer.set_attribute("cycles", self.cycles)?;
        writer.set_attribute("timestamp_source", self.timestamp_source)?;

        let monitor = serde_json::to_value(self.monitor)
            .map_err(|e| StorageError::Format(format!("monitor geometry: {}", e)))?;
        if let Value::Object(fields) = monitor {
            for (key, value) in fields {
                writer.set_attribute(&format!("{}{}", MONITOR_PREFIX, key), value)?;
            }
        }
        Ok(())
    }

    fn read(reader: &ContainerReader) -> StorageResult<Self> {
        let monitor_fields: serde_json::Map<String, Value> = reader
            .attributes()
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(MONITOR_PREFIX)
                    .map(|field| (field.to_string(), value.clone()))
            })
            .collect();
        let monitor = serde_json::from_value(Value::Object(monitor_fields)).map_err(|e| {
            StorageError::Format(format!("monitor geometry attributes: {}", e))
        })?;

        Ok(Self {
            session_id: reader.attribute("session_id")?,
            direction: reader.attribute("direction")?,
            camera_fps: reader.attribute("camera_fps")?,
            monitor,
            cycles: reader.attribute("cycles")?,
            timestamp_source: reader.attribute("timestamp_source")?,
        })
    }
}

pub fn write_camera_file(path: &Path, dataset: &DirectionDataset, attributes: &FileAttributes) -> StorageResult<()> {
    let mut writer = ContainerWriter::new();
    attributes.write(&mut writer)?;

    let (height, width) = dataset.frame_shape();
    let mut pixels = Vec::with_capacity(dataset.frame_count() * height * width);
    for frame in &dataset.camera_frames {
        pixels.extend(frame.iter().copied());
    }
    writer.add_dataset("frames", &[dataset.frame_count(), height, width], &pixels)?;
    writer.add_dataset("timestamps", &[dataset.frame_count()], &dataset.camera_timestamps)?;
    writer.write_to(path)
}

pub fn write_stimulus_file(path: &Path, dataset: &DirectionDataset, attributes: &FileAttributes) -> StorageResult<()> {
    let mut writer = ContainerWriter::new();
    attributes.write(&mut writer)?;

    let m = dataset.event_count();
    writer.add_dataset("frame_indices", &[m], &dataset.stimulus_frame_indices)?;
    writer.add_dataset("timestamps", &[m], &dataset.stimulus_timestamps)?;
    writer.add_dataset("angles", &[m], &dataset.stimulus_angles)?;
    writer.write_to(path)
}

#[derive(Debug, Clone)]
pub struct CameraRecording {
    pub frames: Array3<u16>,
    pub timestamps: Vec<i64>,
    pub attributes: FileAttributes,
}

#[derive(Debug, Clone)]
pub struct StimulusRecording {
    pub frame_indices: Vec<i32>,
    pub timestamps: Vec<i64>,
    pub angles: Vec<f32>,
    pub attributes: FileAttributes,
}

fn shape3(path: &Path, shape: &[usize]) -> StorageResult<(usize, usize, usize)> {
    match shape {
        [n, h, w] => Ok((*n, *h, *w)),
        other => Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("frames must be 3-dimensional, got shape {:?}", other),
        }),
    }
}

/// Read a camera file; 8-bit frames are widened to 16 bits
pub fn read_camera_file(path: &Path) -> StorageResult<CameraRecording> {
    let reader = ContainerReader::open(path)?;
    let attributes = FileAttributes::read(&reader)?;

    let (shape, pixels) = match reader.descriptor("frames")?.dtype {
        DType::U8 => {
            let (shape, raw) = reader.read::<u8>("frames")?;
            (shape, raw.into_iter().map(u16::from).collect())
        }
        _ => reader.read::<u16>("frames")?,
    };
    let frames = Array3::from_shape_vec(shape3(path, &shape)?, pixels).map_err(|e| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let (_, timestamps) = reader.read::<i64>("timestamps")?;

    Ok(CameraRecording {
        frames,
        timestamps,
        attributes,
    })
}

pub fn read_stimulus_file(path: &Path) -> StorageResult<StimulusRecording> {
    let reader = ContainerReader::open(path)?;
    Ok(StimulusRecording {
        attributes: FileAttributes::read(&reader)?,
        frame_indices: reader.read::<i32>("frame_indices")?.1,
        timestamps: reader.read::<i64>("timestamps")?.1,
        angles: reader.read::<f32>("angles")?.1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn attributes() -> FileAttributes {
        FileAttributes {
            session_id: "session-1".into(),
            direction: Direction::TB,
            camera_fps: 30.0,
            monitor: MonitorGeometry {
                fps: 60.0,
                width_px: 1920,
                height_px: 1080,
                width_cm: 60.0,
                height_cm: 34.0,
                distance_cm: 10.0,
                lateral_angle_deg: 30.0,
                tilt_angle_deg: 20.0,
            },
            cycles: 10,
            timestamp_source: Some(TimestampSource::Hardware),
        }
    }

    fn dataset() -> DirectionDataset {
        DirectionDataset {
            direction: Direction::TB,
            camera_frames: (0..3)
                .map(|k| Arc::new(Array2::from_shape_fn((2, 4), |(y, x)| (k * 100 + y * 4 + x) as u16)))
                .collect(),
            camera_timestamps: vec![0, 33_333, 66_666],
            timestamp_source: Some(TimestampSource::Hardware),
            stimulus_frame_indices: vec![0, 1, 2, 3, 4],
            stimulus_timestamps: vec![10, 16_677, 33_344, 50_011, 66_678],
            stimulus_angles: vec![-2.0, -1.0, 0.0, 1.0, 2.0],
        }
    }

    #[test]
    fn test_camera_file_keeps_frames_and_attributes() {
        let dir = tempdir().unwrap();
        let path = camera_file_path(dir.path(), Direction::TB);
        assert!(path.ends_with("TB_camera.rsd"));

        write_camera_file(&path, &dataset(), &attributes()).unwrap();
        let recording = read_camera_file(&path).unwrap();
        assert_eq!(recording.frames.dim(), (3, 2, 4));
        assert_eq!(recording.frames[[2, 1, 3]], 207);
        assert_eq!(recording.timestamps, vec![0, 33_333, 66_666]);
        assert_eq!(recording.attributes, attributes());

        // the eight geometry fields are individual attributes
        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(
            reader
                .attributes()
                .keys()
                .filter(|k| k.starts_with(MONITOR_PREFIX))
                .count(),
            8
        );
    }

    #[test]
    fn test_stimulus_file_keeps_event_log() {
        let dir = tempdir().unwrap();
        let path = stimulus_file_path(dir.path(), Direction::TB);
        write_stimulus_file(&path, &dataset(), &attributes()).unwrap();

        let recording = read_stimulus_file(&path).unwrap();
        assert_eq!(recording.frame_indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(recording.timestamps[4], 66_678);
        assert_eq!(recording.angles, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(recording.attributes.direction, Direction::TB);
    }

    #[test]
    fn test_reads_eight_bit_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LR_camera.rsd");
        let mut writer = ContainerWriter::new();
        FileAttributes {
            direction: Direction::LR,
            ..attributes()
        }
        .write(&mut writer)
        .unwrap();
        writer.add_dataset("frames", &[1, 1, 2], &[7u8, 255]).unwrap();
        writer.add_dataset("timestamps", &[1], &[5i64]).unwrap();
        writer.write_to(&path).unwrap();

        let recording = read_camera_file(&path).unwrap();
        assert_eq!(recording.frames.into_raw_vec(), vec![7u16, 255]);
    }
}
