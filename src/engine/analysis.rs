use crate::core::Direction;
use crate::error::{AcquisitionError, Result};
use crate::params::AnalysisParams;
use crate::storage::{
    camera_file_path, read_camera_file, read_stimulus_file, stimulus_file_path, write_results,
    ResultsProvenance, StagedFileSet, RESULTS_FILE_NAME,
};
use retinosync_analysis::{
    DirectionInput, FftBackend, PhaseAssigner, RetinotopyPipeline, SpectralBackend,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Summary of a finished offline analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub results_path: PathBuf,
    pub session_id: String,
    pub statistical_threshold: f64,
    /// Frames per direction that fell inside the stimulus span
    pub frames_analyzed: BTreeMap<Direction, usize>,
}

/// Offline analysis of one recorded session directory.
///
/// Reads the four direction file pairs, runs the retinotopy pipeline and
/// writes `analysis_results.rsd` next to them. Any failure leaves no
/// results file behind.
pub struct SessionAnalyzer<B: SpectralBackend + Clone = FftBackend> {
    backend: B,
}

impl SessionAnalyzer<FftBackend> {
    pub fn new() -> Self {
        Self::with_backend(FftBackend)
    }
}

impl Default for SessionAnalyzer<FftBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SpectralBackend + Clone> SessionAnalyzer<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Load one direction's camera and stimulus files
    pub fn load_direction(session_dir: &Path, direction: Direction) -> Result<(String, DirectionInput)> {
        let camera = read_camera_file(&camera_file_path(session_dir, direction))?;
        let stimulus = read_stimulus_file(&stimulus_file_path(session_dir, direction))?;
        for recorded in [camera.attributes.direction, stimulus.attributes.direction] {
            if recorded != direction {
                return Err(AcquisitionError::Storage(format!(
                    "{} files of {} are labelled {}",
                    direction,
                    session_dir.display(),
                    recorded
                )));
            }
        }
        if camera.attributes.session_id != stimulus.attributes.session_id {
            return Err(AcquisitionError::Storage(format!(
                "{} camera and stimulus files belong to different sessions",
                direction
            )));
        }

        let input = DirectionInput {
            frames: camera.frames.mapv(f64::from),
            camera_timestamps: camera.timestamps,
            stimulus_timestamps: stimulus.timestamps,
            stimulus_angles: stimulus.angles,
            cycles: camera.attributes.cycles,
        };
        Ok((camera.attributes.session_id, input))
    }

    pub fn analyze(&self, session_dir: &Path, params: &AnalysisParams) -> Result<AnalysisSummary> {
        let config = params.pipeline_config();
        let pipeline = RetinotopyPipeline::with_backend(config, self.backend.clone())?;

        let mut inputs = BTreeMap::new();
        let mut session_id = None;
        for direction in Direction::ALL {
            let (id, input) = Self::load_direction(session_dir, direction)?;
            match &session_id {
                None => session_id = Some(id),
                Some(existing) if *existing != id => {
                    return Err(AcquisitionError::Storage(format!(
                        "{} belongs to session {}, expected {}",
                        direction, id, existing
                    )));
                }
                Some(_) => {}
            }
            inputs.insert(direction, input);
        }
        let session_id = session_id.unwrap_or_default();

        let mut frames_analyzed = BTreeMap::new();
        for (direction, input) in &inputs {
            let span = PhaseAssigner::frames_within_stimulus(&input.camera_timestamps, &input.stimulus_timestamps)?;
            frames_analyzed.insert(*direction, span.len());
        }
        log::info!(
            "analyzing session {} with the {} backend",
            session_id,
            self.backend.name()
        );
        let results = pipeline.run(&inputs)?;

        let provenance = ResultsProvenance {
            session: session_id.clone(),
            backend: self.backend.name().to_string(),
            config,
            statistical_threshold: results.filtered.statistical_threshold,
            directions: Direction::ALL.to_vec(),
        };
        let results_path = session_dir.join(RESULTS_FILE_NAME);
        let mut files = StagedFileSet::new();
        files
            .stage(&results_path, |path| write_results(path, &results, &provenance))
            .map_err(|e| e.into_write_error(&results_path))?;
        files.commit().map_err(|e| e.into_write_error(&results_path))?;
        log::info!("results written to {}", results_path.display());

        Ok(AnalysisSummary {
            results_path,
            session_id,
            statistical_threshold: provenance.statistical_threshold,
            frames_analyzed,
        })
    }
}
