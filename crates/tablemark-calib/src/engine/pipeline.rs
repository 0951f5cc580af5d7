use super::acquire::{detect_with_attempts, AttemptPolicy};
use super::{
    CalibrationError, CalibrationParams, CalibrationResult, CalibrationStage, TABLE_CORNER_MARKERS,
};
use crate::{table_corners, Pattern, Projector, ReferenceGrid};
use log::{debug, info};
use std::thread;
use std::time::Duration;
use tablemark_core::{
    estimate_homography, points_are_collinear, quad_center, transform_points, Camera,
    Correspondences, FlipSpec, FramePreprocessor, GeometryError, Homography, MarkerDetector,
    Point2D,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Progress of a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    CameraToProjector,
    BoundingBox,
    Succeeded,
    Failed,
}

/// Drives the camera, projector and the two marker detectors through both
/// calibration stages.
///
/// `grid_detector` decodes the projected grid dictionary, `table_detector`
/// the physical corner markers.
pub struct CalibrationEngine<C, P, G, T> {
    params: CalibrationParams,
    grid: ReferenceGrid,
    camera: C,
    projector: P,
    grid_detector: G,
    table_detector: T,
    preprocessor: FramePreprocessor,
    state: CalibrationState,
}

impl<C, P, G, T> CalibrationEngine<C, P, G, T>
where
    C: Camera,
    P: Projector,
    G: MarkerDetector,
    T: MarkerDetector,
{
    pub fn new(
        params: CalibrationParams,
        camera: C,
        projector: P,
        grid_detector: G,
        table_detector: T,
    ) -> Result<Self, CalibrationError> {
        params.validate().map_err(CalibrationError::InvalidParams)?;
        let grid = ReferenceGrid::new(params.projector_width, params.projector_height, params.grid)
            .map_err(|e| CalibrationError::InvalidParams(e.to_string()))?;
        Ok(Self {
            params,
            grid,
            camera,
            projector,
            grid_detector,
            table_detector,
            preprocessor: FramePreprocessor::passthrough(),
            state: CalibrationState::Idle,
        })
    }

    /// Undistortion/enhancement applied to every captured frame.
    pub fn with_preprocessor(mut self, preprocessor: FramePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    #[inline]
    pub fn reference_grid(&self) -> &ReferenceGrid {
        &self.grid
    }

    #[inline]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn into_parts(self) -> (C, P, G, T) {
        (
            self.camera,
            self.projector,
            self.grid_detector,
            self.table_detector,
        )
    }

    /// Run both stages. Any error leaves the engine in
    /// [`CalibrationState::Failed`] and yields no result.
    pub fn run(&mut self) -> Result<CalibrationResult, CalibrationError> {
        let camera_to_projector = self.calibrate_camera_to_projector()?;
        let bounding_box = self.calibrate_bounding_box(&camera_to_projector)?;
        self.state = CalibrationState::Succeeded;
        info!("calibration succeeded");
        Ok(CalibrationResult {
            camera_to_projector,
            bounding_box,
        })
    }

    /// Stage A: project the reference grid, detect it and fit camera → projector.
    pub fn calibrate_camera_to_projector(&mut self) -> Result<Homography, CalibrationError> {
        self.state = CalibrationState::CameraToProjector;
        let result = self.camera_to_projector_stage();
        if result.is_err() {
            self.state = CalibrationState::Failed;
        }
        result
    }

    /// Stage B: detect the table corner markers and fit the projector
    /// reference rectangle onto them.
    pub fn calibrate_bounding_box(
        &mut self,
        camera_to_projector: &Homography,
    ) -> Result<Homography, CalibrationError> {
        self.state = CalibrationState::BoundingBox;
        let result = self.bounding_box_stage(camera_to_projector);
        if result.is_err() {
            self.state = CalibrationState::Failed;
        }
        result
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(markers = self.grid.len()))
    )]
    fn camera_to_projector_stage(&mut self) -> Result<Homography, CalibrationError> {
        const STAGE: CalibrationStage = CalibrationStage::CameraToProjector;
        info!(
            "{STAGE}: projecting {}x{} reference grid",
            self.grid.rows(),
            self.grid.cols()
        );
        self.projector.show(Pattern::ReferenceGrid(&self.grid));

        let policy = AttemptPolicy {
            stage: STAGE,
            max_attempts: self.params.max_attempts,
            min_frame_mean: self.params.min_frame_mean,
            expected: None,
        };
        let captured = detect_with_attempts(
            &mut self.camera,
            &mut self.grid_detector,
            &self.preprocessor,
            self.params.flip,
            &policy,
        )?;

        let pairs = captured
            .to_marker_set()
            .intersection_by_id(self.grid.marker_set());
        if pairs.is_empty() {
            return Err(CalibrationError::NoCommonMarkers);
        }
        let correspondences = Correspondences::from_pairs(&pairs);
        debug!("{STAGE}: common markers {:?}", correspondences.ids);

        // One or two markers still give four non-collinear corners each.
        let centers: Vec<Point2D> = pairs.iter().map(|p| quad_center(&p.first)).collect();
        if centers.len() >= 3 && points_are_collinear(&centers, self.params.min_marker_spread) {
            return Err(CalibrationError::degenerate(
                STAGE,
                GeometryError::Degenerate("matched grid markers are collinear"),
            ));
        }

        let h = estimate_homography(&correspondences.first, &correspondences.second)
            .map_err(|e| CalibrationError::degenerate(STAGE, e))?;
        info!(
            "{STAGE}: homography from {} markers",
            correspondences.ids.len()
        );
        Ok(h)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    fn bounding_box_stage(
        &mut self,
        camera_to_projector: &Homography,
    ) -> Result<Homography, CalibrationError> {
        const STAGE: CalibrationStage = CalibrationStage::BoundingBox;
        self.projector.show(Pattern::Blank);
        if self.params.settle_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.params.settle_delay_ms));
        }

        let policy = AttemptPolicy {
            stage: STAGE,
            max_attempts: self.params.max_attempts,
            min_frame_mean: self.params.min_frame_mean,
            expected: Some(TABLE_CORNER_MARKERS),
        };
        let detection = detect_with_attempts(
            &mut self.camera,
            &mut self.table_detector,
            &self.preprocessor,
            FlipSpec::default(),
            &policy,
        )?;

        let camera_corners = table_corners(detection.corners());
        let projector_corners = transform_points(&camera_corners, camera_to_projector)
            .map_err(|e| CalibrationError::degenerate(STAGE, e))?;
        debug!("{STAGE}: table corners in projector space {projector_corners:?}");

        let w = f64::from(self.params.projector_width);
        let h = f64::from(self.params.projector_height);
        let reference = [
            Point2D::new(0.0, 0.0),
            Point2D::new(w, 0.0),
            Point2D::new(w, h),
            Point2D::new(0.0, h),
        ];
        estimate_homography(&reference, &projector_corners)
            .map_err(|e| CalibrationError::degenerate(STAGE, e))
    }
}
