use approx::assert_relative_eq;
use std::collections::VecDeque;
use tablemark_calib::{
    CalibrationEngine, CalibrationError, CalibrationParams, CalibrationStage, CalibrationState,
    Pattern, Projector, ReferenceGrid,
};
use tablemark_core::{
    transform_quad, BrownConrady, Camera, CameraError, CameraIntrinsics, Detection, FlipSpec,
    FramePreprocessor, GrayImage, GrayImageView, Homography, MarkerDetector, Point2D, Quad,
    UndistortMap,
};

const PROJ_W: u32 = 1280;
const PROJ_H: u32 = 720;

struct ScriptedCamera {
    frames: VecDeque<GrayImage>,
    fallback: GrayImage,
    opened: usize,
    released: usize,
}

impl ScriptedCamera {
    fn bright() -> Self {
        let data = (0..90)
            .flat_map(|_| (0..160u32).map(|x| (x + 20) as u8))
            .collect();
        Self::showing(GrayImage {
            width: 160,
            height: 90,
            data,
        })
    }

    fn showing(fallback: GrayImage) -> Self {
        Self {
            frames: VecDeque::new(),
            fallback,
            opened: 0,
            released: 0,
        }
    }

    /// Sensor noise in the dark: pixels alternate 0 and 3, mean 1.5.
    fn dark_noise() -> Self {
        let data = (0..160 * 90).map(|i| if i % 2 == 0 { 0 } else { 3 }).collect();
        Self::showing(GrayImage {
            width: 160,
            height: 90,
            data,
        })
    }

    fn with_black_frames(mut self, n: usize) -> Self {
        for _ in 0..n {
            self.frames.push_back(GrayImage::filled(160, 90, 2));
        }
        self
    }
}

impl Camera for ScriptedCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        self.opened += 1;
        Ok(())
    }

    fn read(&mut self) -> Option<GrayImage> {
        Some(
            self.frames
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        )
    }

    fn release(&mut self) {
        self.released += 1;
    }
}

#[derive(Default)]
struct ScriptedDetector {
    script: VecDeque<Option<Detection>>,
    fallback: Option<Detection>,
    calls: usize,
    first_pixels: Vec<u8>,
}

impl ScriptedDetector {
    fn always(detection: Detection) -> Self {
        Self {
            fallback: Some(detection),
            ..Self::default()
        }
    }

    fn never() -> Self {
        Self::default()
    }
}

impl MarkerDetector for ScriptedDetector {
    fn detect(&mut self, frame: &GrayImageView<'_>) -> Option<Detection> {
        self.calls += 1;
        self.first_pixels.push(frame.data[0]);
        self.script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
struct RecordingProjector {
    shown: Vec<&'static str>,
}

impl Projector for RecordingProjector {
    fn show(&mut self, pattern: Pattern<'_>) {
        self.shown.push(match pattern {
            Pattern::ReferenceGrid(_) => "grid",
            Pattern::Blank => "blank",
        });
    }
}

/// Ground-truth camera → projector transform of the synthetic rig.
fn true_camera_to_projector() -> Homography {
    Homography::from_array([
        [1.9, 0.04, 35.0],
        [-0.03, 2.05, 18.0],
        [2e-5, -1e-5, 1.0],
    ])
}

fn projector_to_camera() -> Homography {
    true_camera_to_projector().inverse().unwrap()
}

fn to_camera(q: &Quad) -> Quad {
    transform_quad(q, &projector_to_camera()).unwrap()
}

fn detection(items: impl IntoIterator<Item = (u32, Quad)>) -> Detection {
    let (ids, corners): (Vec<_>, Vec<_>) = items.into_iter().unzip();
    Detection::new(ids, corners).unwrap()
}

fn grid() -> ReferenceGrid {
    ReferenceGrid::new(PROJ_W, PROJ_H, CalibrationParams::new(PROJ_W, PROJ_H).grid).unwrap()
}

/// Captured grid: every other marker visible, corners in camera pixels.
fn captured_grid() -> Detection {
    let grid = grid();
    detection(
        grid.marker_set()
            .iter()
            .filter(|(id, _)| id % 2 == 0)
            .map(|(id, q)| (id, to_camera(q))),
    )
}

/// Table corners in projector pixels, `[TL, TR, BR, BL]`.
fn table_quad() -> [Point2D; 4] {
    [
        Point2D::new(100.0, 50.0),
        Point2D::new(1180.0, 60.0),
        Point2D::new(1170.0, 690.0),
        Point2D::new(90.0, 680.0),
    ]
}

fn square(x: f64, y: f64, s: f64) -> Quad {
    [
        Point2D::new(x, y),
        Point2D::new(x + s, y),
        Point2D::new(x + s, y + s),
        Point2D::new(x, y + s),
    ]
}

/// One 40 px marker tucked into each table corner, listed out of order.
fn table_markers() -> Vec<(u32, Quad)> {
    vec![
        (7, to_camera(&square(1130.0, 650.0, 40.0))),
        (3, to_camera(&square(100.0, 50.0, 40.0))),
        (5, to_camera(&square(90.0, 640.0, 40.0))),
        (4, to_camera(&square(1140.0, 60.0, 40.0))),
    ]
}

fn params() -> CalibrationParams {
    CalibrationParams::new(PROJ_W, PROJ_H)
        .with_settle_delay_ms(0)
        .with_max_attempts(3)
}

fn assert_same_mapping(a: &Homography, b: &Homography) {
    for p in [
        Point2D::new(0.0, 0.0),
        Point2D::new(320.0, 40.0),
        Point2D::new(600.0, 330.0),
        Point2D::new(50.0, 300.0),
    ] {
        let pa = a.apply(p).unwrap();
        let pb = b.apply(p).unwrap();
        assert_relative_eq!(pa.x, pb.x, epsilon = 1e-4);
        assert_relative_eq!(pa.y, pb.y, epsilon = 1e-4);
    }
}

#[test]
fn full_run_recovers_both_homographies() {
    let mut camera = ScriptedCamera::bright();
    let mut projector = RecordingProjector::default();
    let mut grid_det = ScriptedDetector::always(captured_grid());
    let mut table_det = ScriptedDetector::always(detection(table_markers()));

    let result = {
        let mut engine = CalibrationEngine::new(
            params(),
            &mut camera,
            &mut projector,
            &mut grid_det,
            &mut table_det,
        )
        .unwrap();
        assert_eq!(engine.state(), CalibrationState::Idle);
        let result = engine.run().unwrap();
        assert_eq!(engine.state(), CalibrationState::Succeeded);
        result
    };

    assert_same_mapping(&result.camera_to_projector, &true_camera_to_projector());

    let w = f64::from(PROJ_W);
    let h = f64::from(PROJ_H);
    let reference = [
        Point2D::new(0.0, 0.0),
        Point2D::new(w, 0.0),
        Point2D::new(w, h),
        Point2D::new(0.0, h),
    ];
    for (r, expected) in reference.iter().zip(table_quad()) {
        let p = result.bounding_box.apply(*r).unwrap();
        assert_relative_eq!(p.x, expected.x, epsilon = 1e-4);
        assert_relative_eq!(p.y, expected.y, epsilon = 1e-4);
    }

    assert_eq!(projector.shown, vec!["grid", "blank"]);
    assert_eq!((grid_det.calls, table_det.calls), (1, 1));
    assert_eq!(camera.opened, 2);
    assert_eq!(camera.released, camera.opened);
}

#[test]
fn mirrored_projector_recovers_same_homography() {
    let flip = FlipSpec {
        horizontal: true,
        vertical: false,
    };
    // The detector sees the mirrored frame, so it reports mirrored corners.
    let mirror = flip.matrix(160, 90);
    let mirrored = captured_grid().map_corners(&mirror).unwrap();

    let mut camera = ScriptedCamera::bright();
    let mut grid_det = ScriptedDetector::always(mirrored);
    let h = {
        let mut engine = CalibrationEngine::new(
            params().with_flip(flip),
            &mut camera,
            RecordingProjector::default(),
            &mut grid_det,
            ScriptedDetector::never(),
        )
        .unwrap();
        engine.calibrate_camera_to_projector().unwrap()
    };

    assert_same_mapping(&h, &true_camera_to_projector());
    // Rightmost column of the ramp lands at the left edge.
    assert_eq!(grid_det.first_pixels, vec![179]);
}

#[test]
fn too_many_table_markers_aborts_on_first_attempt() {
    let mut extra = table_markers();
    extra.push((9, to_camera(&square(600.0, 350.0, 40.0))));
    let mut table_det = ScriptedDetector::always(detection(extra));

    let err = {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::bright(),
            RecordingProjector::default(),
            ScriptedDetector::always(captured_grid()),
            &mut table_det,
        )
        .unwrap();
        let err = engine.run().unwrap_err();
        assert_eq!(engine.state(), CalibrationState::Failed);
        err
    };

    assert!(matches!(
        err,
        CalibrationError::AmbiguousSetup {
            detected: 5,
            expected: 4
        }
    ));
    assert_eq!(table_det.calls, 1);
}

#[test]
fn missing_table_markers_exhaust_the_attempt_budget() {
    let mut partial = table_markers();
    partial.pop();
    let mut table_det = ScriptedDetector::always(detection(partial));

    let err = {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::bright(),
            RecordingProjector::default(),
            ScriptedDetector::always(captured_grid()),
            &mut table_det,
        )
        .unwrap();
        engine.run().unwrap_err()
    };

    assert!(matches!(
        err,
        CalibrationError::DetectionTimeout {
            stage: CalibrationStage::BoundingBox,
            attempts: 3
        }
    ));
    assert_eq!(table_det.calls, 3);
}

#[test]
fn undetected_grid_times_out() {
    let mut camera = ScriptedCamera::bright();
    let err = {
        let mut engine = CalibrationEngine::new(
            params(),
            &mut camera,
            RecordingProjector::default(),
            ScriptedDetector::never(),
            ScriptedDetector::never(),
        )
        .unwrap();
        engine.run().unwrap_err()
    };
    assert!(matches!(
        err,
        CalibrationError::DetectionTimeout {
            stage: CalibrationStage::CameraToProjector,
            ..
        }
    ));
    assert_eq!((camera.opened, camera.released), (3, 3));
}

#[test]
fn disjoint_ids_are_fatal() {
    let foreign = detection(
        grid()
            .marker_set()
            .iter()
            .map(|(id, q)| (id + 10_000, to_camera(q))),
    );
    let mut engine = CalibrationEngine::new(
        params(),
        ScriptedCamera::bright(),
        RecordingProjector::default(),
        ScriptedDetector::always(foreign),
        ScriptedDetector::never(),
    )
    .unwrap();
    assert!(matches!(
        engine.run(),
        Err(CalibrationError::NoCommonMarkers)
    ));
}

#[test]
fn three_markers_in_a_row_are_degenerate() {
    let grid = grid();
    let row = detection(
        (0..3).map(|id| (id, to_camera(grid.marker_set().get(id).unwrap()))),
    );
    let mut engine = CalibrationEngine::new(
        params(),
        ScriptedCamera::bright(),
        RecordingProjector::default(),
        ScriptedDetector::always(row),
        ScriptedDetector::never(),
    )
    .unwrap();
    assert!(matches!(
        engine.calibrate_camera_to_projector(),
        Err(CalibrationError::DegenerateGeometry {
            stage: CalibrationStage::CameraToProjector,
            ..
        })
    ));
}

#[test]
fn black_frames_are_skipped_and_use_up_attempts() {
    let mut grid_det = ScriptedDetector::always(captured_grid());
    {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::bright().with_black_frames(2),
            RecordingProjector::default(),
            &mut grid_det,
            ScriptedDetector::never(),
        )
        .unwrap();
        engine.calibrate_camera_to_projector().unwrap();
    }
    assert_eq!(grid_det.calls, 1);

    let mut engine = CalibrationEngine::new(
        params(),
        ScriptedCamera::bright().with_black_frames(3),
        RecordingProjector::default(),
        ScriptedDetector::always(captured_grid()),
        ScriptedDetector::never(),
    )
    .unwrap();
    assert!(matches!(
        engine.calibrate_camera_to_projector(),
        Err(CalibrationError::DetectionTimeout { attempts: 3, .. })
    ));
}

#[test]
fn invalid_params_are_rejected_up_front() {
    let res = CalibrationEngine::new(
        CalibrationParams::new(0, 720),
        ScriptedCamera::bright(),
        RecordingProjector::default(),
        ScriptedDetector::never(),
        ScriptedDetector::never(),
    );
    assert!(matches!(res, Err(CalibrationError::InvalidParams(_))));
}

fn enhancing() -> FramePreprocessor {
    FramePreprocessor::passthrough().with_enhance(true)
}

#[test]
fn enhancement_does_not_hide_black_frames() {
    let mut grid_det = ScriptedDetector::always(captured_grid());
    let err = {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::dark_noise(),
            RecordingProjector::default(),
            &mut grid_det,
            ScriptedDetector::never(),
        )
        .unwrap()
        .with_preprocessor(enhancing());
        engine.calibrate_camera_to_projector().unwrap_err()
    };
    assert!(matches!(
        err,
        CalibrationError::DetectionTimeout { attempts: 3, .. }
    ));
    assert_eq!(grid_det.calls, 0);
}

#[test]
fn enhanced_uniform_frames_still_calibrate() {
    let mut grid_det = ScriptedDetector::always(captured_grid());
    let result = {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::showing(GrayImage::filled(160, 90, 128)),
            RecordingProjector::default(),
            &mut grid_det,
            ScriptedDetector::always(detection(table_markers())),
        )
        .unwrap()
        .with_preprocessor(enhancing());
        engine.run().unwrap()
    };
    assert_same_mapping(&result.camera_to_projector, &true_camera_to_projector());
    assert_eq!(grid_det.calls, 1);
    assert!(grid_det.first_pixels.iter().all(|&v| v == 0 || v == 255));
}

#[test]
fn undistortion_is_applied_before_detection() {
    let k = CameraIntrinsics {
        fx: 200.0,
        fy: 200.0,
        cx: 80.0,
        cy: 45.0,
    };
    let map = UndistortMap::new(k, BrownConrady::default(), k, 160, 90).unwrap();
    let mut grid_det = ScriptedDetector::always(captured_grid());
    {
        let mut engine = CalibrationEngine::new(
            params(),
            ScriptedCamera::bright(),
            RecordingProjector::default(),
            &mut grid_det,
            ScriptedDetector::never(),
        )
        .unwrap()
        .with_preprocessor(FramePreprocessor::passthrough().with_undistort(map));
        let h = engine.calibrate_camera_to_projector().unwrap();
        assert_same_mapping(&h, &true_camera_to_projector());
    }
    // Identity lens: the ramp's first pixel survives the remap.
    assert_eq!(grid_det.first_pixels, vec![20]);
}

#[test]
fn undistortion_sized_for_another_camera_is_rejected() {
    let k = CameraIntrinsics {
        fx: 200.0,
        fy: 200.0,
        cx: 32.0,
        cy: 24.0,
    };
    let map = UndistortMap::new(k, BrownConrady::default(), k, 64, 48).unwrap();
    let mut engine = CalibrationEngine::new(
        params(),
        ScriptedCamera::bright(),
        RecordingProjector::default(),
        ScriptedDetector::always(captured_grid()),
        ScriptedDetector::never(),
    )
    .unwrap()
    .with_preprocessor(FramePreprocessor::passthrough().with_undistort(map));
    assert!(matches!(
        engine.run(),
        Err(CalibrationError::InvalidParams(_))
    ));
}

#[test]
fn two_common_markers_are_enough() {
    let grid = grid();
    let pair = detection(
        [0, 100].map(|id| (id, to_camera(grid.marker_set().get(id).unwrap()))),
    );
    let mut engine = CalibrationEngine::new(
        params(),
        ScriptedCamera::bright(),
        RecordingProjector::default(),
        ScriptedDetector::always(pair),
        ScriptedDetector::never(),
    )
    .unwrap();
    let h = engine.calibrate_camera_to_projector().unwrap();
    assert_same_mapping(&h, &true_camera_to_projector());
}
