//! Joint-angle geometry and per-pose evaluation.
//!
//! Pure functions: no state is kept between frames.  Every joint in the
//! pose criteria produces exactly one `AngleDetail`, in criteria order,
//! whether or not its angle could be measured.

use std::collections::HashMap;

use tracing::debug;

use super::config::{JointCriterion, JointDefinition, RangeCheck};
use super::landmarks::{LandmarkIndex, LandmarkPoint};

/// Landmarks at or below this visibility are treated as hidden.
pub const VISIBILITY_THRESHOLD: f32 = 0.3;

/// Angle reported when a joint could not be measured.
pub const UNDETERMINED_ANGLE: f64 = -1.0;

// ── Types ──────────────────────────────────────────────────

/// Display frame size used to scale normalized points to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSize {
    pub width: f32,
    pub height: f32,
}

impl FrameSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A joint point in pixel space, for overlay drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

/// Overlay color tag for a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointColor {
    Correct,
    Incorrect,
}

impl JointColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }
}

/// Per-joint, per-frame evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleDetail {
    /// Joint name from the criteria.
    pub name: String,
    /// Measured angle in degrees, or `UNDETERMINED_ANGLE`.
    pub angle: f64,
    pub is_correct: bool,
    /// Corrective or diagnostic text; `None` when correct.
    pub feedback: Option<String>,
    /// A, B (vertex), C scaled to the frame.  `None` when the landmarks could not be located.
    pub points: Option<[PixelPoint; 3]>,
    pub color: JointColor,
}

impl AngleDetail {
    fn undetermined(name: &str, feedback: String) -> Self {
        Self {
            name: name.to_string(),
            angle: UNDETERMINED_ANGLE,
            is_correct: false,
            feedback: Some(feedback),
            points: None,
            color: JointColor::Incorrect,
        }
    }

    /// Whether an angle was actually measured for this joint.
    pub fn is_determined(&self) -> bool {
        self.angle >= 0.0
    }
}

/// Result of evaluating one frame against one pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEvaluation {
    pub details: Vec<AngleDetail>,
    /// AND across every joint; a single failing or undetermined joint fails the pose.
    pub all_correct: bool,
}

impl PoseEvaluation {
    /// Feedback lines of incorrect joints, in criteria order.
    pub fn feedback(&self) -> impl Iterator<Item = &str> {
        self.details
            .iter()
            .filter(|d| !d.is_correct)
            .filter_map(|d| d.feedback.as_deref())
    }
}

// ── Angle math ─────────────────────────────────────────────

/// Angle at vertex `p2` between rays to `p1` and `p3`, in degrees (0-180).
///
/// Uses the 2D (x, y) projection; `z` is ignored.  Returns 0 when either
/// ray has zero length.
pub fn angle_between(p1: &LandmarkPoint, p2: &LandmarkPoint, p3: &LandmarkPoint) -> f64 {
    let v1 = (p1.x as f64 - p2.x as f64, p1.y as f64 - p2.y as f64);
    let v2 = (p3.x as f64 - p2.x as f64, p3.y as f64 - p2.y as f64);

    let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if len1 == 0.0 || len2 == 0.0 {
        return 0.0;
    }

    // Clamp: rounding can push the cosine just outside [-1, 1] and acos would yield NaN.
    let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (len1 * len2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

// ── Pose evaluation ────────────────────────────────────────

/// Evaluate one landmark frame against a pose's joint criteria.
///
/// `frame` is `None` (or empty) when no body was detected; every joint then
/// reports "not found".  Faults in one joint never abort the others.
pub fn evaluate_pose(
    frame: Option<&[LandmarkPoint]>,
    criteria: &[(String, JointCriterion)],
    joint_defs: &HashMap<String, JointDefinition>,
    landmarks: &LandmarkIndex,
    size: FrameSize,
    tolerance_deg: f64,
) -> PoseEvaluation {
    let frame = frame.unwrap_or(&[]);
    let mut details = Vec::with_capacity(criteria.len());
    let mut all_correct = true;

    for (name, criterion) in criteria {
        let detail = evaluate_joint(frame, name, criterion, joint_defs, landmarks, size, tolerance_deg);
        all_correct &= detail.is_correct;
        details.push(detail);
    }

    PoseEvaluation {
        details,
        all_correct,
    }
}

fn evaluate_joint(
    frame: &[LandmarkPoint],
    name: &str,
    criterion: &JointCriterion,
    joint_defs: &HashMap<String, JointDefinition>,
    landmarks: &LandmarkIndex,
    size: FrameSize,
    tolerance_deg: f64,
) -> AngleDetail {
    let label = name.replace('_', " ");

    let indices = joint_defs.get(name).and_then(|def| {
        let l = &def.landmarks;
        Some([
            landmarks.resolve(&l.a)?,
            landmarks.resolve(&l.b)?,
            landmarks.resolve(&l.c)?,
        ])
    });
    let Some(indices) = indices else {
        debug!(joint = name, "joint definition could not be resolved");
        return AngleDetail::undetermined(name, format!("Definition error for {label}"));
    };

    let (Some(a), Some(b), Some(c)) = (
        frame.get(indices[0]),
        frame.get(indices[1]),
        frame.get(indices[2]),
    ) else {
        return AngleDetail::undetermined(name, format!("{label} not found on body"));
    };

    let points = [to_pixels(a, size), to_pixels(b, size), to_pixels(c, size)];

    let hidden = [a, b, c]
        .iter()
        .any(|p| p.visibility_or_zero() <= VISIBILITY_THRESHOLD);
    let angle = angle_between(a, b, c);
    // Non-finite coordinates yield a NaN angle; never score it.
    if hidden || !angle.is_finite() {
        let mut detail = AngleDetail::undetermined(name, format!("{label} not clearly visible"));
        detail.points = Some(points);
        return detail;
    }

    let check = criterion.check(angle, tolerance_deg);
    let is_correct = check == RangeCheck::InRange;

    AngleDetail {
        name: name.to_string(),
        angle,
        is_correct,
        feedback: criterion.feedback_for(check).map(str::to_string),
        points: Some(points),
        color: if is_correct {
            JointColor::Correct
        } else {
            JointColor::Incorrect
        },
    }
}

fn to_pixels(p: &LandmarkPoint, size: FrameSize) -> PixelPoint {
    PixelPoint {
        x: p.x * size.width,
        y: p.y * size.height,
    }
}

// ── Test helpers ───────────────────────────────────────────

/// A frame of fully visible points, all at the origin.
#[cfg(test)]
pub(crate) fn make_frame() -> Vec<LandmarkPoint> {
    vec![LandmarkPoint::visible(0.0, 0.0); super::landmarks::LANDMARK_COUNT]
}

#[cfg(test)]
pub(crate) fn set_point(frame: &mut [LandmarkPoint], landmark: super::landmarks::BodyLandmark, x: f32, y: f32) {
    frame[landmark.index()] = LandmarkPoint::visible(x, y);
}

/// Place shoulder/elbow/wrist so the elbow forms `angle_deg`.
#[cfg(test)]
pub(crate) fn bend_arm(frame: &mut [LandmarkPoint], left: bool, angle_deg: f64) {
    use super::landmarks::BodyLandmark as L;
    let (shoulder, elbow, wrist) = if left {
        (L::LeftShoulder, L::LeftElbow, L::LeftWrist)
    } else {
        (L::RightShoulder, L::RightElbow, L::RightWrist)
    };
    let (ex, ey) = (0.5f64, 0.5f64);
    let r = 0.2f64;
    let theta = angle_deg.to_radians();
    set_point(frame, shoulder, (ex - r) as f32, ey as f32);
    set_point(frame, elbow, ex as f32, ey as f32);
    set_point(
        frame,
        wrist,
        (ex - r * theta.cos()) as f32,
        (ey - r * theta.sin()) as f32,
    );
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::config::{ExerciseConfig, SAMPLE_DOCUMENT};
    use crate::coach::landmarks::BodyLandmark;

    fn pt(x: f32, y: f32) -> LandmarkPoint {
        LandmarkPoint::visible(x, y)
    }

    fn sample_config() -> ExerciseConfig {
        ExerciseConfig::from_json_str(SAMPLE_DOCUMENT).unwrap()
    }

    fn evaluate(config: &ExerciseConfig, pose: &str, frame: Option<&[LandmarkPoint]>, tolerance: f64) -> PoseEvaluation {
        evaluate_pose(
            frame,
            &config.pose(pose).unwrap().criteria,
            config.joint_definitions(),
            config.landmarks(),
            FrameSize::new(640.0, 480.0),
            tolerance,
        )
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_between(&pt(0.0, 1.0), &pt(0.0, 0.0), &pt(1.0, 0.0));
        assert!((angle - 90.0).abs() < 1e-9, "got {angle}");
    }

    #[test]
    fn test_colinear_is_exactly_180() {
        let angle = angle_between(&pt(0.0, 0.5), &pt(0.5, 0.5), &pt(1.0, 0.5));
        assert_eq!(angle, 180.0);
    }

    #[test]
    fn test_degenerate_rays_return_zero() {
        let a = pt(0.3, 0.3);
        let b = pt(0.6, 0.2);
        assert_eq!(angle_between(&a, &a, &b), 0.0);
        assert_eq!(angle_between(&b, &a, &a), 0.0);
    }

    #[test]
    fn test_symmetric_under_endpoint_swap() {
        let p1 = pt(0.12, 0.87);
        let p2 = pt(0.45, 0.33);
        let p3 = pt(0.91, 0.58);
        assert_eq!(angle_between(&p1, &p2, &p3), angle_between(&p3, &p2, &p1));
    }

    #[test]
    fn test_ignores_depth() {
        let mut a = pt(0.0, 1.0);
        let b = pt(0.0, 0.0);
        let c = pt(1.0, 0.0);
        let flat = angle_between(&a, &b, &c);
        a.z = Some(5.0);
        assert_eq!(angle_between(&a, &b, &c), flat);
    }

    #[test]
    fn test_never_nan_for_nearly_colinear() {
        let angle = angle_between(&pt(0.1, 0.1), &pt(0.2, 0.2), &pt(0.3000001, 0.3000001));
        assert!(!angle.is_nan());
        assert!((0.0..=180.0).contains(&angle));
    }

    #[test]
    fn test_absent_frame_reports_not_found_for_every_joint() {
        let config = sample_config();
        for frame in [None, Some(&[][..])] {
            let eval = evaluate(&config, "arms_straight", frame, 10.0);
            assert!(!eval.all_correct);
            assert_eq!(eval.details.len(), 2);
            for detail in &eval.details {
                assert_eq!(detail.angle, UNDETERMINED_ANGLE);
                assert!(!detail.is_correct);
                assert!(detail.feedback.as_deref().unwrap().contains("not found"));
                assert!(detail.points.is_none());
            }
        }
    }

    #[test]
    fn test_all_correct_with_straight_arms() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 175.0);
        bend_arm(&mut frame, false, 170.0);

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        assert!(eval.all_correct, "details: {:?}", eval.details);
        assert_eq!(eval.feedback().count(), 0);
        for detail in &eval.details {
            assert_eq!(detail.color, JointColor::Correct);
            assert!(detail.feedback.is_none());
        }
    }

    #[test]
    fn test_one_bent_arm_fails_pose_with_below_min_feedback() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 90.0);
        bend_arm(&mut frame, false, 178.0);

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        assert!(!eval.all_correct);
        // criteria order: right_elbow first, then left_elbow
        assert_eq!(eval.details[0].name, "right_elbow");
        assert!(eval.details[0].is_correct);
        assert_eq!(eval.details[1].name, "left_elbow");
        assert!(!eval.details[1].is_correct);
        assert_eq!(eval.details[1].color, JointColor::Incorrect);
        assert!((eval.details[1].angle - 90.0).abs() < 1e-3);
        let feedback: Vec<&str> = eval.feedback().collect();
        assert_eq!(feedback, ["Straighten your left arm"]);
    }

    #[test]
    fn test_tolerance_widens_range() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 145.0);
        bend_arm(&mut frame, false, 145.0);

        assert!(evaluate(&config, "arms_straight", Some(&frame), 20.0).all_correct);
        assert!(!evaluate(&config, "arms_straight", Some(&frame), 10.0).all_correct);
    }

    #[test]
    fn test_low_visibility_is_undetermined() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 175.0);
        bend_arm(&mut frame, false, 175.0);
        frame[BodyLandmark::LeftWrist.index()].visibility = Some(VISIBILITY_THRESHOLD);
        frame[BodyLandmark::RightWrist.index()].visibility = None;

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        assert!(!eval.all_correct);
        for detail in &eval.details {
            assert!(!detail.is_determined());
            assert!(detail.feedback.as_deref().unwrap().contains("not clearly visible"));
            assert_eq!(detail.color, JointColor::Incorrect);
            // Hidden joints still carry their points for the overlay.
            assert!(detail.points.is_some());
        }
    }

    #[test]
    fn test_non_finite_coordinate_is_never_correct() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 175.0);
        bend_arm(&mut frame, false, 175.0);
        frame[BodyLandmark::LeftWrist.index()].x = f32::NAN;
        frame[BodyLandmark::RightWrist.index()].y = f32::INFINITY;

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        assert!(!eval.all_correct);
        for detail in &eval.details {
            assert!(!detail.is_correct);
            assert_eq!(detail.angle, UNDETERMINED_ANGLE);
            assert!(detail.feedback.as_deref().unwrap().contains("not clearly visible"));
        }
    }

    #[test]
    fn test_short_frame_reports_missing_joint_only() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 175.0);
        bend_arm(&mut frame, false, 175.0);
        // Drop everything from the left hip onward; elbows stay intact.
        frame.truncate(BodyLandmark::LeftHip.index());

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        assert!(eval.all_correct);

        let eval = evaluate(&config, "knee_bend", Some(&frame), 10.0);
        assert!(!eval.all_correct);
        assert_eq!(eval.details[0].feedback.as_deref(), Some("left knee not found on body"));
    }

    #[test]
    fn test_unresolved_definition_does_not_abort_siblings() {
        let config = sample_config();
        let mut criteria = config.pose("arms_straight").unwrap().criteria.clone();
        let extra = criteria[0].1.clone();
        criteria.insert(0, ("left_antenna".to_string(), extra));

        let mut frame = make_frame();
        bend_arm(&mut frame, true, 175.0);
        bend_arm(&mut frame, false, 175.0);

        let eval = evaluate_pose(
            Some(&frame),
            &criteria,
            config.joint_definitions(),
            config.landmarks(),
            FrameSize::new(640.0, 480.0),
            10.0,
        );
        assert!(!eval.all_correct);
        assert_eq!(eval.details.len(), 3);
        assert_eq!(eval.details[0].feedback.as_deref(), Some("Definition error for left antenna"));
        assert!(eval.details[1].is_correct);
        assert!(eval.details[2].is_correct);
    }

    #[test]
    fn test_points_scaled_to_pixels() {
        let config = sample_config();
        let mut frame = make_frame();
        bend_arm(&mut frame, true, 90.0);
        bend_arm(&mut frame, false, 90.0);

        let eval = evaluate(&config, "arms_straight", Some(&frame), 10.0);
        let points = eval.details[0].points.unwrap();
        // vertex (elbow) is at (0.5, 0.5)
        assert!((points[1].x - 320.0).abs() < 1e-3);
        assert!((points[1].y - 240.0).abs() < 1e-3);
        // shoulder at (0.3, 0.5)
        assert!((points[0].x - 192.0).abs() < 1e-3);
    }

    #[test]
    fn test_color_as_str() {
        assert_eq!(JointColor::Correct.as_str(), "correct");
        assert_eq!(JointColor::Incorrect.as_str(), "incorrect");
    }
}
