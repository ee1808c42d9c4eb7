#![allow(dead_code)]

use checkin_signals::schema::FrameRecord;
use checkin_signals::types::{Landmark, LandmarkFrame, Point};

/// Synthetic face with eye aspect ratio `ear` on both eyes, brow ratio 0.2,
/// jaw ratio 0.3 and a flat mouth.
pub fn face(nose: Point, ear: f64) -> LandmarkFrame {
    let gap = ear * 0.1 / 2.0;
    let eye = |outer: f64, inner: f64| {
        let (a, b) = if outer < inner {
            (outer + 0.03, outer + 0.07)
        } else {
            (outer - 0.03, outer - 0.07)
        };
        [
            (outer, 0.40),
            (inner, 0.40),
            (a, 0.40 - gap),
            (a, 0.40 + gap),
            (b, 0.40 - gap),
            (b, 0.40 + gap),
        ]
    };
    let left = eye(0.25, 0.35);
    let right = eye(0.75, 0.65);
    let p = |(x, y): (f64, f64)| Point::new(x, y);

    LandmarkFrame::from_named(&[
        (Landmark::NoseTip, nose),
        (Landmark::UpperLipCenter, Point::new(0.5, 0.69)),
        (Landmark::LowerLipCenter, Point::new(0.5, 0.71)),
        (Landmark::MouthCornerLeft, Point::new(0.35, 0.70)),
        (Landmark::MouthCornerRight, Point::new(0.65, 0.70)),
        (Landmark::BrowLeft, Point::new(0.40, 0.30)),
        (Landmark::BrowRight, Point::new(0.60, 0.30)),
        (Landmark::FaceEdgeLeft, Point::new(0.0, 0.5)),
        (Landmark::FaceEdgeRight, Point::new(1.0, 0.5)),
        (Landmark::LeftEyeOuterCorner, p(left[0])),
        (Landmark::LeftEyeInnerCorner, p(left[1])),
        (Landmark::LeftEyeUpperA, p(left[2])),
        (Landmark::LeftEyeLowerA, p(left[3])),
        (Landmark::LeftEyeUpperB, p(left[4])),
        (Landmark::LeftEyeLowerB, p(left[5])),
        (Landmark::RightEyeOuterCorner, p(right[0])),
        (Landmark::RightEyeInnerCorner, p(right[1])),
        (Landmark::RightEyeUpperA, p(right[2])),
        (Landmark::RightEyeLowerA, p(right[3])),
        (Landmark::RightEyeUpperB, p(right[4])),
        (Landmark::RightEyeLowerB, p(right[5])),
    ])
}

pub fn still_faces(count: u64, ear: f64) -> Vec<FrameRecord> {
    (0..count)
        .map(|i| FrameRecord::with_face(i, i as f64 * 1000.0, face(Point::new(0.5, 0.5), ear)))
        .collect()
}
