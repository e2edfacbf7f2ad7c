//! Completeness gate: the face must sit inside the frame with a margin and
//! have plausible proportions.

use super::CapturePolicy;
use crate::analysis::FaceRegion;

pub(crate) fn has_area(region: &FaceRegion) -> bool {
    region.width > 0 && region.height > 0
}

/// `Err` carries the human-readable cause.
pub(crate) fn check_completeness(
    region: &FaceRegion,
    frame_width: u32,
    frame_height: u32,
    policy: &CapturePolicy,
) -> Result<(), String> {
    let frame_w = i64::from(frame_width);
    let frame_h = i64::from(frame_height);
    let right = region.x.saturating_add(region.width);
    let bottom = region.y.saturating_add(region.height);

    if region.x < 0 || region.y < 0 || right > frame_w || bottom > frame_h {
        return Err("face extends beyond the image frame".to_string());
    }

    let margin_x = policy.edge_margin() * frame_w as f64;
    let margin_y = policy.edge_margin() * frame_h as f64;
    let edges = [
        ("left", region.x as f64, margin_x),
        ("top", region.y as f64, margin_y),
        ("right", (frame_w - right) as f64, margin_x),
        ("bottom", (frame_h - bottom) as f64, margin_y),
    ];
    for (edge, gap, required) in edges {
        if gap < required {
            return Err(format!("face is too close to the {edge} edge of the image"));
        }
    }

    let ratio = region.width as f64 / region.height as f64;
    if ratio < policy.min_aspect() || ratio > policy.max_aspect() {
        return Err(format!(
            "face proportions look cut off (width/height ratio {ratio:.2})"
        ));
    }
    Ok(())
}
