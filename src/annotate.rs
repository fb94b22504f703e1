// src/annotate.rs
//
// Detection overlay for annotated images and videos.
// Green box for compliant faces, red for violations. Above each box sits
// a dark badge whose coloured fill grows with the classifier confidence.

use crate::types::{BBox, Detection, Frame};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const COMPLIANT: Rgb<u8> = Rgb([40, 200, 60]);
const VIOLATION: Rgb<u8> = Rgb([220, 40, 40]);
const BADGE_BG: Rgb<u8> = Rgb([15, 15, 15]);

const BOX_THICKNESS: i32 = 2;
const BADGE_HEIGHT: i32 = 6;

pub fn color_for(detection: &Detection) -> Rgb<u8> {
    if detection.label.is_violation() {
        VIOLATION
    } else {
        COMPLIANT
    }
}

/// Copy of `frame` with every detection drawn on it.
/// Frames whose buffer does not match their size are returned untouched.
pub fn draw_detections(frame: &Frame, detections: &[Detection]) -> Frame {
    if detections.is_empty() || frame.is_empty() {
        return frame.clone();
    }
    let Some(mut img) = frame.to_rgb_image() else {
        return frame.clone();
    };

    for det in detections {
        let Some(bbox) = det.bbox.clamp_to(frame.width, frame.height) else {
            continue;
        };
        draw_box(&mut img, &bbox, color_for(det));
        draw_badge(&mut img, &bbox, det.confidence, color_for(det));
    }

    Frame::from_rgb_image(img, frame.timestamp_ms)
}

fn rect(x: i32, y: i32, w: i32, h: i32) -> Option<Rect> {
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(Rect::at(x, y).of_size(w as u32, h as u32))
}

fn draw_box(img: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    for t in 0..BOX_THICKNESS {
        if let Some(r) = rect(
            bbox.x1 + t,
            bbox.y1 + t,
            bbox.width() - 2 * t,
            bbox.height() - 2 * t,
        ) {
            draw_hollow_rect_mut(img, r, color);
        }
    }
}

fn draw_badge(img: &mut RgbImage, bbox: &BBox, confidence: f32, color: Rgb<u8>) {
    // above the box, or inside its top edge when there is no room
    let y = if bbox.y1 >= BADGE_HEIGHT + 2 {
        bbox.y1 - BADGE_HEIGHT - 2
    } else {
        bbox.y1
    };
    let width = bbox.width();
    let filled = ((width as f32) * confidence.clamp(0.0, 1.0)).round() as i32;

    if let Some(r) = rect(bbox.x1, y, width, BADGE_HEIGHT) {
        draw_filled_rect_mut(img, r, BADGE_BG);
    }
    if let Some(r) = rect(bbox.x1, y, filled.max(1), BADGE_HEIGHT) {
        draw_filled_rect_mut(img, r, color);
    }
}
