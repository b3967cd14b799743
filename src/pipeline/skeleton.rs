use crate::types::{Frame, HandLandmarks, LandmarkPoint, PoseLandmarks};

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    // face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // torso
    (11, 12),
    (11, 23),
    (12, 24),
    (23, 24),
    // arms
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    // legs
    (23, 25),
    (25, 27),
    (27, 29),
    (27, 31),
    (29, 31),
    (24, 26),
    (26, 28),
    (28, 30),
    (28, 32),
    (30, 32),
];

const POSE_LINE_COLOR: [u8; 4] = [240, 240, 240, 255];
const POSE_POINT_COLOR: [u8; 4] = [248, 113, 113, 255];
const HAND_LINE_COLOR: [u8; 4] = [56, 189, 248, 255];
const HAND_POINT_COLOR: [u8; 4] = [250, 204, 21, 255];
// Pose joints the model marks as hidden are not drawn.
const MIN_VISIBILITY: f32 = 0.5;

/// Line thickness scaled with the frame so 720p previews stay readable.
fn line_thickness(frame: &Frame) -> i32 {
    (frame.width.max(frame.height) / 320).max(2) as i32
}

pub fn draw_pose(frame: &mut Frame, pose: &PoseLandmarks) {
    let thickness = line_thickness(frame);
    let visible = |p: &LandmarkPoint| p.visibility.is_none_or(|v| v >= MIN_VISIBILITY);
    let points = pose.points();
    draw_skeleton(
        frame,
        points,
        POSE_CONNECTIONS,
        visible,
        thickness,
        (POSE_LINE_COLOR, POSE_POINT_COLOR),
    );
}

pub fn draw_hand(frame: &mut Frame, hand: &HandLandmarks) {
    let thickness = line_thickness(frame);
    draw_skeleton(
        frame,
        hand.points(),
        HAND_CONNECTIONS,
        |_| true,
        thickness,
        (HAND_LINE_COLOR, HAND_POINT_COLOR),
    );
}

fn draw_skeleton<F>(
    frame: &mut Frame,
    points: &[LandmarkPoint],
    connections: &[(usize, usize)],
    visible: F,
    thickness: i32,
    (line_color, point_color): ([u8; 4], [u8; 4]),
) where
    F: Fn(&LandmarkPoint) -> bool,
{
    let (width, height) = (frame.width, frame.height);
    let to_pixels = |p: &LandmarkPoint| p.to_pixels(width, height);

    for &(a, b) in connections {
        if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
            if visible(pa) && visible(pb) {
                draw_line(frame, to_pixels(pa), to_pixels(pb), line_color, thickness);
            }
        }
    }

    let radius = thickness + 1;
    for point in points.iter().filter(|p| visible(*p)) {
        let (x, y) = to_pixels(point);
        draw_circle(frame, (x as i32, y as i32), radius, point_color);
    }
}

fn draw_line(frame: &mut Frame, p0: (f32, f32), p1: (f32, f32), color: [u8; 4], thickness: i32) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if ox.abs() + oy.abs() <= radius {
                    put_pixel(frame, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(frame: &mut Frame, (cx, cy): (i32, i32), radius: i32, color: [u8; 4]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel(frame: &mut Frame, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as u32 >= frame.width || y as u32 >= frame.height {
        return;
    }
    let idx = (y as usize * frame.width as usize + x as usize) * 4;
    if let Some(px) = frame.rgba.get_mut(idx..idx + 4) {
        px.copy_from_slice(&color);
    }
}
