//! Five-point similarity alignment to the ArcFace 112×112 template.

use crate::preprocess::CanonicalImage;

pub const ALIGNED_SIZE: usize = 112;

/// ArcFace reference landmarks for a 112×112 crop.
const TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Similarity transform `dst = [[a, -b], [b, a]] · src + (tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

/// Closed-form least-squares (Umeyama without reflection) fit of `src` onto `dst`.
pub fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    };
    let (smx, smy) = mean(src);
    let (dmx, dmy) = mean(dst);

    // Accumulate Σ (s·d), Σ (s×d), Σ |s|² over centred points.
    let (mut dot, mut cross, mut var) = (0.0f32, 0.0f32, 0.0f32);
    for (s, d) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (s.0 - smx, s.1 - smy);
        let (dx, dy) = (d.0 - dmx, d.1 - dmy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        var += sx * sx + sy * sy;
    }

    if var < 1e-12 {
        return Similarity {
            a: 1.0,
            b: 0.0,
            tx: dmx - smx,
            ty: dmy - smy,
        };
    }

    let a = dot / var;
    let b = cross / var;
    Similarity {
        a,
        b,
        tx: dmx - (a * smx - b * smy),
        ty: dmy - (b * smx + a * smy),
    }
}

/// Warp the face described by `landmarks` into a 112×112 BGR crop.
///
/// Uses inverse mapping with bilinear sampling; samples outside the image are black.
pub fn align_face(image: &CanonicalImage, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let t = estimate_similarity(landmarks, &TEMPLATE);
    let det = t.a * t.a + t.b * t.b;
    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];
    if det < 1e-12 {
        return out;
    }

    let (w, h) = (image.width as i32, image.height as i32);
    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.data[(y as usize * w as usize + x as usize) * 3 + c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let dx = ox as f32 - t.tx;
            let dy = oy as f32 - t.ty;
            let sx = (t.a * dx + t.b * dy) / det;
            let sy = (-t.b * dx + t.a * dy) / det;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..3 {
                let v = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                out[(oy * ALIGNED_SIZE + ox) * 3 + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fit() {
        let t = estimate_similarity(&TEMPLATE, &TEMPLATE);
        assert!((t.a - 1.0).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_double_scale_fit() {
        let src = TEMPLATE.map(|(x, y)| (x * 2.0 + 10.0, y * 2.0 - 4.0));
        let t = estimate_similarity(&src, &TEMPLATE);
        assert!((t.a - 0.5).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4);
        assert!((t.tx + 5.0).abs() < 1e-2, "tx = {}", t.tx);
        assert!((t.ty - 2.0).abs() < 1e-2, "ty = {}", t.ty);
    }

    #[test]
    fn test_aligned_crop_size() {
        let img = CanonicalImage::new(200, 150, vec![90; 200 * 150 * 3]).unwrap();
        let crop = align_face(&img, &TEMPLATE);
        assert_eq!(crop.len(), ALIGNED_SIZE * ALIGNED_SIZE * 3);
        // Template landmarks on a uniform image sample the image everywhere.
        assert_eq!(&crop[0..3], &[90, 90, 90]);
    }

    #[test]
    fn test_bright_patch_lands_on_template_eye() {
        let (w, h) = (200usize, 200usize);
        let mut data = vec![0u8; w * h * 3];
        let src = [(80.0, 60.0), (120.0, 60.0), (100.0, 85.0), (85.0, 110.0), (115.0, 110.0)];
        for y in 58..63 {
            for x in 78..83 {
                data[(y * w + x) * 3..(y * w + x) * 3 + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let img = CanonicalImage::new(w as u32, h as u32, data).unwrap();
        let crop = align_face(&img, &src);

        let (ex, ey) = (TEMPLATE[0].0.round() as usize, TEMPLATE[0].1.round() as usize);
        let mut brightest = 0u8;
        for y in ey - 1..=ey + 1 {
            for x in ex - 1..=ex + 1 {
                brightest = brightest.max(crop[(y * ALIGNED_SIZE + x) * 3]);
            }
        }
        assert!(brightest > 100, "max near template eye = {brightest}");
    }
}
