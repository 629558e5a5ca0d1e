//! Image preprocessing — channel normalization, size bound, CLAHE on L*.
//!
//! Every step is a pure function over [`CanonicalImage`] so each can be
//! exercised without a face-analysis backend.

use image::DynamicImage;
use thiserror::Error;

/// Largest allowed width or height before downscaling.
pub const MAX_DIMENSION: u32 = 1920;

/// Below this, L* uses the linear segment of the CIE curve.
const LAB_EPSILON: f32 = 0.008856;
const LAB_KAPPA: f32 = 903.3;
/// D65 reference white.
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("pixel buffer length {actual} does not match {width}x{height}x3")]
    BufferSize { width: u32, height: u32, actual: usize },
    #[error("invalid CLAHE parameters: {0}")]
    InvalidClahe(String),
}

/// 8-bit, 3-channel, BGR-interleaved raster — the layout the face-analysis
/// capability consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImage {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major, B G R per pixel.
    pub data: Vec<u8>,
}

impl CanonicalImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PreprocessError> {
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage);
        }
        if data.len() != width as usize * height as usize * 3 {
            return Err(PreprocessError::BufferSize {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// BGR triple at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Before/after dimensions of a downscale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeReport {
    pub from: (u32, u32),
    pub to: (u32, u32),
}

/// Contrast-Limited Adaptive Histogram Equalization settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip as a multiple of the mean bin height. `<= 0` disables clipping.
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

/// Decode an encoded photo (JPEG, PNG, ...) from memory.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Full pipeline: canonical channels, bounded size, contrast enhancement.
pub fn preprocess(image: &DynamicImage) -> Result<CanonicalImage, PreprocessError> {
    let canonical = to_canonical(image)?;
    let (bounded, report) = bound_dimensions(&canonical, MAX_DIMENSION)?;
    if let Some(r) = report {
        tracing::info!(
            from_width = r.from.0,
            from_height = r.from.1,
            to_width = r.to.0,
            to_height = r.to.1,
            "image resized"
        );
    }
    enhance_contrast(&bounded, &ClaheParams::default())
}

/// Convert any decoded image to BGR. Alpha is dropped; grayscale and
/// high-bit-depth inputs are first widened to 8-bit RGB.
pub fn to_canonical(image: &DynamicImage) -> Result<CanonicalImage, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage);
    }

    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    if image.color().has_alpha() {
        for p in image.to_rgba8().pixels() {
            data.extend_from_slice(&[p[2], p[1], p[0]]);
        }
    } else {
        for p in image.to_rgb8().pixels() {
            data.extend_from_slice(&[p[2], p[1], p[0]]);
        }
    }

    CanonicalImage::new(width, height, data)
}

/// Downscale so that neither side exceeds `max_dimension`, preserving aspect
/// ratio. Returns the input unchanged (and no report) when already in bounds.
pub fn bound_dimensions(
    image: &CanonicalImage,
    max_dimension: u32,
) -> Result<(CanonicalImage, Option<ResizeReport>), PreprocessError> {
    let (w, h) = (image.width, image.height);
    if w.max(h) <= max_dimension {
        return Ok((image.clone(), None));
    }

    let scale = max_dimension as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);
    let resized = resize_area(image, new_w, new_h)?;

    Ok((
        resized,
        Some(ResizeReport {
            from: (w, h),
            to: (new_w, new_h),
        }),
    ))
}

/// Area-averaging resample: each output pixel is the coverage-weighted mean
/// of the source pixels its footprint overlaps.
pub fn resize_area(
    image: &CanonicalImage,
    new_width: u32,
    new_height: u32,
) -> Result<CanonicalImage, PreprocessError> {
    if new_width == 0 || new_height == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    let src_w = image.width as usize;
    let x_weights = axis_weights(src_w, new_width as usize);
    let y_weights = axis_weights(image.height as usize, new_height as usize);

    let mut data = Vec::with_capacity(new_width as usize * new_height as usize * 3);
    for ys in &y_weights {
        for xs in &x_weights {
            let mut acc = [0f32; 3];
            for &(sy, wy) in ys {
                let row = sy * src_w;
                for &(sx, wx) in xs {
                    let w = wy * wx;
                    let i = (row + sx) * 3;
                    acc[0] += image.data[i] as f32 * w;
                    acc[1] += image.data[i + 1] as f32 * w;
                    acc[2] += image.data[i + 2] as f32 * w;
                }
            }
            for v in acc {
                data.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    CanonicalImage::new(new_width, new_height, data)
}

/// For each destination index, the source indices it covers and their
/// normalized coverage weights.
fn axis_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);
            let span = end - start;
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 1e-9).then(|| (s, (overlap / span) as f32))
                })
                .collect()
        })
        .collect()
}

/// Equalize luminance only: BGR → L*a*b*, CLAHE on L*, back to BGR.
pub fn enhance_contrast(
    image: &CanonicalImage,
    params: &ClaheParams,
) -> Result<CanonicalImage, PreprocessError> {
    let pixels = image.width as usize * image.height as usize;
    let mut l = Vec::with_capacity(pixels);
    let mut a = Vec::with_capacity(pixels);
    let mut b = Vec::with_capacity(pixels);
    for px in image.data.chunks_exact(3) {
        let lab = bgr_to_lab([px[0], px[1], px[2]]);
        l.push(lab[0]);
        a.push(lab[1]);
        b.push(lab[2]);
    }

    clahe(&mut l, image.width, image.height, params)?;

    let mut data = Vec::with_capacity(pixels * 3);
    for i in 0..pixels {
        data.extend_from_slice(&lab_to_bgr([l[i], a[i], b[i]]));
    }
    CanonicalImage::new(image.width, image.height, data)
}

/// Apply CLAHE to a single 8-bit plane in place.
///
/// The plane is split into `tiles_x × tiles_y` tiles (fewer when the image is
/// smaller than the grid). Each tile gets a clipped histogram and a CDF lookup
/// table; pixels are mapped by bilinear interpolation between the tables of
/// the four nearest tile centres.
pub fn clahe(
    plane: &mut [u8],
    width: u32,
    height: u32,
    params: &ClaheParams,
) -> Result<(), PreprocessError> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    if plane.len() != w * h {
        return Err(PreprocessError::InvalidClahe(format!(
            "plane has {} bytes, expected {}",
            plane.len(),
            w * h
        )));
    }
    if params.tiles_x == 0 || params.tiles_y == 0 {
        return Err(PreprocessError::InvalidClahe(format!(
            "tile grid {}x{} is empty",
            params.tiles_x, params.tiles_y
        )));
    }

    let tx = (params.tiles_x as usize).min(w);
    let ty = (params.tiles_y as usize).min(h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity(tx * ty);
    for row in 0..ty {
        let (y0, y1) = (row * h / ty, (row + 1) * h / ty);
        for col in 0..tx {
            let (x0, x1) = (col * w / tx, (col + 1) * w / tx);
            let tile_pixels = (y1 - y0) * (x1 - x0);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &p in &plane[y * w + x0..y * w + x1] {
                    hist[p as usize] += 1;
                }
            }

            if params.clip_limit > 0.0 {
                let clip = ((params.clip_limit * tile_pixels as f32 / 256.0) as u32).max(1);
                let mut excess = 0u32;
                for bin in hist.iter_mut() {
                    if *bin > clip {
                        excess += *bin - clip;
                        *bin = clip;
                    }
                }
                let redist = excess / 256;
                let mut leftover = (excess % 256) as usize;
                for bin in hist.iter_mut() {
                    *bin += redist;
                }
                // Spread the remainder evenly across the range.
                if leftover > 0 {
                    let step = (256 / leftover).max(1);
                    for bin in hist.iter_mut().step_by(step) {
                        if leftover == 0 {
                            break;
                        }
                        *bin += 1;
                        leftover -= 1;
                    }
                }
            }

            let scale = 255.0 / tile_pixels as f32;
            let mut lut = [0u8; 256];
            let mut sum = 0u32;
            for (i, &count) in hist.iter().enumerate() {
                sum += count;
                lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
            }
            luts.push(lut);
        }
    }

    let tile_w = w as f32 / tx as f32;
    let tile_h = h as f32 / ty as f32;
    for y in 0..h {
        let fy = (y as f32 / tile_h - 0.5).clamp(0.0, (ty - 1) as f32);
        let r0 = fy as usize;
        let r1 = (r0 + 1).min(ty - 1);
        let dy = fy - r0 as f32;

        for x in 0..w {
            let fx = (x as f32 / tile_w - 0.5).clamp(0.0, (tx - 1) as f32);
            let c0 = fx as usize;
            let c1 = (c0 + 1).min(tx - 1);
            let dx = fx - c0 as f32;

            let p = plane[y * w + x] as usize;
            let tl = luts[r0 * tx + c0][p] as f32;
            let tr = luts[r0 * tx + c1][p] as f32;
            let bl = luts[r1 * tx + c0][p] as f32;
            let br = luts[r1 * tx + c1][p] as f32;

            let top = tl * (1.0 - dx) + tr * dx;
            let bot = bl * (1.0 - dx) + br * dx;
            plane[y * w + x] = (top * (1.0 - dy) + bot * dy).round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(())
}

/// 8-bit BGR → 8-bit L*a*b* (L scaled to 0–255, a and b offset by 128).
pub fn bgr_to_lab(bgr: [u8; 3]) -> [u8; 3] {
    let r = srgb_to_linear(bgr[2] as f32 / 255.0);
    let g = srgb_to_linear(bgr[1] as f32 / 255.0);
    let b = srgb_to_linear(bgr[0] as f32 / 255.0);

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);

    [
        to_u8(l * 255.0 / 100.0),
        to_u8(a + 128.0),
        to_u8(bb + 128.0),
    ]
}

/// Inverse of [`bgr_to_lab`].
pub fn lab_to_bgr(lab: [u8; 3]) -> [u8; 3] {
    let l = lab[0] as f32 * 100.0 / 255.0;
    let a = lab[1] as f32 - 128.0;
    let b = lab[2] as f32 - 128.0;

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let y = if l > LAB_KAPPA * LAB_EPSILON {
        fy * fy * fy
    } else {
        l / LAB_KAPPA
    };
    let x = lab_f_inv(fx) * WHITE_X;
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875991 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    [
        to_u8(linear_to_srgb(bl) * 255.0),
        to_u8(linear_to_srgb(g) * 255.0),
        to_u8(linear_to_srgb(r) * 255.0),
    ]
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > LAB_EPSILON {
        cube
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
