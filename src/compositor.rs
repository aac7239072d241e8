//! Ring overlay rendering and source-over compositing.
//!
//! Everything here is pure: no I/O, no shared state, and the output depends
//! only on the input pixels and dimensions.

use std::f64::consts::PI;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Alpha of every pixel inside the ring band.
pub const RING_ALPHA: u8 = 200;
/// Green channel at normalized angle 0.
pub const GREEN_MIN: u8 = 150;
/// Green channel at normalized angle 1.
pub const GREEN_MAX: u8 = 255;
/// Inner radius as a fraction of the outer radius.
const INNER_RADIUS_RATIO: f64 = 0.9;

/// Ring placement derived from the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingGeometry {
    pub center_x: f64,
    pub center_y: f64,
    pub outer_radius: f64,
    pub inner_radius: f64,
}

impl RingGeometry {
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let outer_radius = f64::from(width.min(height)) / 2.0;
        Self {
            center_x: f64::from(width) / 2.0,
            center_y: f64::from(height) / 2.0,
            outer_radius,
            inner_radius: outer_radius * INNER_RADIUS_RATIO,
        }
    }

    /// Overlay colour at `(x, y)`; fully transparent outside the band.
    pub fn pixel_at(&self, x: u32, y: u32) -> Rgba<u8> {
        if self.outer_radius <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }

        let dx = f64::from(x) - self.center_x;
        let dy = f64::from(y) - self.center_y;
        let distance = dx.hypot(dy);

        if distance < self.inner_radius || distance > self.outer_radius {
            return Rgba([0, 0, 0, 0]);
        }

        let normalized_angle = (dy.atan2(dx) + PI) / (2.0 * PI);
        Rgba([0, ring_green(normalized_angle), 0, RING_ALPHA])
    }
}

/// Green channel of the ring gradient for an angle in `[0, 1]`.
pub fn ring_green(normalized_angle: f64) -> u8 {
    let span = f64::from(GREEN_MAX - GREEN_MIN);
    let green = (f64::from(GREEN_MIN) + normalized_angle * span).floor();
    green.clamp(f64::from(GREEN_MIN), f64::from(GREEN_MAX)) as u8
}

/// Renders the ring overlay for an image of the given size.
pub fn render_ring_overlay(width: u32, height: u32) -> RgbaImage {
    let geometry = RingGeometry::for_dimensions(width, height);
    let mut overlay = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return overlay;
    }

    let row_len = width as usize * 4;
    overlay
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&geometry.pixel_at(x as u32, y as u32).0);
            }
        });

    overlay
}

/// Blends `overlay` over `base` (Porter-Duff source-over, straight alpha).
///
/// With an opaque base this reduces to `overlay*a + base*(1-a)` per channel.
/// A fully transparent overlay pixel leaves the base pixel untouched.
pub fn blend_source_over(overlay: Rgba<u8>, base: Rgba<u8>) -> Rgba<u8> {
    let overlay_alpha = overlay[3];
    if overlay_alpha == 0 {
        return base;
    }
    if overlay_alpha == u8::MAX {
        return overlay;
    }

    let src_a = f64::from(overlay_alpha) / 255.0;
    let dst_a = f64::from(base[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    let mut out = [0u8; 4];
    for channel in 0..3 {
        let src = f64::from(overlay[channel]);
        let dst = f64::from(base[channel]);
        let value = (src * src_a + dst * dst_a * (1.0 - src_a)) / out_a;
        out[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;

    Rgba(out)
}

/// Composites the ring overlay onto `source` and returns a new image.
///
/// `source` is not modified.
pub fn composite(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let overlay = render_ring_overlay(width, height);
    let mut output = source.clone();
    if width == 0 || height == 0 {
        return output;
    }

    let row_len = width as usize * 4;
    output
        .par_chunks_mut(row_len)
        .zip(overlay.par_chunks(row_len))
        .for_each(|(out_row, overlay_row)| {
            for (out_px, overlay_px) in out_row
                .chunks_exact_mut(4)
                .zip(overlay_row.chunks_exact(4))
            {
                let base = Rgba([out_px[0], out_px[1], out_px[2], out_px[3]]);
                let top = Rgba([overlay_px[0], overlay_px[1], overlay_px[2], overlay_px[3]]);
                out_px.copy_from_slice(&blend_source_over(top, base).0);
            }
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn geometry_follows_shorter_side() {
        let g = RingGeometry::for_dimensions(200, 100);
        assert_eq!(g.center_x, 100.0);
        assert_eq!(g.center_y, 50.0);
        assert_eq!(g.outer_radius, 50.0);
        assert!((g.inner_radius - 45.0).abs() < 1e-9);
    }

    #[test]
    fn outer_radius_is_in_band_and_center_is_clear() {
        for n in [2u32, 10, 64, 100] {
            let overlay = render_ring_overlay(n, n);
            let c = n / 2;
            assert_eq!(overlay.get_pixel(c, c)[3], 0, "center of {n}x{n}");
            // (c, 0) sits exactly on the outer radius.
            assert_eq!(overlay.get_pixel(c, 0)[3], RING_ALPHA, "top of {n}x{n}");
        }
    }

    #[test]
    fn ring_colour_is_pure_green_gradient() {
        let overlay = render_ring_overlay(100, 100);
        for px in overlay.pixels().filter(|p| p[3] != 0) {
            assert_eq!(px[0], 0);
            assert_eq!(px[2], 0);
            assert!(px[1] >= GREEN_MIN);
            assert_eq!(px[3], RING_ALPHA);
        }
    }

    #[test]
    fn green_is_monotonic_in_angle() {
        let mut previous = ring_green(0.0);
        assert_eq!(previous, GREEN_MIN);
        for step in 1..=1000 {
            let green = ring_green(f64::from(step) / 1000.0);
            assert!(green >= previous);
            previous = green;
        }
        assert_eq!(previous, GREEN_MAX);
    }

    #[test]
    fn transparent_overlay_leaves_opaque_base_unchanged() {
        let base = Rgba([12, 34, 56, 255]);
        assert_eq!(blend_source_over(Rgba([0, 200, 0, 0]), base), base);
    }

    #[test]
    fn white_square_scenario() {
        let source = white(100, 100);
        let output = composite(&source);

        assert_eq!(output.dimensions(), (100, 100));
        assert_eq!(output.get_pixel(50, 50), source.get_pixel(50, 50));

        let top = output.get_pixel(50, 0);
        assert_eq!(top[3], 255);
        assert_eq!(top[0], top[2]);
        assert!(top[0] > 0, "tinted, not pure green");
        assert!(top[1] > top[0]);
        assert_eq!(*top, Rgba([55, 193, 55, 255]));
    }

    #[test]
    fn source_is_not_mutated() {
        let source = white(40, 40);
        let before = source.clone();
        let _ = composite(&source);
        assert_eq!(source, before);
    }

    #[test]
    fn non_square_ring_does_not_reach_long_edges() {
        let output = composite(&white(200, 100));
        assert_eq!(output.get_pixel(0, 50), &Rgba([255, 255, 255, 255]));
        assert_eq!(output.get_pixel(199, 50), &Rgba([255, 255, 255, 255]));
        assert_ne!(output.get_pixel(100, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn degenerate_images_pass_through() {
        let one = RgbaImage::from_pixel(1, 1, Rgba([9, 8, 7, 255]));
        assert_eq!(composite(&one), one);

        let empty = RgbaImage::new(0, 0);
        assert_eq!(composite(&empty).dimensions(), (0, 0));
    }

    #[test]
    fn parallel_output_matches_sequential_blend() {
        let source = RgbaImage::from_fn(37, 23, |x, y| {
            Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 255])
        });
        let geometry = RingGeometry::for_dimensions(37, 23);
        let expected = RgbaImage::from_fn(37, 23, |x, y| {
            blend_source_over(geometry.pixel_at(x, y), *source.get_pixel(x, y))
        });
        assert_eq!(composite(&source), expected);
    }

    #[test]
    fn translucent_base_gains_alpha() {
        let out = blend_source_over(Rgba([0, 200, 0, RING_ALPHA]), Rgba([0, 0, 0, 0]));
        assert_eq!(out, Rgba([0, 200, 0, RING_ALPHA]));
    }
}
