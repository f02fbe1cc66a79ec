//! Raster primitives the renderer hands regions to: blur, pixelate and
//! text-region detection.
//!
//! The renderer only decides *where* and *with what parameters* these run.
//! Implementations may fail by returning `None`; the renderer then draws a
//! placeholder instead.

use egui::{pos2, Rect};
use image::{imageops, GrayImage, Rgba, RgbaImage};

/// Vertical origin the filter expects its rects in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Origin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Integer pixel region inside an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Covers every pixel `rect` touches, clamped to the image. `None` when
    /// nothing of it lies inside.
    pub fn from_rect(rect: Rect, image_width: u32, image_height: u32) -> Option<Self> {
        let min_x = rect.min.x.min(rect.max.x).floor().max(0.0);
        let min_y = rect.min.y.min(rect.max.y).floor().max(0.0);
        let max_x = rect.min.x.max(rect.max.x).ceil().min(image_width as f32);
        let max_y = rect.min.y.max(rect.max.y).ceil().min(image_height as f32);
        if !(max_x > min_x && max_y > min_y) {
            return None;
        }
        Some(Self::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x) as u32,
            (max_y - min_y) as u32,
        ))
    }

    pub fn to_rect(self) -> Rect {
        Rect::from_min_max(
            pos2(self.x as f32, self.y as f32),
            pos2((self.x + self.width) as f32, (self.y + self.height) as f32),
        )
    }

    /// Mirrors the rect between top-left and bottom-left origins.
    pub fn flip_vertical(self, image_height: u32) -> Self {
        let y = image_height.saturating_sub(self.y.saturating_add(self.height));
        Self { y, ..self }
    }

    pub fn intersect(self, other: PixelRect) -> Option<Self> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        (x1 > x0 && y1 > y0).then(|| Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

pub trait ImageFilters: Send + Sync {
    /// Blurred copy of `region`, sized `region.width x region.height`.
    fn gaussian_blur(&self, image: &RgbaImage, region: PixelRect, radius: f32)
        -> Option<RgbaImage>;

    /// Pixelated copy of `region` using square blocks of `block_size`.
    fn pixelate(&self, image: &RgbaImage, region: PixelRect, block_size: u32)
        -> Option<RgbaImage>;

    /// Text-like regions inside `search`, in the same origin convention.
    fn detect_text_regions(&self, _image: &RgbaImage, _search: PixelRect) -> Vec<PixelRect> {
        Vec::new()
    }

    /// False when [`ImageFilters::detect_text_regions`] is the empty default,
    /// so an empty result means "no detector" rather than "no text".
    fn detects_text(&self) -> bool {
        false
    }

    fn origin(&self) -> Origin {
        Origin::TopLeft
    }
}

/// Default filters built on `image` and `imageproc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterFilters;

impl RasterFilters {
    /// Sobel magnitude a pixel needs to count as a glyph edge.
    const EDGE_THRESHOLD: u16 = 160;
    /// Share of edge pixels a row needs to belong to a text line.
    const ROW_DENSITY: f32 = 0.04;
}

impl ImageFilters for RasterFilters {
    fn gaussian_blur(
        &self,
        image: &RgbaImage,
        region: PixelRect,
        radius: f32,
    ) -> Option<RgbaImage> {
        let patch = crop(image, region)?;
        // A zero sigma is rejected by imageproc; an unblurred patch is the
        // honest result.
        if radius <= 0.0 {
            return Some(patch);
        }
        Some(imageproc::filter::gaussian_blur_f32(&patch, radius / 2.0))
    }

    fn pixelate(&self, image: &RgbaImage, region: PixelRect, block_size: u32) -> Option<RgbaImage> {
        let mut patch = crop(image, region)?;
        let block = block_size.max(1);
        let (width, height) = patch.dimensions();
        let mut by = 0;
        while by < height {
            let bh = block.min(height - by);
            let mut bx = 0;
            while bx < width {
                let bw = block.min(width - bx);
                let color = average(&patch, PixelRect::new(bx, by, bw, bh));
                for y in by..by + bh {
                    for x in bx..bx + bw {
                        patch.put_pixel(x, y, color);
                    }
                }
                bx += block;
            }
            by += block;
        }
        Some(patch)
    }

    fn detects_text(&self) -> bool {
        true
    }

    fn detect_text_regions(&self, image: &RgbaImage, search: PixelRect) -> Vec<PixelRect> {
        let Some(patch) = crop(image, search) else {
            return Vec::new();
        };
        let gray: GrayImage = imageops::grayscale(&patch);
        let gradients = imageproc::gradients::sobel_gradients(&gray);
        let (width, height) = gray.dimensions();

        // Rows dense in strong edges are text lines; consecutive rows form
        // one band, trimmed horizontally to the edge extent.
        let mut regions = Vec::new();
        let mut band: Option<(u32, u32, u32)> = None;
        for y in 0..height {
            let mut count = 0u32;
            let mut min_x = u32::MAX;
            let mut max_x = 0u32;
            for x in 0..width {
                if gradients.get_pixel(x, y)[0] >= Self::EDGE_THRESHOLD {
                    count += 1;
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                }
            }
            let dense = count as f32 >= width as f32 * Self::ROW_DENSITY && count > 0;
            band = match (band, dense) {
                (None, true) => Some((y, min_x, max_x)),
                (Some((top, lo, hi)), true) => Some((top, lo.min(min_x), hi.max(max_x))),
                (Some((top, lo, hi)), false) => {
                    regions.push(PixelRect::new(lo, top, hi - lo + 1, y - top));
                    None
                }
                (None, false) => None,
            };
        }
        if let Some((top, lo, hi)) = band {
            regions.push(PixelRect::new(lo, top, hi - lo + 1, height - top));
        }

        regions
            .into_iter()
            .filter(|region| region.height >= 3)
            .map(|region| {
                let padded = PixelRect::new(
                    region.x.saturating_sub(2),
                    region.y.saturating_sub(2),
                    region.width + 4,
                    region.height + 4,
                );
                PixelRect::new(
                    search.x + padded.x,
                    search.y + padded.y,
                    padded.width,
                    padded.height,
                )
            })
            .filter_map(|region| region.intersect(search))
            .collect()
    }
}

fn crop(image: &RgbaImage, region: PixelRect) -> Option<RgbaImage> {
    let (width, height) = image.dimensions();
    if region.width == 0
        || region.height == 0
        || region.x + region.width > width
        || region.y + region.height > height
    {
        return None;
    }
    Some(imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
}

fn average(image: &RgbaImage, region: PixelRect) -> Rgba<u8> {
    let mut total = [0u64; 4];
    let mut count = 0u64;
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let pixel = image.get_pixel(x, y);
            for (sum, channel) in total.iter_mut().zip(pixel.0) {
                *sum += channel as u64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    Rgba(total.map(|sum| (sum / count) as u8))
}

/// Mean colour of the one-pixel ring just outside `region` (inside it when
/// the region touches the image edge). Used to paint over erased content.
pub fn average_border_color(image: &RgbaImage, region: PixelRect) -> [u8; 4] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return [0, 0, 0, 0];
    }
    let x0 = region.x.saturating_sub(1);
    let y0 = region.y.saturating_sub(1);
    let x1 = (region.x + region.width).min(width - 1);
    let y1 = (region.y + region.height).min(height - 1);

    let mut total = [0u64; 4];
    let mut count = 0u64;
    let mut add = |x: u32, y: u32| {
        let pixel = image.get_pixel(x, y);
        for (sum, channel) in total.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
        count += 1;
    };
    for x in x0..=x1 {
        add(x, y0);
        if y1 != y0 {
            add(x, y1);
        }
    }
    for y in y0 + 1..y1 {
        add(x0, y);
        if x1 != x0 {
            add(x1, y);
        }
    }
    if count == 0 {
        return [0, 0, 0, 0];
    }
    total.map(|sum| (sum / count) as u8)
}

#[cfg(test)]
mod tests {
    use egui::vec2;

    use super::*;

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn pixel_rect_clamps_and_rejects_outside() {
        let rect = Rect::from_min_size(pos2(-5.5, 10.2), vec2(20.0, 5.0));
        let pixels = PixelRect::from_rect(rect, 100, 100).expect("overlaps");
        assert_eq!(pixels, PixelRect::new(0, 10, 15, 6));
        let outside = Rect::from_min_size(pos2(150.0, 0.0), vec2(10.0, 10.0));
        assert_eq!(PixelRect::from_rect(outside, 100, 100), None);
    }

    #[test]
    fn flip_vertical_is_an_involution() {
        let rect = PixelRect::new(3, 10, 7, 20);
        assert_eq!(rect.flip_vertical(100), PixelRect::new(3, 70, 7, 20));
        assert_eq!(rect.flip_vertical(100).flip_vertical(100), rect);
    }

    #[test]
    fn pixelate_flattens_each_block() {
        let image = checker(8, 8);
        let patch = RasterFilters
            .pixelate(&image, PixelRect::new(0, 0, 8, 8), 4)
            .expect("pixelate");
        assert_eq!(patch.dimensions(), (8, 8));
        let first = *patch.get_pixel(0, 0);
        assert!(patch
            .enumerate_pixels()
            .filter(|(x, y, _)| *x < 4 && *y < 4)
            .all(|(_, _, p)| *p == first));
        assert_eq!(first[0], 127);
    }

    #[test]
    fn blur_smooths_checkerboard() {
        let image = checker(16, 16);
        let patch = RasterFilters
            .gaussian_blur(&image, PixelRect::new(4, 4, 8, 8), 4.0)
            .expect("blur");
        assert_eq!(patch.dimensions(), (8, 8));
        let center = patch.get_pixel(4, 4)[0];
        assert!((80..=175).contains(&center), "center {center}");
    }

    #[test]
    fn out_of_bounds_region_fails() {
        let image = checker(10, 10);
        assert!(RasterFilters
            .gaussian_blur(&image, PixelRect::new(5, 5, 10, 10), 2.0)
            .is_none());
    }

    #[test]
    fn detects_a_dark_text_band() {
        let mut image = RgbaImage::from_pixel(120, 60, Rgba([255, 255, 255, 255]));
        // Fake glyph strokes: vertical bars on rows 20..32.
        for x in (10..110).step_by(4) {
            for y in 20..32 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let regions = RasterFilters.detect_text_regions(&image, PixelRect::new(0, 0, 120, 60));
        assert_eq!(regions.len(), 1);
        let band = regions[0];
        assert!(band.y <= 20 && band.y + band.height >= 32, "{band:?}");
        assert!(band.x <= 10 && band.x + band.width >= 106, "{band:?}");
    }

    #[test]
    fn only_real_detectors_report_text_support() {
        struct BlurOnly;

        impl ImageFilters for BlurOnly {
            fn gaussian_blur(&self, _: &RgbaImage, _: PixelRect, _: f32) -> Option<RgbaImage> {
                None
            }

            fn pixelate(&self, _: &RgbaImage, _: PixelRect, _: u32) -> Option<RgbaImage> {
                None
            }
        }

        let image = checker(8, 8);
        assert!(!BlurOnly.detects_text());
        assert!(BlurOnly
            .detect_text_regions(&image, PixelRect::new(0, 0, 8, 8))
            .is_empty());
        assert!(RasterFilters.detects_text());
    }

    #[test]
    fn border_average_reads_surrounding_ring() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([200, 100, 50, 255]));
        for y in 3..6 {
            for x in 3..6 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        assert_eq!(
            average_border_color(&image, PixelRect::new(3, 3, 3, 3)),
            [200, 100, 50, 255]
        );
    }
}
