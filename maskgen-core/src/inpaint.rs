//! Region fill from surrounding pixels.
//!
//! The region is peeled from its border inwards. Every pass fills the
//! unknown pixels that touch a known one, each with the inverse-distance
//! weighted mean of the known pixels in the `radius` window around it.
//! A pass reads only pixels known before it started, so the result does not
//! depend on scan order.

use crate::raster::ON;
use image::{GrayImage, Rgb, RgbImage};

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Replace every [`ON`] pixel of `region` in `image`.
///
/// When the region covers the whole image there is nothing to sample and
/// the image is left untouched.
pub fn fill(image: &mut RgbImage, region: &GrayImage, radius: u32) {
    let (w, h) = image.dimensions();
    debug_assert_eq!((w, h), region.dimensions());
    let radius = radius.max(1) as i64;

    let idx = |x: i64, y: i64| (y * w as i64 + x) as usize;
    let mut known: Vec<bool> = region.pixels().map(|p| p[0] != ON).collect();
    let mut pending: Vec<(i64, i64)> = region
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] == ON)
        .map(|(x, y, _)| (x as i64, y as i64))
        .collect();

    let mut passes = 0;
    while !pending.is_empty() {
        let (front, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|&(x, y)| {
            NEIGHBOURS.iter().any(|(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                nx >= 0 && ny >= 0 && nx < w as i64 && ny < h as i64 && known[idx(nx, ny)]
            })
        });
        if front.is_empty() {
            log::debug!("inpaint region has no known border, {} pixels left", rest.len());
            break;
        }

        let filled: Vec<((i64, i64), Rgb<u8>)> = front
            .iter()
            .filter_map(|&(x, y)| {
                let mut acc = [0.0f32; 3];
                let mut total = 0.0f32;
                for ny in (y - radius).max(0)..=(y + radius).min(h as i64 - 1) {
                    for nx in (x - radius).max(0)..=(x + radius).min(w as i64 - 1) {
                        if !known[idx(nx, ny)] {
                            continue;
                        }
                        let d2 = ((nx - x).pow(2) + (ny - y).pow(2)) as f32;
                        let weight = 1.0 / d2;
                        let p = image.get_pixel(nx as u32, ny as u32);
                        for c in 0..3 {
                            acc[c] += weight * p[c] as f32;
                        }
                        total += weight;
                    }
                }
                (total > 0.0).then(|| {
                    let px = Rgb(acc.map(|v| (v / total).round().clamp(0.0, 255.0) as u8));
                    ((x, y), px)
                })
            })
            .collect();

        for ((x, y), px) in filled {
            image.put_pixel(x as u32, y as u32, px);
            known[idx(x, y)] = true;
        }
        pending = rest;
        passes += 1;
    }
    log::debug!("inpaint finished after {} passes", passes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn flat_surroundings_fill_flat() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([120, 80, 60]));
        let mut region = GrayImage::new(20, 20);
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgb([0, 0, 255]));
                region.put_pixel(x, y, Luma([ON]));
            }
        }
        fill(&mut img, &region, 3);
        assert!(img.pixels().all(|p| *p == Rgb([120, 80, 60])));
    }

    #[test]
    fn pixels_outside_the_region_are_untouched() {
        let mut img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]));
        let original = img.clone();
        let mut region = GrayImage::new(16, 16);
        region.put_pixel(8, 8, Luma([ON]));
        fill(&mut img, &region, 2);
        for (x, y, p) in img.enumerate_pixels() {
            if (x, y) != (8, 8) {
                assert_eq!(p, original.get_pixel(x, y));
            }
        }
        assert_eq!(img.get_pixel(8, 8)[2], 7);
    }

    #[test]
    fn whole_image_region_is_left_alone() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let region = GrayImage::from_pixel(4, 4, Luma([ON]));
        fill(&mut img, &region, 3);
        assert!(img.pixels().all(|p| *p == Rgb([1, 2, 3])));
    }
}
