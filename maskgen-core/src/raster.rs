use crate::landmarks::Point;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PixelPoint;

pub const ON: u8 = 255;
pub const OFF: u8 = 0;

/// Binary raster of `polygon`: [`ON`] inside (edges included), [`OFF`]
/// elsewhere.
pub fn rasterize(polygon: &[Point], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([OFF]));
    if width == 0 || height == 0 {
        return mask;
    }

    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let mut pixels: Vec<PixelPoint<i32>> = polygon
        .iter()
        .map(|p| {
            PixelPoint::new(
                (p.x.round() as i32).clamp(0, max_x),
                (p.y.round() as i32).clamp(0, max_y),
            )
        })
        .collect();
    pixels.dedup();
    // draw_polygon_mut rejects explicitly closed outlines
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }

    match pixels.len() {
        0 => {}
        1 => mask.put_pixel(pixels[0].x as u32, pixels[0].y as u32, Luma([ON])),
        _ => draw_polygon_mut(&mut mask, &pixels, Luma([ON])),
    }
    mask
}

/// Number of [`ON`] pixels.
pub fn area(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] == ON).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_a_rectangle() {
        let poly = [
            Point::new(2.0, 2.0),
            Point::new(7.0, 2.0),
            Point::new(7.0, 5.0),
            Point::new(2.0, 5.0),
        ];
        let mask = rasterize(&poly, 10, 10);
        assert_eq!(mask.get_pixel(4, 3)[0], ON);
        assert_eq!(mask.get_pixel(0, 0)[0], OFF);
        assert_eq!(mask.get_pixel(9, 9)[0], OFF);
        assert_eq!(area(&mask), 6 * 4);
        assert!(mask.pixels().all(|p| p[0] == ON || p[0] == OFF));
    }

    #[test]
    fn tolerates_closed_and_out_of_bounds_outlines() {
        let poly = [
            Point::new(-5.0, -5.0),
            Point::new(20.0, -5.0),
            Point::new(20.0, 20.0),
            Point::new(-5.0, -5.0),
        ];
        let mask = rasterize(&poly, 8, 8);
        assert_eq!(mask.dimensions(), (8, 8));
        assert_eq!(mask.get_pixel(7, 0)[0], ON);
    }
}
