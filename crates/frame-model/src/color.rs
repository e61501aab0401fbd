//! Sample-type and color-layout conversion.

use crate::image::{FloatImage, Frame, Image, PixelLayout};

/// BT.601 luma weights, in BGR order.
const LUMA_BGR: [f32; 3] = [0.114, 0.587, 0.299];

/// Convert an 8-bit frame to float samples in the requested layout.
///
/// BGR to gray uses BT.601 luma; gray to BGR replicates the channel.
pub fn frame_to_float(frame: &Frame, layout: PixelLayout) -> FloatImage {
    match (frame.layout(), layout) {
        (PixelLayout::Bgr, PixelLayout::Gray) => {
            let data = frame
                .data()
                .chunks_exact(3)
                .map(|px| {
                    px[0] as f32 * LUMA_BGR[0] + px[1] as f32 * LUMA_BGR[1] + px[2] as f32 * LUMA_BGR[2]
                })
                .collect();
            rebuild(frame, PixelLayout::Gray, data)
        }
        (PixelLayout::Gray, PixelLayout::Bgr) => {
            let data = frame
                .data()
                .iter()
                .flat_map(|&v| [v as f32; 3])
                .collect();
            rebuild(frame, PixelLayout::Bgr, data)
        }
        _ => {
            let data = frame.data().iter().map(|&v| v as f32).collect();
            rebuild(frame, frame.layout(), data)
        }
    }
}

/// Expand a single-channel float image to three identical BGR channels.
/// Images that are already BGR are returned unchanged.
pub fn gray_to_bgr(image: FloatImage) -> FloatImage {
    if image.layout() == PixelLayout::Bgr {
        return image;
    }
    let data = image.data().iter().flat_map(|&v| [v; 3]).collect();
    rebuild(&image, PixelLayout::Bgr, data)
}

/// Collapse a BGR float image to luma. Gray images are returned unchanged.
pub fn bgr_to_gray(image: FloatImage) -> FloatImage {
    if image.layout() == PixelLayout::Gray {
        return image;
    }
    let data = image
        .data()
        .chunks_exact(3)
        .map(|px| px[0] * LUMA_BGR[0] + px[1] * LUMA_BGR[1] + px[2] * LUMA_BGR[2])
        .collect();
    rebuild(&image, PixelLayout::Gray, data)
}

fn rebuild<T: Copy>(like: &Image<T>, layout: PixelLayout, data: Vec<f32>) -> FloatImage {
    Image::from_parts(like.width(), like.height(), layout, data)
}
