use crate::frame::{FrameView, PixelFormat};

/// Packed RGB24 copy of a validated view.
pub(crate) fn to_rgb(view: &FrameView<'_>) -> Vec<u8> {
    let pixels = view.pixels();
    match view.format() {
        PixelFormat::Rgb24 => pixels.to_vec(),
        PixelFormat::Gray8 => pixels.iter().flat_map(|&y| [y, y, y]).collect(),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, view.width(), view.height()),
    }
}

/// Luma plane (one byte per pixel) of a validated view.
pub(crate) fn to_luma(view: &FrameView<'_>) -> Vec<u8> {
    let pixels = view.pixels();
    match view.format() {
        PixelFormat::Rgb24 => pixels
            .chunks_exact(3)
            .map(|rgb| rgb_to_luma(rgb[0], rgb[1], rgb[2]))
            .collect(),
        PixelFormat::Gray8 => pixels.to_vec(),
        PixelFormat::Nv12 => {
            let y_plane = view.width() as usize * view.height() as usize;
            pixels[..y_plane].to_vec()
        }
    }
}

fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    // BT.709 weights
    clamp_to_u8(0.2125 * r as f32 + 0.7154 * g as f32 + 0.0721 * b as f32)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let (u, v) = match (pixels.get(uv_index), pixels.get(uv_index + 1)) {
                (Some(&u), Some(&v)) => (u as f32 - 128.0, v as f32 - 128.0),
                _ => (0.0, 0.0),
            };

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
