//! Bayer-preserving power-of-two downsampling.
//!
//! A plain box filter on a color-mosaic frame would average red, green
//! and blue samples together and destroy the channel structure. The
//! filter here halves each dimension while keeping the mosaic intact:
//! every 4x4 super-tile of the input collapses into one 2x2 output tile,
//! averaging the four samples of each Bayer position separately and
//! writing the result back at that position. Larger factors repeat the
//! halving step.
//!
//! The output is always written into a caller-supplied buffer so frames
//! land directly in the capture buffer with no per-frame allocation.

use anyhow::{bail, Result};

#[inline]
fn at(r: usize, c: usize, cols: usize) -> usize {
    r * cols + c
}

#[inline]
fn quad_avg(src: &[u8], cols: usize, px: [(usize, usize); 4]) -> u8 {
    let sum: u32 = px
        .iter()
        .map(|&(r, c)| src[at(r, c, cols)] as u32)
        .sum();
    (sum / 4) as u8
}

/// One halving step over a `rows x cols` mosaic into a caller buffer of
/// `(rows / 2) * (cols / 2)` bytes. Dimensions must be multiples of 4.
fn halve(src: &[u8], rows: usize, cols: usize, dst: &mut [u8]) {
    let out_cols = cols / 2;
    for r in (0..rows).step_by(4) {
        for c in (0..cols).step_by(4) {
            let b = quad_avg(src, cols, [(r, c), (r, c + 2), (r + 2, c), (r + 2, c + 2)]);
            let g_b = quad_avg(
                src,
                cols,
                [(r, c + 1), (r, c + 3), (r + 2, c + 1), (r + 2, c + 3)],
            );
            let g_r = quad_avg(
                src,
                cols,
                [(r + 1, c), (r + 1, c + 2), (r + 3, c), (r + 3, c + 2)],
            );
            let red = quad_avg(
                src,
                cols,
                [(r + 1, c + 1), (r + 1, c + 3), (r + 3, c + 1), (r + 3, c + 3)],
            );

            let (out_r, out_c) = (r / 2, c / 2);
            dst[at(out_r, out_c, out_cols)] = b;
            dst[at(out_r, out_c + 1, out_cols)] = g_b;
            dst[at(out_r + 1, out_c, out_cols)] = g_r;
            dst[at(out_r + 1, out_c + 1, out_cols)] = red;
        }
    }
}

/// Downsample a `rows x cols` 8-bit Bayer mosaic by `2^factor` along both
/// dimensions into `dst`, which must hold exactly
/// `(rows >> factor) * (cols >> factor)` bytes.
pub fn downsample_bayer(
    src: &[u8],
    rows: usize,
    cols: usize,
    factor: u32,
    dst: &mut [u8],
) -> Result<()> {
    if factor == 0 {
        bail!("downsample factor must be at least 1");
    }
    if src.len() != rows * cols {
        bail!(
            "source is {} bytes, expected {} ({}x{})",
            src.len(),
            rows * cols,
            rows,
            cols
        );
    }
    for step in 0..factor {
        // Every halving step walks 4x4 tiles of the current grid.
        if (rows >> step) % 4 != 0 || (cols >> step) % 4 != 0 {
            bail!(
                "dimensions {}x{} are not divisible by 4 at halving step {}",
                rows >> step,
                cols >> step,
                step
            );
        }
    }
    let (out_rows, out_cols) = (rows >> factor, cols >> factor);
    if dst.len() != out_rows * out_cols {
        bail!(
            "destination is {} bytes, expected {} ({}x{})",
            dst.len(),
            out_rows * out_cols,
            out_rows,
            out_cols
        );
    }

    if factor == 1 {
        halve(src, rows, cols, dst);
        return Ok(());
    }

    // Intermediate steps go through a scratch buffer, the last lands in dst.
    let mut scratch = vec![0u8; (rows / 2) * (cols / 2)];
    halve(src, rows, cols, &mut scratch);
    let (mut cur_rows, mut cur_cols) = (rows / 2, cols / 2);
    for _ in 1..factor - 1 {
        let mut next = vec![0u8; (cur_rows / 2) * (cur_cols / 2)];
        halve(&scratch, cur_rows, cur_cols, &mut next);
        scratch = next;
        cur_rows /= 2;
        cur_cols /= 2;
    }
    halve(&scratch, cur_rows, cur_cols, dst);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a mosaic where each Bayer position carries a uniform value:
    /// B at (even, even), G at (even, odd), G at (odd, even), R at
    /// (odd, odd).
    fn uniform_mosaic(rows: usize, cols: usize, b: u8, g_b: u8, g_r: u8, r: u8) -> Vec<u8> {
        let mut img = vec![0u8; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                img[row * cols + col] = match (row % 2, col % 2) {
                    (0, 0) => b,
                    (0, 1) => g_b,
                    (1, 0) => g_r,
                    (1, 1) => r,
                    _ => unreachable!(),
                };
            }
        }
        img
    }

    #[test]
    fn test_uniform_channels_survive_any_factor() {
        for factor in 1..=3 {
            let (rows, cols) = (32, 64);
            let src = uniform_mosaic(rows, cols, 10, 20, 30, 40);
            let (out_rows, out_cols) = (rows >> factor, cols >> factor);
            let mut dst = vec![0u8; out_rows * out_cols];
            downsample_bayer(&src, rows, cols, factor, &mut dst).unwrap();
            // The output is the same uniform mosaic at the smaller size.
            assert_eq!(dst, uniform_mosaic(out_rows, out_cols, 10, 20, 30, 40));
        }
    }

    #[test]
    fn test_single_tile_averages_per_channel() {
        // One 4x4 tile with distinct blue samples; every other channel 0.
        let mut src = vec![0u8; 16];
        src[0] = 1; // (0,0)
        src[2] = 3; // (0,2)
        src[8] = 5; // (2,0)
        src[10] = 7; // (2,2)
        let mut dst = vec![0u8; 4];
        downsample_bayer(&src, 4, 4, 1, &mut dst).unwrap();
        // Blue lands at the top-left of the output tile: (1+3+5+7)/4 = 4.
        assert_eq!(dst, vec![4, 0, 0, 0]);
    }

    #[test]
    fn test_averaging_truncates() {
        // Four green-on-blue-row samples summing to 10 floor to 2.
        let mut src = vec![0u8; 16];
        src[1] = 1;
        src[3] = 2;
        src[9] = 3;
        src[11] = 4;
        let mut dst = vec![0u8; 4];
        downsample_bayer(&src, 4, 4, 1, &mut dst).unwrap();
        assert_eq!(dst[1], 2);
    }

    #[test]
    fn test_world_geometry() {
        // The world camera's 480x1280 plane pools down to 60x160 at f=3.
        let src = uniform_mosaic(480, 1280, 50, 100, 150, 200);
        let mut dst = vec![0u8; 60 * 160];
        downsample_bayer(&src, 480, 1280, 3, &mut dst).unwrap();
        assert_eq!(dst, uniform_mosaic(60, 160, 50, 100, 150, 200));
    }

    #[test]
    fn test_bad_dimensions_rejected() {
        let src = vec![0u8; 6 * 6];
        let mut dst = vec![0u8; 9];
        assert!(downsample_bayer(&src, 6, 6, 1, &mut dst).is_err());

        // 8x8 at factor 3 would need a third halving step over a 2x2 grid.
        let src = vec![0u8; 8 * 8];
        let mut dst = vec![0u8; 1];
        assert!(downsample_bayer(&src, 8, 8, 3, &mut dst).is_err());

        let src = vec![0u8; 4 * 4];
        let mut dst = vec![0u8; 3];
        assert!(downsample_bayer(&src, 4, 4, 1, &mut dst).is_err());
    }
}
