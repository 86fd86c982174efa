use rerender_contracts::AspectRatio;

const WIDE_THRESHOLD: f64 = 1.2;
const TALL_THRESHOLD: f64 = 0.8;

/// Classifies reference pixel dimensions into an output ratio.
///
/// Both thresholds are strict, so a ratio of exactly 0.8 or 1.2 is square.
/// A zero height yields an infinite ratio (wide); 0x0 is NaN and lands on
/// square.
pub fn infer_ratio(width: u32, height: u32) -> AspectRatio {
    let ratio = f64::from(width) / f64::from(height);
    if ratio > WIDE_THRESHOLD {
        AspectRatio::Landscape16x9
    } else if ratio < TALL_THRESHOLD {
        AspectRatio::Portrait9x16
    } else {
        AspectRatio::Square
    }
}

#[cfg(test)]
mod tests {
    use rerender_contracts::AspectRatio;

    use super::infer_ratio;

    #[test]
    fn wide_images_map_to_landscape() {
        assert_eq!(infer_ratio(1600, 1000), AspectRatio::Landscape16x9);
        assert_eq!(infer_ratio(1920, 1080), AspectRatio::Landscape16x9);
        assert_eq!(infer_ratio(121, 100), AspectRatio::Landscape16x9);
        assert_eq!(infer_ratio(10, 0), AspectRatio::Landscape16x9);
    }

    #[test]
    fn tall_images_map_to_portrait() {
        assert_eq!(infer_ratio(1080, 1920), AspectRatio::Portrait9x16);
        assert_eq!(infer_ratio(79, 100), AspectRatio::Portrait9x16);
    }

    #[test]
    fn boundaries_are_square() {
        assert_eq!(infer_ratio(120, 100), AspectRatio::Square);
        assert_eq!(infer_ratio(80, 100), AspectRatio::Square);
        assert_eq!(infer_ratio(6, 5), AspectRatio::Square);
        assert_eq!(infer_ratio(4, 5), AspectRatio::Square);
        assert_eq!(infer_ratio(512, 512), AspectRatio::Square);
        assert_eq!(infer_ratio(0, 0), AspectRatio::Square);
    }

    #[test]
    fn sweep_matches_thresholds() {
        for height in [1u32, 3, 7, 100, 999] {
            for width in 0..(height * 3) {
                let ratio = width as f64 / height as f64;
                let expected = if ratio > 1.2 {
                    AspectRatio::Landscape16x9
                } else if ratio < 0.8 {
                    AspectRatio::Portrait9x16
                } else {
                    AspectRatio::Square
                };
                assert_eq!(infer_ratio(width, height), expected, "{width}x{height}");
            }
        }
    }
}
