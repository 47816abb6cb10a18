/// Largest duty the EC's PWM register accepts (full speed).
pub const HW_DUTY_MAX: u8 = 184;
/// Smallest duty the EC's PWM register accepts. 0 is not a valid fan state.
pub const HW_DUTY_MIN: u8 = 1;
/// Top of the generic duty range exposed to callers.
pub const DUTY_MAX: u8 = 255;

/// Map a generic 0–255 duty onto the EC's 1–184 range.
///
/// Both ends are pinned (`0 -> 1`, `255 -> 184`); values in between are
/// `1 + round(duty * 183 / 255)` with halves rounded up.
pub fn scale(duty: u8) -> u8 {
    match duty {
        DUTY_MAX => HW_DUTY_MAX,
        0 => HW_DUTY_MIN,
        _ => {
            let span = u32::from(HW_DUTY_MAX - HW_DUTY_MIN);
            let divisor = u32::from(DUTY_MAX);
            let rounded = (u32::from(duty) * span + divisor / 2) / divisor;
            // rounded <= 183 for duty <= 254
            HW_DUTY_MIN + rounded as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_exact() {
        assert_eq!(scale(0), 1);
        assert_eq!(scale(255), 184);
    }

    #[test]
    fn monotonic_and_in_range() {
        let mut previous = scale(0);
        for duty in 1..=255u8 {
            let scaled = scale(duty);
            assert!(scaled >= previous, "scale({duty}) = {scaled} < {previous}");
            assert!((HW_DUTY_MIN..=HW_DUTY_MAX).contains(&scaled));
            previous = scaled;
        }
    }

    #[test]
    fn rounds_to_nearest() {
        // 128 * 183 / 255 = 91.86
        assert_eq!(scale(128), 93);
        // 1 * 183 / 255 = 0.72
        assert_eq!(scale(1), 2);
        // 254 * 183 / 255 = 182.28
        assert_eq!(scale(254), 183);
    }

    #[test]
    fn matches_float_reference() {
        for duty in 1..=254u8 {
            let exact = f64::from(duty) * 183.0 / 255.0;
            let expected = 1 + (exact + 0.5).floor() as u8;
            assert_eq!(scale(duty), expected, "duty {duty}");
        }
    }
}
