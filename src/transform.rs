//! Logarithmic tone curve for sensor samples
//!
//! Linear sensor values between the black and white levels are normalized to
//! `[0, 1]` and mapped through `log2(n * max + 1) / bits`, where `max` is the
//! largest code at the target bit depth. The mapping spends more codes on the
//! shadows than a linear quantizer would and is lossy by construction.
//!
//! Arithmetic is single precision with round-half-up. [`LogCurve`] caches the
//! mapping for a fixed black/white pair; its tables are filled from the scalar
//! functions so the slice forms match them bit for bit.

use crate::packing::BitDepth;

fn range(black: u16, white: u16) -> f32 {
    (i32::from(white) - i32::from(black)).max(1) as f32
}

/// Encode one linear sample to a log code
#[must_use]
pub fn encode_sample(sample: u16, black: u16, white: u16, depth: BitDepth) -> u16 {
    let linear = i32::from(sample) - i32::from(black);
    if linear <= 0 {
        return 0;
    }

    let max = f32::from(depth.max_value());
    let normalized = (linear as f32 / range(black, white)).clamp(0.0, 1.0);
    let encoded = (normalized * max + 1.0).log2() / depth.bits() as f32;
    let code = (encoded * max + 0.5) as u16;
    code.min(depth.max_value())
}

/// Decode one log code back to a linear sample
#[must_use]
pub fn decode_sample(code: u16, black: u16, white: u16, depth: BitDepth) -> u16 {
    let max = f32::from(depth.max_value());
    let normalized = f32::from(code) / max;
    let linear = (((normalized * depth.bits() as f32).exp2() - 1.0) / max).clamp(0.0, 1.0);

    let value = (linear * range(black, white) + f32::from(black) + 0.5) as i32;
    value.clamp(0, i32::from(u16::MAX)) as u16
}

/// Encode a slice of linear samples into `output`
///
/// # Panics
///
/// Panics if `output` is shorter than `input`
pub fn encode(input: &[u16], output: &mut [u16], black: u16, white: u16, depth: BitDepth) {
    assert!(output.len() >= input.len());
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = encode_sample(sample, black, white, depth);
    }
}

/// Decode a slice of log codes into `output`
///
/// # Panics
///
/// Panics if `output` is shorter than `input`
pub fn decode(input: &[u16], output: &mut [u16], black: u16, white: u16, depth: BitDepth) {
    assert!(output.len() >= input.len());
    for (out, &code) in output.iter_mut().zip(input) {
        *out = decode_sample(code, black, white, depth);
    }
}

/// Table-driven log curve for one black/white/depth combination
#[derive(Debug, Clone)]
pub struct LogCurve {
    depth: BitDepth,
    black: u16,
    white: u16,
    /// Code for every possible 16-bit input
    encode_table: Vec<u16>,
    /// Linear value for every code at `depth`
    decode_table: Vec<u16>,
}

impl LogCurve {
    /// Build the lookup tables
    #[must_use]
    pub fn new(black: u16, white: u16, depth: BitDepth) -> Self {
        let encode_table = (0..=u16::MAX)
            .map(|sample| encode_sample(sample, black, white, depth))
            .collect();
        let decode_table = (0..=depth.max_value())
            .map(|code| decode_sample(code, black, white, depth))
            .collect();

        Self {
            depth,
            black,
            white,
            encode_table,
            decode_table,
        }
    }

    /// Bit depth of the codes
    #[must_use]
    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Black level the tables were built for
    #[must_use]
    pub fn black(&self) -> u16 {
        self.black
    }

    /// White level the tables were built for
    #[must_use]
    pub fn white(&self) -> u16 {
        self.white
    }

    /// Encode a slice of linear samples into `output`
    ///
    /// # Panics
    ///
    /// Panics if `output` is shorter than `input`
    pub fn encode(&self, input: &[u16], output: &mut [u16]) {
        assert!(output.len() >= input.len());
        for (out, &sample) in output.iter_mut().zip(input) {
            *out = self.encode_table[usize::from(sample)];
        }
    }

    /// Decode a slice of log codes into `output`
    ///
    /// Codes above the depth's range decode as the largest code.
    ///
    /// # Panics
    ///
    /// Panics if `output` is shorter than `input`
    pub fn decode(&self, input: &[u16], output: &mut [u16]) {
        assert!(output.len() >= input.len());
        let last = self.decode_table.len() - 1;
        for (out, &code) in output.iter_mut().zip(input) {
            *out = self.decode_table[usize::from(code).min(last)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEPTHS: [BitDepth; 2] = [BitDepth::Ten, BitDepth::Twelve];

    #[test]
    fn test_below_black_is_zero() {
        for depth in DEPTHS {
            assert_eq!(encode_sample(0, 64, 1023, depth), 0);
            assert_eq!(encode_sample(64, 64, 1023, depth), 0);
            assert!(encode_sample(65, 64, 1023, depth) > 0);
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(encode_sample(1023, 64, 1023, BitDepth::Ten), 1023);
        assert_eq!(encode_sample(u16::MAX, 64, 1023, BitDepth::Ten), 1023);
        assert_eq!(encode_sample(4095, 64, 4095, BitDepth::Twelve), 4095);

        assert_eq!(decode_sample(0, 64, 1023, BitDepth::Ten), 64);
        assert_eq!(decode_sample(1023, 64, 1023, BitDepth::Ten), 1023);
        assert_eq!(decode_sample(4095, 64, 4095, BitDepth::Twelve), 4095);
    }

    #[test]
    fn test_monotonic() {
        for (depth, white) in [(BitDepth::Ten, 1023), (BitDepth::Twelve, 4095)] {
            let mut prev = 0;
            for sample in 64..=white {
                let code = encode_sample(sample, 64, white, depth);
                assert!(code >= prev, "{depth:?}: {sample} -> {code} < {prev}");
                prev = code;
            }
        }
    }

    #[test]
    fn test_roundtrip_tolerance() {
        for (depth, white, tolerance) in [(BitDepth::Ten, 1023, 4), (BitDepth::Twelve, 4095, 8)] {
            for sample in 64..=white {
                let code = encode_sample(sample, 64, white, depth);
                let back = decode_sample(code, 64, white, depth);
                let diff = (i32::from(sample) - i32::from(back)).abs();
                assert!(diff <= tolerance, "{depth:?}: {sample} -> {back}");
            }
        }
    }

    #[test]
    fn test_curve_matches_scalar() {
        for depth in DEPTHS {
            let (black, white) = (60, depth.max_value() - 3);
            let curve = LogCurve::new(black, white, depth);

            let samples: Vec<u16> = (0..=u16::MAX).collect();
            let mut table = vec![0u16; samples.len()];
            let mut scalar = vec![0u16; samples.len()];
            curve.encode(&samples, &mut table);
            encode(&samples, &mut scalar, black, white, depth);
            assert_eq!(table, scalar);

            let codes: Vec<u16> = (0..=depth.max_value()).collect();
            let mut table = vec![0u16; codes.len()];
            let mut scalar = vec![0u16; codes.len()];
            curve.decode(&codes, &mut table);
            decode(&codes, &mut scalar, black, white, depth);
            assert_eq!(table, scalar);
        }
    }

    #[test]
    fn test_degenerate_range() {
        // white <= black collapses to a unit range instead of dividing by zero
        assert_eq!(encode_sample(100, 100, 100, BitDepth::Ten), 0);
        assert_eq!(encode_sample(101, 100, 100, BitDepth::Ten), 1023);
        assert_eq!(decode_sample(1023, 100, 50, BitDepth::Ten), 101);
    }

    proptest! {
        #[test]
        fn prop_code_in_range(sample: u16, black in 0u16..512, span in 1u16..3584) {
            let white = black + span;
            prop_assert!(encode_sample(sample, black, white, BitDepth::Ten) <= 1023);
            prop_assert!(encode_sample(sample, black, white, BitDepth::Twelve) <= 4095);
        }

        #[test]
        fn prop_decode_within_levels(code in 0u16..=4095, black in 0u16..512, span in 1u16..3584) {
            let white = black + span;
            let value = decode_sample(code, black, white, BitDepth::Twelve);
            prop_assert!(value >= black && value <= white);
        }
    }
}
