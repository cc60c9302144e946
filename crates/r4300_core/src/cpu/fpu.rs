//! Arithmetic kernel of the floating point unit. The register file in ['super::cop1'] deals with
//! bit patterns, this deals with the numbers.

use std::cmp::Ordering;

/// Rounding mode, encoded as in bits 0..1 of FCR31.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    #[default]
    Nearest = 0,
    Zero = 1,
    Up = 2,
    Down = 3,
}

impl RoundingMode {
    pub fn from_fcr31(fcr31: u32) -> Self {
        match fcr31 & 0x3 {
            0 => RoundingMode::Nearest,
            1 => RoundingMode::Zero,
            2 => RoundingMode::Up,
            _ => RoundingMode::Down,
        }
    }
}

/// A float which can be moved to its neighbour.
trait Step: Copy {
    /// The next representable value towards positive or negative infinity.
    fn step(self, up: bool) -> Self;

    /// Move one step towards zero if the exact result, which lies on side `exact` of `self`, is
    /// closer to zero.
    fn toward_zero(self, exact: Ordering) -> Self;

    /// Where the exact result lies relative to `self`, given the sign of the rounding error. A
    /// result which is infinite although the operands are `finite` has overflowed, so the exact
    /// result is closer to zero.
    fn exact_side(self, err: Option<Ordering>, finite: bool) -> Option<Ordering>;
}

macro_rules! impl_step {
    ($float:ty) => {
        impl Step for $float {
            fn step(self, up: bool) -> Self {
                if self.is_nan() || (self.is_infinite() && (self > 0.0) == up) {
                    return self;
                }
                if self == 0.0 {
                    let tiny = <$float>::from_bits(1);
                    return if up { tiny } else { -tiny };
                }
                let bits = self.to_bits();
                <$float>::from_bits(if (self > 0.0) == up { bits + 1 } else { bits - 1 })
            }

            fn toward_zero(self, exact: Ordering) -> Self {
                match exact {
                    Ordering::Less if self > 0.0 => self.step(false),
                    Ordering::Greater if self < 0.0 => self.step(true),
                    _ => self,
                }
            }

            fn exact_side(self, err: Option<Ordering>, finite: bool) -> Option<Ordering> {
                if self.is_infinite() && finite {
                    Some(if self > 0.0 { Ordering::Less } else { Ordering::Greater })
                } else {
                    err
                }
            }
        }
    };
}

impl_step!(f32);
impl_step!(f64);

/// Generate the arithmetic of one precision. Each operation is done rounding to nearest, after
/// which the rounding error is recovered exactly and the result is moved to its neighbour if the
/// rounding mode asks for it.
macro_rules! arithmetic {
    ($float:ty, $add:ident, $sub:ident, $mul:ident, $div:ident, $sqrt:ident) => {
        pub fn $add(&self, a: $float, b: $float) -> $float {
            let sum = a + b;
            if sum == 0.0 && self.mode == RoundingMode::Down {
                // An exact zero sum is negative when rounding down, unless both are +0.
                return if a.is_sign_negative() || b.is_sign_negative() { -0.0 } else { 0.0 };
            }
            let mid = sum - a;
            let err = (a - (sum - mid)) + (b - mid);
            let side = sum.exact_side(err.partial_cmp(&0.0), a.is_finite() && b.is_finite());
            self.directed(sum, side)
        }

        pub fn $sub(&self, a: $float, b: $float) -> $float {
            self.$add(a, -b)
        }

        pub fn $mul(&self, a: $float, b: $float) -> $float {
            let prod = a * b;
            let err = a.mul_add(b, -prod);
            let side = prod.exact_side(err.partial_cmp(&0.0), a.is_finite() && b.is_finite());
            self.directed(prod, side)
        }

        pub fn $div(&self, a: $float, b: $float) -> $float {
            let quot = a / b;
            let rem = (-quot).mul_add(b, a);
            let err = if b < 0.0 { -rem } else { rem };
            let finite = a.is_finite() && b.is_finite() && b != 0.0;
            self.directed(quot, quot.exact_side(err.partial_cmp(&0.0), finite))
        }

        pub fn $sqrt(&self, a: $float) -> $float {
            let root = a.sqrt();
            let err = (-root).mul_add(root, a);
            self.directed(root, root.exact_side(err.partial_cmp(&0.0), a.is_finite()))
        }
    };
}

/// Pure numeric routines. Every result honors the rounding mode of FCR31.
#[derive(Default)]
pub struct FpuKernel {
    mode: RoundingMode,
}

impl FpuKernel {
    /// Must be called whenever FCR31 is written.
    pub fn set_rounding_mode(&mut self, mode: RoundingMode) {
        if mode != self.mode {
            trace!("FPU rounding mode changed to {mode:?}");
        }
        self.mode = mode;
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.mode
    }

    /// Adjust `val`, rounded to nearest, to the current rounding mode. `exact` is the side of
    /// `val` the exact result lies on, if known.
    fn directed<T: Step>(&self, val: T, exact: Option<Ordering>) -> T {
        match (self.mode, exact) {
            (RoundingMode::Up, Some(Ordering::Greater)) => val.step(true),
            (RoundingMode::Down, Some(Ordering::Less)) => val.step(false),
            (RoundingMode::Zero, Some(exact)) => val.toward_zero(exact),
            _ => val,
        }
    }

    arithmetic!(f32, add_s, sub_s, mul_s, div_s, sqrt_s);
    arithmetic!(f64, add_d, sub_d, mul_d, div_d, sqrt_d);

    pub fn abs_s(&self, a: f32) -> f32 { a.abs() }
    pub fn neg_s(&self, a: f32) -> f32 { -a }
    pub fn abs_d(&self, a: f64) -> f64 { a.abs() }
    pub fn neg_d(&self, a: f64) -> f64 { -a }

    /// CVT.S.D.
    pub fn cvt_s_d(&self, val: f64) -> f32 {
        let single = val as f32;
        let err = (val - single as f64).partial_cmp(&0.0);
        self.directed(single, single.exact_side(err, val.is_finite()))
    }

    /// CVT.S.W.
    pub fn cvt_s_w(&self, val: i32) -> f32 {
        let single = val as f32;
        self.directed(single, (val as f64).partial_cmp(&(single as f64)))
    }

    /// CVT.S.L.
    pub fn cvt_s_l(&self, val: i64) -> f32 {
        let single = val as f32;
        self.directed(single, Some((val as i128).cmp(&(single as i128))))
    }

    /// CVT.D.L. Conversions to double from the other formats are exact.
    pub fn cvt_d_l(&self, val: i64) -> f64 {
        let double = val as f64;
        self.directed(double, Some((val as i128).cmp(&(double as i128))))
    }

    fn round(&self, val: f64, mode: Option<RoundingMode>) -> f64 {
        match mode.unwrap_or(self.mode) {
            RoundingMode::Nearest => val.round_ties_even(),
            RoundingMode::Zero => val.trunc(),
            RoundingMode::Up => val.ceil(),
            RoundingMode::Down => val.floor(),
        }
    }

    /// Convert to a 32-bit integer, using the current rounding mode if `mode` is `None`.
    pub fn to_w(&self, val: f64, mode: Option<RoundingMode>) -> i32 {
        self.round(val, mode) as i32
    }

    /// Convert to a 64-bit integer, using the current rounding mode if `mode` is `None`.
    pub fn to_l(&self, val: f64, mode: Option<RoundingMode>) -> i64 {
        self.round(val, mode) as i64
    }

    /// Evaluate comparison condition `cond`. Bit 0 is true if unordered, bit 1 if equal and bit 2
    /// if less than. Bit 3 only decides if unordered operands are an invalid operation, which is
    /// checked by the caller.
    pub fn compare(&self, cond: u8, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            cond & 0x1 != 0
        } else {
            (cond & 0x2 != 0 && a == b) || (cond & 0x4 != 0 && a < b)
        }
    }
}
