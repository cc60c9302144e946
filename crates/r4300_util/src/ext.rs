/// Sign extension from the width of `self` to a 64-bit register value.
pub trait SignExtend {
    #[must_use]
    fn sign_extend(self) -> u64;
}

impl SignExtend for u32 {
    fn sign_extend(self) -> u64 {
        self as i32 as i64 as u64
    }
}

impl SignExtend for u16 {
    fn sign_extend(self) -> u64 {
        self as i16 as i64 as u64
    }
}

impl SignExtend for u8 {
    fn sign_extend(self) -> u64 {
        self as i8 as i64 as u64
    }
}

#[test]
fn test_sign_extend() {
    assert_eq!(0xffff_ffff_8000_0000, 0x8000_0000_u32.sign_extend());
    assert_eq!(0x7fff_ffff, 0x7fff_ffff_u32.sign_extend());
    assert_eq!(0xffff_ffff_ffff_ff80, 0x80_u8.sign_extend());
    assert_eq!(0xffff_ffff_ffff_8000, 0x8000_u16.sign_extend());
}
