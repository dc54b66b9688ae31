//! Hash-to-point map used for key images.
//!
//! `ge_fromfe_frombytes_vartime` from the CryptoNote reference code: a 32-byte
//! Keccak digest is read as a field element and mapped onto the curve with
//! an Elligator-2 style construction. The returned point is NOT cofactor
//! cleared; [`crate::hash_to_point`] multiplies by 8.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};

/// 256-bit unsigned integer, little-endian limbs, for arithmetic mod p = 2^255 - 19.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Fe([u64; 4]);

impl Fe {
    const ZERO: Self = Fe([0, 0, 0, 0]);
    const ONE: Self = Fe([1, 0, 0, 0]);
    const TWO: Self = Fe([2, 0, 0, 0]);

    const P: Self = Fe([
        0xFFFFFFFFFFFFFFED,
        0xFFFFFFFFFFFFFFFF,
        0xFFFFFFFFFFFFFFFF,
        0x7FFFFFFFFFFFFFFF,
    ]);

    /// Montgomery curve coefficient A.
    const A: Self = Fe([486662, 0, 0, 0]);

    /// sqrt(-1) mod p.
    const SQRT_M1: [u8; 32] = [
        0xb0, 0xa0, 0x0e, 0x4a, 0x27, 0x1b, 0xee, 0xc4,
        0x78, 0xe4, 0x2f, 0xad, 0x06, 0x18, 0x43, 0x2f,
        0xa7, 0xd7, 0xfb, 0x3d, 0x99, 0x00, 0x4d, 0x2b,
        0x0b, 0xdf, 0xc1, 0x4f, 0x80, 0x24, 0x83, 0x2b,
    ];

    fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *limb = u64::from_le_bytes(chunk);
        }
        Fe(limbs)
    }

    fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
        }
        out
    }

    fn is_zero(&self) -> bool {
        self.0 == [0, 0, 0, 0]
    }

    fn is_odd(&self) -> bool {
        self.0[0] & 1 == 1
    }

    fn ge(&self, other: &Self) -> bool {
        for i in (0..4).rev() {
            if self.0[i] != other.0[i] {
                return self.0[i] > other.0[i];
            }
        }
        true
    }

    fn add_raw(&self, other: &Self) -> (Self, bool) {
        let mut out = [0u64; 4];
        let mut carry = 0u128;
        for (i, r) in out.iter_mut().enumerate() {
            let sum = self.0[i] as u128 + other.0[i] as u128 + carry;
            *r = sum as u64;
            carry = sum >> 64;
        }
        (Fe(out), carry != 0)
    }

    fn sub_raw(&self, other: &Self) -> Self {
        let mut out = [0u64; 4];
        let mut borrow = 0i128;
        for (i, r) in out.iter_mut().enumerate() {
            let diff = self.0[i] as i128 - other.0[i] as i128 + borrow;
            if diff < 0 {
                *r = (diff + (1i128 << 64)) as u64;
                borrow = -1;
            } else {
                *r = diff as u64;
                borrow = 0;
            }
        }
        Fe(out)
    }

    fn reduce(&self) -> Self {
        let mut r = *self;
        while r.ge(&Self::P) {
            r = r.sub_raw(&Self::P);
        }
        r
    }
}

fn fe_add(a: &Fe, b: &Fe) -> Fe {
    let (sum, carry) = a.add_raw(b);
    if carry {
        // 2^256 = 38 mod p
        let (sum, _) = sum.add_raw(&Fe([38, 0, 0, 0]));
        return sum.reduce();
    }
    sum.reduce()
}

fn fe_sub(a: &Fe, b: &Fe) -> Fe {
    if a.ge(b) {
        a.sub_raw(b)
    } else {
        let (sum, _) = a.add_raw(&Fe::P);
        sum.sub_raw(b).reduce()
    }
}

fn fe_neg(a: &Fe) -> Fe {
    if a.is_zero() {
        Fe::ZERO
    } else {
        Fe::P.sub_raw(a)
    }
}

fn mul_small(a: &Fe, b: u64) -> Fe {
    let mut out = [0u64; 4];
    let mut carry = 0u128;
    for (i, r) in out.iter_mut().enumerate() {
        let v = a.0[i] as u128 * b as u128 + carry;
        *r = v as u64;
        carry = v >> 64;
    }
    let mut r = Fe(out);
    if carry > 0 {
        let (sum, _) = r.add_raw(&Fe([carry as u64 * 38, 0, 0, 0]));
        r = sum;
    }
    r.reduce()
}

fn fe_mul(a: &Fe, b: &Fe) -> Fe {
    let mut prod = [0u128; 8];
    for i in 0..4 {
        let mut carry = 0u128;
        for j in 0..4 {
            let v = a.0[i] as u128 * b.0[j] as u128 + prod[i + j] + carry;
            prod[i + j] = v & 0xFFFF_FFFF_FFFF_FFFF;
            carry = v >> 64;
        }
        prod[i + 4] += carry;
    }

    // lo + hi * 2^256, and 2^256 = 38 mod p
    let lo = Fe([prod[0] as u64, prod[1] as u64, prod[2] as u64, prod[3] as u64]);
    let hi = Fe([prod[4] as u64, prod[5] as u64, prod[6] as u64, prod[7] as u64]);
    fe_add(&lo, &mul_small(&hi, 38))
}

fn fe_sq(a: &Fe) -> Fe {
    fe_mul(a, a)
}

fn fe_pow(base: &Fe, exp: &Fe) -> Fe {
    let mut result = Fe::ONE;
    let mut b = *base;
    for limb in exp.0 {
        let mut bits = limb;
        for _ in 0..64 {
            if bits & 1 == 1 {
                result = fe_mul(&result, &b);
            }
            b = fe_sq(&b);
            bits >>= 1;
        }
    }
    result
}

fn fe_inv(a: &Fe) -> Fe {
    // a^(p-2)
    let exp = Fe([
        0xFFFFFFFFFFFFFFEB,
        0xFFFFFFFFFFFFFFFF,
        0xFFFFFFFFFFFFFFFF,
        0x7FFFFFFFFFFFFFFF,
    ]);
    fe_pow(a, &exp)
}

/// (u/v)^((p+3)/8) = u * v^3 * (u * v^7)^((p-5)/8)
fn fe_divpowm1(u: &Fe, v: &Fe) -> Fe {
    let v2 = fe_sq(v);
    let v3 = fe_mul(&v2, v);
    let v7 = fe_mul(&fe_sq(&v2), &v3);
    let exp = Fe([
        0xFFFFFFFFFFFFFFFD,
        0xFFFFFFFFFFFFFFFF,
        0xFFFFFFFFFFFFFFFF,
        0x0FFFFFFFFFFFFFFF,
    ]);
    let uv7_pow = fe_pow(&fe_mul(u, &v7), &exp);
    fe_mul(&fe_mul(u, &v3), &uv7_pow)
}

fn fe_sqrt(a: &Fe) -> Option<Fe> {
    if a.is_zero() {
        return Some(Fe::ZERO);
    }
    let exp = Fe([
        0xFFFFFFFFFFFFFFFE,
        0xFFFFFFFFFFFFFFFF,
        0xFFFFFFFFFFFFFFFF,
        0x0FFFFFFFFFFFFFFF,
    ]);
    let candidate = fe_pow(a, &exp);
    if fe_sq(&candidate) == *a {
        return Some(candidate);
    }
    let adjusted = fe_mul(&candidate, &Fe::from_bytes(&Fe::SQRT_M1));
    if fe_sq(&adjusted) == *a {
        return Some(adjusted);
    }
    None
}

/// Map a 32-byte digest to a curve point (not cofactor cleared).
///
/// Returns `None` only if the resulting encoding fails to decompress, which
/// the construction rules out for every input.
pub fn ge_fromfe_frombytes_vartime(hash: &[u8; 32]) -> Option<EdwardsPoint> {
    let u = Fe::from_bytes(hash).reduce();
    let sqrt_m1 = Fe::from_bytes(&Fe::SQRT_M1);

    let a = Fe::A;
    let a_plus_2 = fe_add(&a, &Fe::TWO);
    let a_ap2 = fe_mul(&a, &a_plus_2);
    let two_a_ap2 = fe_add(&a_ap2, &a_ap2);
    let neg_a_sq = fe_neg(&fe_sq(&a));

    // v = 2u^2, w = 2u^2 + 1, x = w^2 - 2A^2u^2
    let u2 = fe_sq(&u);
    let v = fe_add(&u2, &u2);
    let w = fe_add(&v, &Fe::ONE);
    let mut x = fe_add(&fe_sq(&w), &fe_mul(&fe_add(&neg_a_sq, &neg_a_sq), &u2));

    let mut r_x = fe_divpowm1(&w, &x);
    let mut y = fe_mul(&fe_sq(&r_x), &x);
    let mut z = fe_neg(&a);
    let sign;

    if fe_sub(&w, &y).is_zero() {
        if let Some(fffb2) = fe_sqrt(&two_a_ap2) {
            r_x = fe_mul(&r_x, &fffb2);
        }
        r_x = fe_mul(&r_x, &u);
        z = fe_mul(&z, &v);
        sign = false;
    } else if fe_add(&w, &y).is_zero() {
        if let Some(fffb1) = fe_sqrt(&fe_neg(&two_a_ap2)) {
            r_x = fe_mul(&r_x, &fffb1);
        }
        r_x = fe_mul(&r_x, &u);
        z = fe_mul(&z, &v);
        sign = false;
    } else {
        x = fe_mul(&x, &sqrt_m1);
        y = fe_mul(&fe_sq(&r_x), &x);
        let sqm1_a_ap2 = fe_mul(&sqrt_m1, &a_ap2);
        let root = if fe_sub(&w, &y).is_zero() {
            fe_sqrt(&sqm1_a_ap2)
        } else {
            fe_sqrt(&fe_neg(&sqm1_a_ap2))
        };
        if let Some(root) = root {
            r_x = fe_mul(&r_x, &root);
        }
        sign = true;
    }

    if r_x.is_odd() != sign {
        r_x = fe_neg(&r_x);
    }

    // Projective (X : Y : Z) = (r_x * (z + w) : z - w : z + w)
    let z_coord = fe_add(&z, &w);
    let y_coord = fe_sub(&z, &w);
    let x_coord = fe_mul(&r_x, &z_coord);

    let z_inv = fe_inv(&z_coord);
    let affine_x = fe_mul(&x_coord, &z_inv);
    let affine_y = fe_mul(&y_coord, &z_inv);

    let mut compressed = affine_y.to_bytes();
    if affine_x.is_odd() {
        compressed[31] |= 0x80;
    }
    CompressedEdwardsY(compressed).decompress()
}
