//! Word-sized modular arithmetic and NTT-friendly prime generation.
//!
//! Every modulus in this crate stays below 2^62, so sums of two residues never
//! overflow a `u64` and Shoup multiplication has headroom for its lazy reduction.

const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

#[inline]
pub fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let sum = a + b;
    if sum >= q {
        sum - q
    } else {
        sum
    }
}

#[inline]
pub fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + q - b
    }
}

#[inline]
pub fn neg_mod(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

#[inline]
pub fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Precomputed `floor(w * 2^64 / q)` for repeated multiplication by `w`.
#[inline]
pub fn shoup_precompute(w: u64, q: u64) -> u64 {
    (((w as u128) << 64) / q as u128) as u64
}

/// `a * w mod q` using the Shoup quotient of `w`. Requires `a < q`.
#[inline]
pub fn mul_mod_shoup(a: u64, w: u64, w_shoup: u64, q: u64) -> u64 {
    let quotient = ((a as u128 * w_shoup as u128) >> 64) as u64;
    let r = a.wrapping_mul(w).wrapping_sub(quotient.wrapping_mul(q));
    if r >= q {
        r - q
    } else {
        r
    }
}

pub fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut acc = 1u64 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    acc
}

/// Inverse modulo a prime via Fermat's little theorem.
pub fn inv_mod(a: u64, q: u64) -> u64 {
    pow_mod(a, q - 2, q)
}

/// Reduce a signed coefficient into `[0, q)`.
#[inline]
pub fn reduce_signed(value: i64, q: u64) -> u64 {
    let r = value.rem_euclid(q as i64);
    r as u64
}

/// Map a residue in `[0, q)` to its centered representative in `(-q/2, q/2]`.
#[inline]
pub fn center(value: u64, q: u64) -> i64 {
    if value > q / 2 {
        value as i64 - q as i64
    } else {
        value as i64
    }
}

/// Deterministic Miller-Rabin, exact for every 64-bit input.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in MILLER_RABIN_BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in MILLER_RABIN_BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Largest `count` primes below `2^bits` of the form `k * 2n + 1`, skipping
/// anything in `exclude`. Output is deterministic for fixed inputs.
pub fn ntt_primes(bits: u32, count: usize, degree: usize, exclude: &[u64]) -> Vec<u64> {
    let step = 2 * degree as u64;
    let bound = 1u64 << bits;
    let mut k = bound / step;
    let mut primes = Vec::with_capacity(count);

    while primes.len() < count && k > 0 {
        let candidate = k * step + 1;
        if candidate < bound && is_prime(candidate) && !exclude.contains(&candidate) {
            primes.push(candidate);
        }
        k -= 1;
    }
    primes
}

/// A primitive `2n`-th root of unity modulo `q`, i.e. `psi^n == -1`.
pub fn primitive_root_2n(q: u64, degree: usize) -> Option<u64> {
    let order = 2 * degree as u64;
    if (q - 1) % order != 0 {
        return None;
    }
    let exponent = (q - 1) / order;
    (2..q.min(1 << 20))
        .map(|x| pow_mod(x, exponent, q))
        .find(|&psi| pow_mod(psi, degree as u64, q) == q - 1)
}

pub fn bit_reverse(mut x: usize, log_n: u32) -> usize {
    let mut r = 0;
    for _ in 0..log_n {
        r = (r << 1) | (x & 1);
        x >>= 1;
    }
    r
}
