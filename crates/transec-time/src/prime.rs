//! Prime normalization of slot indices
//!
//! Primes minimize the discrete curvature proxy `κ(n) = d(n)·ln(n+1)/e²`
//! since `d(n) = 2` is the smallest divisor count above `n = 1`. Mapping raw
//! slot indices onto primes smooths the slot sequence against small clock
//! perturbations, at the cost of irregular gaps.

use transec_core::{PrimeStrategy, SlotIndex};

/// Witness set making Miller-Rabin exact for every `u64`
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

#[inline]
fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

/// Deterministic Miller-Rabin primality test
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;

    'witness: for &a in &WITNESSES {
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

/// Smallest prime >= n, or `None` if it does not fit in `u64`
pub fn next_prime(n: u64) -> Option<u64> {
    if n <= 2 {
        return Some(2);
    }
    let mut candidate = n | 1;
    loop {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(2)?;
    }
}

/// Largest prime <= n, or `None` below 2
pub fn prev_prime(n: u64) -> Option<u64> {
    if n < 2 {
        return None;
    }
    if n == 2 {
        return Some(2);
    }
    let mut candidate = if n % 2 == 0 { n - 1 } else { n };
    while candidate >= 3 {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate -= 2;
    }
    Some(2)
}

/// Nearest prime to n; equidistant neighbours resolve to the smaller prime
pub fn nearest_prime(n: u64) -> u64 {
    if n <= 2 {
        return 2;
    }
    if is_prime(n) {
        return n;
    }

    let below = prev_prime(n).unwrap_or(2);
    match next_prime(n) {
        Some(above) if above - n < n - below => above,
        _ => below,
    }
}

/// Map a raw slot index according to the configured strategy
pub fn normalize_slot(slot: SlotIndex, strategy: PrimeStrategy) -> SlotIndex {
    let n = slot.value();
    let normalized = match strategy {
        PrimeStrategy::None => n,
        PrimeStrategy::Nearest => nearest_prime(n),
        PrimeStrategy::Next => next_prime(n).or_else(|| prev_prime(n)).unwrap_or(2),
    };
    SlotIndex::new(normalized)
}

/// Number of divisors of n (trial division up to √n)
pub fn divisor_count(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut count = 0;
    let mut i = 1u64;
    while i <= n / i {
        if n % i == 0 {
            count += if i == n / i { 1 } else { 2 };
        }
        i += 1;
    }
    count
}

/// Discrete curvature κ(n) = d(n)·ln(n+1)/e²
pub fn curvature(n: u64) -> f64 {
    let e_squared = std::f64::consts::E * std::f64::consts::E;
    divisor_count(n) as f64 * ((n as f64) + 1.0).ln() / e_squared
}

/// Percentage curvature reduction from `original` to `normalized`
///
/// Positive means the normalized index sits on a flatter point.
pub fn curvature_reduction(original: u64, normalized: u64) -> f64 {
    if original == normalized {
        return 0.0;
    }
    let before = curvature(original);
    if before == 0.0 {
        return 0.0;
    }
    (before - curvature(normalized)) / before * 100.0
}
