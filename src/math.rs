//! Integer arithmetic helpers shared by the pricing and ledger modules.
//!
//! Every financial computation in this crate uses unbounded/wide integers;
//! floating point never appears on the fee/basis/PnL path.

use alloy::primitives::{keccak256, Address, Uint, U256};

/// 512-bit unsigned integer, wide enough to hold `sqrtPriceX96` squared
/// (a 160-bit value squared is up to 320 bits) times a `10^18` decimal
/// adjustment without overflow.
pub type U512 = Uint<512, 8>;

/// `10^n` as a [`U256`], for decimal-scaling financial quantities.
///
/// # Panics
///
/// Panics if `n` is large enough that `10^n` does not fit in 256 bits
/// (`n > 77`). No caller in this crate passes an `n` anywhere near that.
#[must_use]
pub fn pow10(n: u32) -> U256 {
    U256::from(10u8).pow(U256::from(n))
}

/// `10^n` as a [`U512`], for use alongside [`U512`]-widened products.
#[must_use]
pub fn pow10_512(n: u32) -> U512 {
    U512::from(10u8).pow(U512::from(n))
}

/// Apply the EIP-55 mixed-case checksum to a hex address.
///
/// Accepts addresses with or without a `0x` prefix, in any case; always
/// returns a `0x`-prefixed, checksum-cased string. Comparisons elsewhere in
/// this crate are case-insensitive, but persisted/display form always passes
/// through this normalizer first.
///
/// # Errors
///
/// Returns `None` if the input is not a well-formed 20-byte hex address.
#[must_use]
pub fn checksum_address(addr: &str) -> Option<String> {
    let trimmed = addr.strip_prefix("0x").unwrap_or(addr);
    if trimmed.len() != 40 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        if c.is_ascii_digit() {
            out.push(c);
            continue;
        }
        // Each hex digit of the address is upper-cased iff the corresponding
        // nibble of keccak256(lowercase address) is >= 8.
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Parse a checksum-normalized address into an [`Address`], failing closed on
/// malformed input rather than silently truncating.
#[must_use]
pub fn parse_address(addr: &str) -> Option<Address> {
    checksum_address(addr).and_then(|a| a.parse().ok())
}
