use crypto_bigint::{Encoding, U256};
use num_bigint::BigUint;

/// Renders a 256-bit value in base 10, for logs and CLI output.
pub fn u256_to_decimal(value: &U256) -> String {
    BigUint::from_bytes_be(&value.to_be_bytes()).to_str_radix(10)
}
