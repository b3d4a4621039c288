// utils/otp_generator.rs
use rand::Rng;

pub const VERIFICATION_CODE_LENGTH: usize = 6;

/// Six random decimal digits, leading zeroes allowed.
pub fn generate_otp() -> String {
    let mut rng = rand::rng();
    (0..VERIFICATION_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
