//! Order numbers and payment references.
//!
//! Order numbers look like `ORD-240611-7K3QZD`: a `YYMMDD` date prefix so that they sort roughly by creation date,
//! followed by six random characters from Crockford's base32 alphabet so that they cannot be guessed. Payment
//! references are `PAY-` followed by twenty random characters, which is well beyond anything a client could enumerate.
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db_types::{OrderNumber, PaymentReference};

/// Crockford's base32 alphabet. No I, L, O or U, so the codes survive being read out over the phone.
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ORDER_SUFFIX_LEN: usize = 6;
const REFERENCE_LEN: usize = 20;

/// How many fresh order numbers are tried before giving up on a collision streak.
pub const ORDER_NUMBER_ATTEMPTS: usize = 5;

fn random_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| CROCKFORD[rng.gen_range(0..CROCKFORD.len())] as char).collect()
}

pub fn generate_order_number(now: DateTime<Utc>) -> OrderNumber {
    let mut rng = rand::thread_rng();
    OrderNumber(format!("ORD-{}-{}", now.format("%y%m%d"), random_code(&mut rng, ORDER_SUFFIX_LEN)))
}

pub fn generate_payment_reference() -> PaymentReference {
    let mut rng = rand::thread_rng();
    PaymentReference(format!("PAY-{}", random_code(&mut rng, REFERENCE_LEN)))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn order_numbers_carry_the_date_and_a_crockford_suffix() {
        let now = Utc.with_ymd_and_hms(2024, 6, 11, 13, 45, 0).unwrap();
        let number = generate_order_number(now);
        let s = number.as_str();
        assert!(s.starts_with("ORD-240611-"), "{s}");
        assert_eq!(s.len(), "ORD-240611-".len() + ORDER_SUFFIX_LEN);
        assert!(s[11..].bytes().all(|b| CROCKFORD.contains(&b)));
    }

    #[test]
    fn payment_references_do_not_repeat() {
        let a = generate_payment_reference();
        let b = generate_payment_reference();
        assert_eq!(a.as_str().len(), 4 + REFERENCE_LEN);
        assert!(a.as_str().starts_with("PAY-"));
        assert_ne!(a, b);
    }
}
