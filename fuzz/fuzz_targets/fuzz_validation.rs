//! Fuzz testing for credential parsing and login input validation.
//!
//! Everything here runs on attacker-controlled bytes before any secret is
//! involved, so none of it may panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `parse_credential`: `Authorization` header shape check
//! - `validate_email`, `validate_password`, `validate_user_id`
//! - `LoginRequest` deserialization
//! - `CidrRange::parse`: trusted proxy entries

#![no_main]

use libfuzzer_sys::fuzz_target;
use user_gate::middleware::ip::CidrRange;
use user_gate::models::LoginRequest;
use user_gate::token::parse_credential;
use user_gate::validation::{validate_email, validate_password, validate_user_id};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // A parsed token is always a non-empty slice of the input
        if let Ok(token) = parse_credential(s) {
            assert!(!token.is_empty());
            assert!(s.contains(token));
        }

        let _ = validate_email(s);
        let _ = validate_password(s);
        let _ = validate_user_id(s);
        let _ = CidrRange::parse(s);
    }

    if let Ok(request) = serde_json::from_slice::<LoginRequest>(data) {
        let _ = validate_email(&request.email);
        let _ = validate_password(&request.password);
    }
});
