//! Fuzz target for configuration and identity parsing
//!
//! Arbitrary UTF-8 is parsed both as a TOML configuration document and as an
//! identity string. Neither parser may panic; a configuration that parses
//! must also validate, and a parsed identity must print back to a string
//! that parses to the same identity.
//!
//! Run with: cargo +nightly fuzz run config_fuzz -- -max_total_time=60

#![no_main]

use keystone_core::{Identity, KeystoneConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = KeystoneConfig::from_toml_str(input) {
        assert!(config.validate().is_ok(), "parsed config must validate");
    }

    if let Ok(identity) = input.parse::<Identity>() {
        let printed = identity.to_string();
        assert_eq!(printed.parse::<Identity>().ok(), Some(identity));
    }
});
