//! Module hot reloaded by `watch-greeter`.
//!
//! Edit the bodies below while `watch-greeter` runs and rebuild with
//! `cargo build -p greeter`; the new code is picked up without a restart.

/// Default export.
#[unsafe(no_mangle)]
pub extern "C" fn default(a: i32, b: i32) -> i32 {
    a + b
}

/// Named export.
#[unsafe(no_mangle)]
pub extern "C" fn named_export(a: i32, b: i32) -> i32 {
    a * b
}
