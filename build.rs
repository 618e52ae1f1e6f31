//! Build script for guardheap.
//!
//! Provides build-time diagnostics and feature detection for users
//! integrating guardheap into their debug builds.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");

    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    if parking_lot_enabled {
        emit_info("Using parking_lot for the registry mutex");
    }

    if diagnostics_enabled {
        emit_info("Verbose diagnostics output enabled");
    }

    if is_release {
        emit_warning("guardheap built in release mode");
        emit_note("guardheap is a checked debug heap: every allocation carries");
        emit_note("header/trailer metadata and guard words, and frees are delayed.");
        emit_note("It is unconditionally slower and bigger than a production");
        emit_note("allocator; gate it behind debug builds of the host application.");
    }

    check_target_features();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[guardheap] ℹ️  {}", msg);
}

fn emit_note(msg: &str) {
    if msg.is_empty() {
        println!("cargo:warning=[guardheap]");
    } else {
        println!("cargo:warning=[guardheap]    {}", msg);
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[guardheap] ⚠️  {}", msg);
}

// =============================================================================
// Environment and toolchain checks
// =============================================================================

fn check_target_features() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("guardheap scans raw pointer words in allocation payloads;");
        emit_note("on wasm32 pointer-sized slots are 4 bytes and call-stack");
        emit_note("capture support is limited.");
    }
}
