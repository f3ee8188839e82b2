//! Runtime-dispatched SIMD primitives.
//!
//! Two families of kernel live here:
//!
//! - byte scans used by the info-file parser (`scan` module): find a byte,
//!   find the first of a small needle set, skip leading/trailing ASCII
//!   whitespace;
//! - strided column gathers used by the signal extractor (`gather` module):
//!   pull every Nth `E`-byte element out of a row-major buffer into a
//!   contiguous output.
//!
//! CPU feature detection happens once per process (cached in a
//! [`once_cell::sync::Lazy`], mirroring the one-shot `OnceCell`-style globals
//! this codebase uses elsewhere) and is exposed as [`SimdLevel::detect`].
//! Tests can bypass detection entirely by calling the scalar/level-specific
//! functions directly, or by constructing an explicit [`SimdLevel`] and
//! passing it to [`gather::gather_column`].

pub mod gather;
pub mod scan;

use once_cell::sync::Lazy;

/// Widest SIMD instruction family this process may use, detected once from
/// CPUID (and, for AVX/AVX-512, the OS's XSAVE state) and cached for the
/// life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdLevel {
    None,
    Sse2,
    Avx2,
    Avx512,
}

static DETECTED: Lazy<SimdLevel> = Lazy::new(SimdLevel::detect);

impl SimdLevel {
    /// The level detected for this process, computed once and cached.
    pub fn current() -> SimdLevel {
        *DETECTED
    }

    /// Run feature detection, bypassing the cache. Exposed for tests that
    /// want to confirm detection logic itself rather than rely on the
    /// cached value; production code should call [`SimdLevel::current`].
    pub fn detect() -> SimdLevel {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") && xsave_supports_avx512() {
                return SimdLevel::Avx512;
            }
            if is_x86_feature_detected!("avx2") && xsave_supports_avx() {
                return SimdLevel::Avx2;
            }
            if is_x86_feature_detected!("sse2") {
                return SimdLevel::Sse2;
            }
            SimdLevel::None
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            SimdLevel::None
        }
    }
}

/// `is_x86_feature_detected!` already verifies the OS reports the feature
/// via CPUID, which on all OSes Rust supports implies the kernel has set up
/// XSAVE for AVX/AVX-512 state (the detection macro reads `XCR0` through
/// `xgetbv` for exactly this reason). This wrapper exists so the check is
/// named at the call site: CPUID alone reports whether the CPU *supports*
/// AVX/AVX-512, but using those registers without OS XSAVE support faults,
/// so both must hold before this process may use them.
#[cfg(target_arch = "x86_64")]
fn xsave_supports_avx() -> bool {
    is_x86_feature_detected!("xsave") && is_x86_feature_detected!("avx")
}

#[cfg(target_arch = "x86_64")]
fn xsave_supports_avx512() -> bool {
    xsave_supports_avx() && is_x86_feature_detected!("avx512f")
}
