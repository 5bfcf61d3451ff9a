//! How much of a page exists only after client-side rendering.
//!
//! Automated readers that do not execute scripts only see the initial HTML, so
//! a large gap between the server document and the rendered DOM means content
//! may be missed.

use crate::models::LlmReadability;

/// Above this rendering percentage the page is flagged as script dependent.
pub const SCRIPT_DEPENDENT_THRESHOLD: f64 = 100.0;

/// Similarity above which a shrinking DOM is treated as near-identical.
const NEAR_IDENTICAL_SIMILARITY: f64 = 95.0;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes the readability ratio from the two document lengths.
///
/// `rendering_percentage` is not capped at 100 so that heavily script-built
/// pages stay distinguishable; both values are floored at 0 and `similarity`
/// is capped at 100.
pub fn compute(initial_len: usize, rendered_len: usize) -> LlmReadability {
    let i = initial_len as f64;
    let r = rendered_len as f64;

    if initial_len == 0 {
        // Nothing served before scripts run: either an empty page or fully client-rendered.
        return if rendered_len == 0 {
            LlmReadability {
                rendering_percentage: 0.0,
                similarity: 100.0,
            }
        } else {
            LlmReadability {
                rendering_percentage: SCRIPT_DEPENDENT_THRESHOLD,
                similarity: 0.0,
            }
        };
    }

    let (rendering_percentage, similarity) = if r >= i {
        ((r - i) / i * 100.0, i / r * 100.0)
    } else {
        let similarity = r / i * 100.0;
        let rendering = if similarity > NEAR_IDENTICAL_SIMILARITY {
            100.0 - similarity
        } else {
            (i - r) / i * 100.0
        };
        (rendering, similarity)
    };

    LlmReadability {
        rendering_percentage: round2(rendering_percentage.max(0.0)),
        similarity: round2(similarity.clamp(0.0, 100.0)),
    }
}

/// Whether content more than doubled through script execution.
pub fn is_script_dependent(initial_len: usize, rendered_len: usize) -> bool {
    if initial_len == 0 {
        return rendered_len > 0;
    }
    compute(initial_len, rendered_len).rendering_percentage > SCRIPT_DEPENDENT_THRESHOLD
}

/// Sanity check used by QA: finite, non-negative and matching a recomputation.
pub fn is_consistent(readability: &LlmReadability, initial_len: usize, rendered_len: usize) -> bool {
    let LlmReadability {
        rendering_percentage,
        similarity,
    } = *readability;
    if !rendering_percentage.is_finite() || !similarity.is_finite() {
        return false;
    }
    if rendering_percentage < 0.0 || !(0.0..=100.0).contains(&similarity) {
        return false;
    }
    let expected = compute(initial_len, rendered_len);
    (expected.rendering_percentage - rendering_percentage).abs() < 0.01
        && (expected.similarity - similarity).abs() < 0.01
}
