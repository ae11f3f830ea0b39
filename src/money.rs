// 💰 Money Epsilon Comparator - "effectively zero" for floating amounts
//
// Repeated additions of decimal money values in f64 drift by fractions of a
// cent. Every balance/debt decision goes through these predicates, never
// through `==` on amounts.

/// Absolute tolerance for money comparisons (1 cent)
pub const EPSILON: f64 = 0.01;

/// `|x| < 0.01`
pub fn is_zero(amount: f64) -> bool {
    amount.abs() < EPSILON
}

/// `x > 0.01`
pub fn is_positive(amount: f64) -> bool {
    amount > EPSILON
}

/// `x < -0.01`
pub fn is_negative(amount: f64) -> bool {
    amount < -EPSILON
}

/// Two amounts are effectively equal when their difference is zero
pub fn approx_eq(a: f64, b: f64) -> bool {
    is_zero(a - b)
}

/// Format an amount with two decimals and an explicit sign
///
/// `+100.00`, `-50.00`, `0.00` (anything within epsilon prints as zero)
pub fn format_signed(amount: f64) -> String {
    if is_zero(amount) {
        "0.00".to_string()
    } else if amount > 0.0 {
        format!("+{:.2}", amount)
    } else {
        format!("-{:.2}", amount.abs())
    }
}

/// Parse a user-supplied amount ("12.50", "12,50", " 3 ")
///
/// Returns `None` for empty, non-numeric or non-finite input.
pub fn parse_amount(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================
