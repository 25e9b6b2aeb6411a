//! Pure text helpers for validating user input.
//!
//! These helpers never touch the network; they normalize and validate the
//! strings users type into the chat before the conversation engine acts on
//! them.

/// Validates and normalizes a phone number in international format.
///
/// Strips every character except digits and a leading `+`, then requires the
/// result to be `+` followed by 7 to 15 digits.
///
/// # Errors
///
/// Returns a human-readable reason when the number is rejected.
pub fn validate_phone_number(phone: &str) -> Result<String, String> {
    let cleaned: String = phone
        .chars()
        .filter(|&c| c.is_ascii_digit() || c == '+')
        .collect();

    if !cleaned.starts_with('+') {
        return Err("Phone number must start with a '+' sign".to_owned());
    }

    let digits = &cleaned[1..];
    if digits.contains('+') {
        return Err("Phone number must contain only digits after the '+' sign".to_owned());
    }

    if digits.len() < 7 || digits.len() > 15 {
        return Err("Phone number must be between 7 and 15 digits long".to_owned());
    }

    Ok(cleaned)
}

/// Normalizes a verification code by stripping non-digits.
///
/// Telegram login codes are typically 5 digits; anything outside 3–7 digits
/// after normalization is rejected.
///
/// # Errors
///
/// Returns a human-readable reason when the code is rejected.
pub fn format_verification_code(code: &str) -> Result<String, String> {
    let cleaned: String = code.chars().filter(char::is_ascii_digit).collect();

    if cleaned.len() < 3 || cleaned.len() > 7 {
        return Err("Verification code should be between 3 and 7 digits".to_owned());
    }

    Ok(cleaned)
}

/// Strips everything but digits from a code, with no length check.
///
/// The conversation flow only requires the result to be non-empty before
/// attempting a sign-in; the stricter length check lives in
/// [`format_verification_code`].
#[must_use]
pub fn strip_non_digits(code: &str) -> String {
    code.chars().filter(char::is_ascii_digit).collect()
}

/// Renders an optional value for display, falling back to "Not set".
#[must_use]
pub fn safe_str(value: Option<&str>) -> String {
    value.map_or_else(|| "Not set".to_owned(), str::to_owned)
}

/// Masks a phone number for logging (shows last 4 digits).
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
