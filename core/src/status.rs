//! Acceptance check for response status codes.

/// True when `code` is in `acceptable`, or when `acceptable` is empty.
///
/// Order only matters afterwards: the first element is the success code
/// that decides whether a GET body gets decoded (see [`is_success`]).
pub fn accept(code: u16, acceptable: &[u16]) -> bool {
    acceptable.is_empty() || acceptable.contains(&code)
}

/// Whether a GET response with `code` should have its body decoded.
///
/// With an empty acceptable list any 2xx code counts as success.
pub fn is_success(code: u16, acceptable: &[u16]) -> bool {
    match acceptable.first() {
        Some(&first) => first == code,
        None => (200..300).contains(&code),
    }
}
