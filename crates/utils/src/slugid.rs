//! Slug-style task identifiers: 22 characters of URL-safe base64 over a v4
//! UUID, matching the id format the execution platform expects.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

/// Generate a fresh task id.
pub fn slugid() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugids_are_22_chars_and_unique() {
        let first = slugid();
        let second = slugid();
        assert_eq!(first.len(), 22);
        assert_ne!(first, second);
        assert!(!first.contains('='));
    }
}
