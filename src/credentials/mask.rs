//! Secret masking for display paths.

/// Characters kept at each end of a long secret.
pub const DEFAULT_SHOW: usize = 6;

/// Mask `secret`, keeping `show` characters at each end.
///
/// Short secrets keep two characters each side, or are fully hidden when
/// four characters or fewer.
pub fn mask_with(secret: &str, show: usize) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = secret.chars().collect();
    let len = chars.len();
    let keep = if len <= show * 2 {
        if len <= 4 {
            return "***".to_string();
        }
        2
    } else {
        show
    };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[len - keep..].iter().collect();
    format!("{head}***{tail}")
}

pub fn mask(secret: &str) -> String {
    mask_with(secret, DEFAULT_SHOW)
}

/// `None` for empty secrets, masked otherwise.
pub fn mask_opt(secret: &str) -> Option<String> {
    (!secret.is_empty()).then(|| mask(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_lengths() {
        assert_eq!(mask(""), "");
        assert_eq!(mask("abcd"), "***");
        assert_eq!(mask("abcdefgh"), "ab***gh");
        assert_eq!(mask("abcdefghijkl"), "ab***kl");
        assert_eq!(mask("abcdefghijklm"), "abcdef***hijklm");
    }

    #[test]
    fn test_mask_multibyte() {
        assert_eq!(mask_with("令牌令牌令牌", 2), "令牌***令牌");
    }

    #[test]
    fn test_mask_opt() {
        assert_eq!(mask_opt(""), None);
        assert_eq!(mask_opt("abcdefgh").as_deref(), Some("ab***gh"));
    }
}
