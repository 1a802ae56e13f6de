use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Luhn checksum only.
    #[default]
    Checksum,
    /// Issuer length and prefix rules, then the checksum.
    Issuer,
}

impl ValidationMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "checksum" | "luhn" => Ok(ValidationMode::Checksum),
            "issuer" | "strict" => Ok(ValidationMode::Issuer),
            other => Err(anyhow!(
                "unknown validation mode '{}' (expected checksum or issuer)",
                other
            )),
        }
    }

    pub fn validate(&self, raw: &str) -> bool {
        match self {
            ValidationMode::Checksum => is_valid(raw),
            ValidationMode::Issuer => is_valid_strict(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Visa,
    Mastercard,
    AmericanExpress,
    Discover,
    Jcb,
    DinersClub,
    UnionPay,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Visa => "visa",
            Network::Mastercard => "mastercard",
            Network::AmericanExpress => "american_express",
            Network::Discover => "discover",
            Network::Jcb => "jcb",
            Network::DinersClub => "diners_club",
            Network::UnionPay => "union_pay",
        }
    }

    fn lengths(&self) -> &'static [usize] {
        match self {
            Network::Visa => &[13, 16, 19],
            Network::Mastercard => &[16],
            Network::AmericanExpress => &[15],
            Network::Discover => &[16, 19],
            Network::Jcb => &[16, 17, 18, 19],
            Network::DinersClub => &[14],
            Network::UnionPay => &[16, 17, 18, 19],
        }
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_ascii_digit()).collect()
}

/// Luhn checksum over the digits of `raw`; separators are ignored.
pub fn is_valid(raw: &str) -> bool {
    let digits = digits_only(raw);
    if digits.is_empty() {
        return false;
    }
    luhn_sum(&digits) % 10 == 0
}

/// Requires a known issuer prefix and length before checking the checksum.
pub fn is_valid_strict(raw: &str) -> bool {
    let digits = digits_only(raw);
    let Some(network) = classify(&digits) else {
        return false;
    };
    if !network.lengths().contains(&digits.len()) {
        return false;
    }
    luhn_sum(&digits) % 10 == 0
}

/// Issuer network by leading digits. Length is not considered here.
pub fn classify(raw: &str) -> Option<Network> {
    let digits = digits_only(raw);
    let prefix = |len: usize| -> Option<u32> {
        digits.get(..len).and_then(|value| value.parse().ok())
    };

    if digits.starts_with('4') {
        return Some(Network::Visa);
    }
    if matches!(prefix(2), Some(34 | 37)) {
        return Some(Network::AmericanExpress);
    }
    if matches!(prefix(2), Some(51..=55)) || matches!(prefix(4), Some(2221..=2720)) {
        return Some(Network::Mastercard);
    }
    if prefix(4) == Some(6011) || matches!(prefix(3), Some(644..=649)) || prefix(2) == Some(65) {
        return Some(Network::Discover);
    }
    if matches!(prefix(4), Some(3528..=3589)) {
        return Some(Network::Jcb);
    }
    if matches!(prefix(3), Some(300..=305)) || matches!(prefix(2), Some(36 | 38)) {
        return Some(Network::DinersClub);
    }
    if prefix(2) == Some(62) {
        return Some(Network::UnionPay);
    }
    None
}

fn luhn_sum(digits: &str) -> u32 {
    digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(idx, byte)| {
            let digit = u32::from(byte - b'0');
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert!(is_valid("4532015112830366"));
        assert!(!is_valid("4532015112830367"));
        assert!(is_valid("378282246310005"));
        assert!(is_valid("0"));
    }

    #[test]
    fn separators_do_not_change_the_result() {
        for decorated in [
            "4532-0151-1283-0366",
            "4532 0151 1283 0366",
            " 4532.0151/1283*0366 ",
        ] {
            assert!(is_valid(decorated));
        }
        for (plain, expected) in [("4532015112830366", true), ("4532015112830367", false)] {
            let spaced: String = plain.chars().flat_map(|ch| [ch, ' ']).collect();
            let dashed: String = plain.chars().flat_map(|ch| ['-', ch]).collect();
            assert_eq!(is_valid(&spaced), expected);
            assert_eq!(is_valid(&dashed), expected);
        }
    }

    #[test]
    fn empty_or_non_numeric_is_invalid() {
        assert!(!is_valid(""));
        assert!(!is_valid("NOT_FOUND"));
        assert!(!is_valid("--  --"));
    }

    #[test]
    fn classifies_major_networks() {
        assert_eq!(classify("4532015112830366"), Some(Network::Visa));
        assert_eq!(classify("5555555555554444"), Some(Network::Mastercard));
        assert_eq!(classify("2223003122003222"), Some(Network::Mastercard));
        assert_eq!(classify("378282246310005"), Some(Network::AmericanExpress));
        assert_eq!(classify("6011111111111117"), Some(Network::Discover));
        assert_eq!(classify("3530111333300000"), Some(Network::Jcb));
        assert_eq!(classify("30569309025904"), Some(Network::DinersClub));
        assert_eq!(classify("6200000000000005"), Some(Network::UnionPay));
        assert_eq!(classify("9999"), None);
    }

    #[test]
    fn strict_mode_checks_issuer_length() {
        assert!(is_valid_strict("4532015112830366"));
        assert!(is_valid_strict("378282246310005"));
        // passes the checksum but no issuer uses this prefix
        assert!(is_valid("0000000000000000"));
        assert!(!is_valid_strict("0000000000000000"));
        // amex prefix with a visa-like length
        assert!(!is_valid_strict("3782822463100058"));
    }

    #[test]
    fn mode_dispatch() {
        assert!(ValidationMode::Checksum.validate("0000000000000000"));
        assert!(!ValidationMode::Issuer.validate("0000000000000000"));
        assert_eq!(ValidationMode::parse("LUHN").unwrap(), ValidationMode::Checksum);
        assert!(ValidationMode::parse("other").is_err());
    }
}
