const STRIPPED_CHARS: [char; 3] = ['+', '-', ' '];

/// Strips `+`, `-` and spaces. Idempotent.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plus_dash_and_spaces() {
        assert_eq!(normalize_phone("+1 555-0100"), "15550100");
        assert_eq!(normalize_phone("+55 11-1234"), normalize_phone("5511 1234"));
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let once = normalize_phone("+55 (11) 9-8765 4321");
        assert_eq!(normalize_phone(&once), once);
        assert_eq!(once, "55(11)987654321");
    }
}
